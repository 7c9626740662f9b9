//! VirtIO block device driver.

use core::{
    mem::{offset_of, size_of},
    ptr::{self, addr_of},
};

use kmm::{allocator::FrameAllocator, Align, LinearMap};
use riscv::{PhysAddr, PAGE_SIZE};
use static_assertions::const_assert_eq;

use crate::{
    config::{SECTOR_SIZE, VIRTQ_ENTRY_NUM},
    drivers::block::{BlockDevice, BlockError, Sector},
};

use super::{
    virtq::{Buffer, Virtq},
    Status, VirtioDev, VirtioError, VIRTIO_DEVICE_BLK, VIRTIO_MAGIC,
};

/// Request types understood by the driver.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VirtioBlkReqType {
    /// Read sectors from the device
    In = 0,
    /// Write sectors to the device
    Out = 1,
}

/// A single-sector block request, laid out exactly as the device reads it.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
struct VirtioBlkReq {
    kind: u32,
    reserved: u32,
    sector: u64,
    data: Sector,
    status: u8,
}

impl VirtioBlkReq {
    const HEADER_SIZE: usize = offset_of!(VirtioBlkReq, data);
}

const_assert_eq!(VirtioBlkReq::HEADER_SIZE, 16);
const_assert_eq!(size_of::<VirtioBlkReq>(), 16 + SECTOR_SIZE + 1);

/// A virtio block device.
#[derive(Debug)]
pub struct VirtioBlk<D> {
    dev: D,
    virtq: Virtq,
    req: PhysAddr,
    map: LinearMap,
    capacity: u64,
}

impl<D: VirtioDev> VirtioBlk<D> {
    /// Configures a virtio device as block device.
    ///
    /// The virtqueue and request buffer are taken from `frame_allocator` and accessed through
    /// `map`; the device is handed their physical addresses.
    pub fn new<A>(dev: D, frame_allocator: &mut A, map: LinearMap) -> Result<Self, VirtioError>
    where
        A: FrameAllocator<PhysAddr, PAGE_SIZE>,
    {
        if dev.magic() != VIRTIO_MAGIC {
            return Err(VirtioError::InvalidMagic(dev.magic()));
        }
        if dev.version() != 1 {
            return Err(VirtioError::UnsupportedVersion(dev.version()));
        }
        if dev.device_id() != VIRTIO_DEVICE_BLK {
            return Err(VirtioError::UnexpectedDevice(dev.device_id()));
        }

        // Reset and recognize the device
        dev.set_status(Status::empty());
        dev.update_status(Status::ACKNOWLEDGE);
        dev.update_status(Status::DRIVER);
        dev.update_status(Status::FEATURES_OK);

        // Configure the request queue
        let num_max = dev.queue_num_max(0);
        if num_max < VIRTQ_ENTRY_NUM as u32 {
            dev.update_status(Status::FAILED);
            return Err(VirtioError::QueueTooSmall(num_max));
        }

        let vq_pa = frame_allocator.alloc(Virtq::PAGES)?;
        // SAFETY: the pages were just allocated, zeroed and are reachable through `map`
        let virtq = unsafe { Virtq::new(0, vq_pa, map) };

        dev.set_guest_page_size(PAGE_SIZE);
        dev.setup_queue(0, VIRTQ_ENTRY_NUM as u32, PAGE_SIZE, virtq.pfn());

        let req_pages = size_of::<VirtioBlkReq>().align_up(PAGE_SIZE as usize) / PAGE_SIZE as usize;
        let req = frame_allocator.alloc(req_pages)?;

        // Device is now live
        dev.update_status(Status::DRIVER_OK);

        let capacity = dev.read_config_u64(0);
        kinfo!(
            "virtio-blk: {} sectors disk ({} bytes)",
            capacity,
            capacity * SECTOR_SIZE as u64
        );

        Ok(Self {
            dev,
            virtq,
            req,
            map,
            capacity,
        })
    }

    #[cfg(test)]
    fn device(&self) -> &D {
        &self.dev
    }

    fn transfer(&mut self, sector: u64, buf: &mut Sector, write: bool) -> Result<(), BlockError> {
        if sector >= self.capacity {
            kwarn!(
                "virtio-blk: tried to access sector {}, but capacity is {}",
                sector,
                self.capacity
            );
            return Err(BlockError::OutOfRange {
                sector,
                capacity: self.capacity,
            });
        }

        let kind = if write {
            VirtioBlkReqType::Out
        } else {
            VirtioBlkReqType::In
        };

        let req = self.map.ptr::<VirtioBlkReq, _>(self.req);
        // SAFETY: the request buffer is reserved for this driver and no request is in flight
        unsafe {
            req.write(VirtioBlkReq {
                kind: kind as u32,
                reserved: 0,
                sector,
                data: if write { *buf } else { [0; SECTOR_SIZE] },
                status: 0,
            });
        }

        let data = self.req + VirtioBlkReq::HEADER_SIZE as u32;
        let status = self.req + offset_of!(VirtioBlkReq, status) as u32;

        self.virtq.submit_and_wait(
            &self.dev,
            &[
                Buffer {
                    addr: self.req,
                    len: VirtioBlkReq::HEADER_SIZE as u32,
                    device_writable: false,
                },
                Buffer {
                    addr: data,
                    len: SECTOR_SIZE as u32,
                    device_writable: !write,
                },
                Buffer {
                    addr: status,
                    len: 1,
                    device_writable: true,
                },
            ],
        );

        // SAFETY: the device has completed the request and no longer touches the buffer
        let status = unsafe { ptr::read_volatile(addr_of!((*req).status)) };
        if status != 0 {
            kerr!(
                "virtio-blk: failed to {} sector {}: status={}",
                if write { "write" } else { "read" },
                sector,
                status
            );
            return Err(BlockError::Device(status));
        }

        if !write {
            // SAFETY: see above
            *buf = unsafe { ptr::read(addr_of!((*req).data)) };
        }

        Ok(())
    }
}

impl<D: VirtioDev> BlockDevice for VirtioBlk<D> {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn read_sector(&mut self, sector: u64, buf: &mut Sector) -> Result<(), BlockError> {
        self.transfer(sector, buf, false)
    }

    fn write_sector(&mut self, sector: u64, buf: &Sector) -> Result<(), BlockError> {
        let mut data = *buf;
        self.transfer(sector, &mut data, true)
    }
}
