//! VirtIO memory-mapped interface.

use core::ptr;

use super::{Status, VirtioDev};

/// A legacy memory-mapped VirtIO device.
#[derive(Debug)]
pub struct VirtioMmioDev {
    base: usize,
}

#[allow(unused)]
impl VirtioMmioDev {
    // Register offsets
    const MAGIC: usize = 0x00;
    const VERSION: usize = 0x04;
    const DEVICE_ID: usize = 0x08;
    const VENDOR_ID: usize = 0x0c;
    const DEVICE_FEATURES: usize = 0x10;
    const DRIVER_FEATURES: usize = 0x20;
    const GUEST_PAGE_SIZE: usize = 0x28;
    const QUEUE_SEL: usize = 0x30;
    const QUEUE_NUM_MAX: usize = 0x34;
    const QUEUE_NUM: usize = 0x38;
    const QUEUE_ALIGN: usize = 0x3c;
    const QUEUE_PFN: usize = 0x40;
    const QUEUE_NOTIFY: usize = 0x50;
    const INTERRUPT_STATUS: usize = 0x60;
    const INTERRUPT_ACK: usize = 0x64;
    const STATUS: usize = 0x70;
    const CONFIG: usize = 0x100;
}

impl VirtioMmioDev {
    /// Creates a device accessing its registers at address `base`.
    ///
    /// # Safety
    ///
    /// `base` must be the mapped address of a virtio-mmio register window, used by nothing else.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    fn read(&self, off: usize) -> u32 {
        // SAFETY: the constructor guarantees the register window is mapped
        unsafe { ptr::read_volatile((self.base + off) as *const u32) }
    }

    fn write(&self, off: usize, value: u32) {
        // SAFETY: the constructor guarantees the register window is mapped
        unsafe { ptr::write_volatile((self.base + off) as *mut u32, value) }
    }
}

impl VirtioDev for VirtioMmioDev {
    fn magic(&self) -> u32 {
        self.read(Self::MAGIC)
    }

    fn version(&self) -> u32 {
        self.read(Self::VERSION)
    }

    fn device_id(&self) -> u32 {
        self.read(Self::DEVICE_ID)
    }

    fn status(&self) -> Status {
        Status::from_bits_retain(self.read(Self::STATUS))
    }

    fn set_status(&self, status: Status) {
        self.write(Self::STATUS, status.bits());
    }

    fn set_guest_page_size(&self, size: u32) {
        self.write(Self::GUEST_PAGE_SIZE, size);
    }

    fn read_config_u64(&self, offset: u32) -> u64 {
        let off = Self::CONFIG + offset as usize;

        // The two halves are read separately, retry until they are consistent
        loop {
            let lo = self.read(off);
            let hi = self.read(off + 4);
            if self.read(off) == lo {
                return (hi as u64) << 32 | lo as u64;
            }
        }
    }

    fn queue_num_max(&self, index: u32) -> u32 {
        self.write(Self::QUEUE_SEL, index);
        self.read(Self::QUEUE_NUM_MAX)
    }

    fn setup_queue(&self, index: u32, num: u32, align: u32, pfn: u32) {
        self.write(Self::QUEUE_SEL, index);
        self.write(Self::QUEUE_NUM, num);
        self.write(Self::QUEUE_ALIGN, align);
        self.write(Self::QUEUE_PFN, pfn);
    }

    fn notify(&self, index: u32) {
        self.write(Self::QUEUE_NOTIFY, index);
    }
}
