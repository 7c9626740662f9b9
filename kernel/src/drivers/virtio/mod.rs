//! VirtIO subsystem.
//!
//! Only the legacy (version 1) memory-mapped transport is supported, with a single synchronous
//! request in flight at any time.

use core::fmt;

use bitflags::bitflags;
use kmm::allocator::AllocatorError;

pub use blk::VirtioBlk;
pub use mmio::VirtioMmioDev;

mod blk;
mod mmio;
mod virtq;

/// Expected value of the magic register, `"virt"` in little endian.
pub const VIRTIO_MAGIC: u32 = 0x7472_6976;

/// Device ID of block devices.
pub const VIRTIO_DEVICE_BLK: u32 = 2;

/// Abstraction over the register interface of a VirtIO device.
pub trait VirtioDev {
    /// Reads the magic value register.
    fn magic(&self) -> u32;

    /// Reads the transport version.
    fn version(&self) -> u32;

    /// Reads the device type identifier.
    fn device_id(&self) -> u32;

    /// Reads the device's status register.
    fn status(&self) -> Status;

    /// Overwrites the device's status register. Writing an empty status resets the device.
    fn set_status(&self, status: Status);

    /// Adds the specified bits to the device's status register.
    fn update_status(&self, status: Status) {
        self.set_status(self.status() | status);
    }

    /// Tells the device the size of a guest page, used to interpret queue frame numbers.
    fn set_guest_page_size(&self, size: u32);

    /// Reads a 64-bit field from the device-specific configuration space.
    ///
    /// The offset is expressed in bytes.
    fn read_config_u64(&self, offset: u32) -> u64;

    /// Returns the maximum size of the queue at `index`.
    fn queue_num_max(&self, index: u32) -> u32;

    /// Configures the queue at `index` to use `num` descriptors located at page frame `pfn`,
    /// with the used ring aligned to `align` bytes.
    fn setup_queue(&self, index: u32, num: u32, align: u32, pfn: u32);

    /// Notifies the device that new buffers are available in the selected virtqueue.
    fn notify(&self, index: u32);
}

bitflags! {
    /// VirtIO status register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u32 {
        /// The guest OS has found the device and recognized it as a valid virtio device
        const ACKNOWLEDGE = 1;
        /// The guest OS knows how to drive the device
        const DRIVER = 2;
        /// The driver is set up and ready to drive the device
        const DRIVER_OK = 4;
        /// The driver has acknowledged the features it understands
        const FEATURES_OK = 8;
        /// The device has experienced an error from which it can’t recover
        const DEVICE_NEEDS_RESET = 64;
        /// Something went wrong in the guest, and it has given up on the device
        const FAILED = 128;
    }
}

/// Errors raised while bringing up a VirtIO device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtioError {
    /// The magic register does not read `"virt"`.
    InvalidMagic(u32),
    /// The transport is not the legacy interface.
    UnsupportedVersion(u32),
    /// The device is not of the expected type.
    UnexpectedDevice(u32),
    /// The device queue cannot hold the required number of descriptors.
    QueueTooSmall(u32),
    /// No memory left for the queue or request buffers.
    Alloc(AllocatorError),
}

impl fmt::Display for VirtioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VirtioError::InvalidMagic(m) => write!(f, "invalid magic value {:#x}", m),
            VirtioError::UnsupportedVersion(v) => write!(f, "unsupported version {}", v),
            VirtioError::UnexpectedDevice(id) => write!(f, "unexpected device id {}", id),
            VirtioError::QueueTooSmall(n) => write!(f, "queue too small ({} entries)", n),
            VirtioError::Alloc(e) => write!(f, "allocation failed: {}", e),
        }
    }
}

impl From<AllocatorError> for VirtioError {
    fn from(e: AllocatorError) -> Self {
        VirtioError::Alloc(e)
    }
}
