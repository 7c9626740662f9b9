//! Device drivers and the global device instances.

/// Block device abstraction.
pub mod block;

/// Kernel console registry.
pub mod earlycon;

/// Firmware console.
pub mod sbi_console;

/// VirtIO devices.
pub mod virtio;

use virtio::{VirtioBlk, VirtioMmioDev};

/// The block device type backing the file system.
pub type KernelBlockDevice = VirtioBlk<VirtioMmioDev>;

/// The disk, available once [`init_block_device`] succeeded.
pub static BLOCK_DEVICE: spin::Once<spin::Mutex<KernelBlockDevice>> = spin::Once::new();

/// Probes and initializes the block device at its board address.
#[cfg(target_os = "none")]
pub fn init_block_device() -> Result<&'static spin::Mutex<KernelBlockDevice>, virtio::VirtioError>
{
    use crate::{config::VIRTIO_BLK_PADDR, mm::FRAME_ALLOCATOR};

    // SAFETY: the board configuration places a virtio-mmio slot at this address and nothing
    // else drives it
    let dev = unsafe { VirtioMmioDev::new(VIRTIO_BLK_PADDR as usize) };

    let blk = VirtioBlk::new(
        dev,
        &mut *FRAME_ALLOCATOR.lock(),
        kmm::LinearMap::IDENTITY,
    )?;

    Ok(BLOCK_DEVICE.call_once(|| spin::Mutex::new(blk)))
}
