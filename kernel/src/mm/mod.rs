//! Kernel memory management.
//!
//! Physical memory is handed out by a single bump allocator over the free RAM region reserved by
//! the linker script. Pages are never returned.

use kmm::allocator::BumpFrameAllocator;
use riscv::{PhysAddr, PAGE_SIZE};

/// The frame allocator type used by the kernel.
pub type KernelFrameAllocator = BumpFrameAllocator<PhysAddr, PAGE_SIZE>;

/// Physical memory regions the kernel needs to know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    /// First byte of the kernel image.
    pub kernel_base: PhysAddr,
    /// First byte of the free RAM region.
    pub free_ram: PhysAddr,
    /// One past the last byte of the free RAM region.
    pub free_ram_end: PhysAddr,
    /// Register page of the block device.
    pub mmio: PhysAddr,
}

impl MemoryLayout {
    /// Returns the range every address space maps one-to-one for the kernel: the kernel image
    /// followed by the whole free RAM region.
    pub fn kernel_range(&self) -> (PhysAddr, PhysAddr) {
        (self.kernel_base, self.free_ram_end)
    }
}

#[cfg(target_os = "none")]
lazy_static::lazy_static! {
    /// The kernel frame allocator, covering the free RAM region.
    pub static ref FRAME_ALLOCATOR: spin::Mutex<KernelFrameAllocator> = {
        let layout = crate::arch::memory_layout();

        // SAFETY: the free RAM region is reserved by the linker script, nothing else uses it and
        // physical memory is identity-mapped
        let allocator = unsafe {
            KernelFrameAllocator::init(
                layout.free_ram,
                layout.free_ram_end,
                kmm::LinearMap::IDENTITY,
            )
        };

        spin::Mutex::new(
            allocator.unwrap_or_else(|e| panic!("invalid free RAM region: {}", e)),
        )
    };
}
