//! Physical memory layout, as laid out by the linker script.

use core::ptr::{self, addr_of, addr_of_mut};

use ::riscv::PhysAddr;

use crate::{config::VIRTIO_BLK_PADDR, mm::MemoryLayout};

// Defined in linker script
extern "C" {
    /// First byte of the kernel image.
    static __kernel_base: u8;
    /// Start of the BSS section.
    static mut __bss: u8;
    /// End of the BSS section.
    static __bss_end: u8;
    /// Start of the free RAM region.
    static __free_ram: u8;
    /// End of the free RAM region.
    static __free_ram_end: u8;
}

/// Zeroes the BSS section.
///
/// # Safety
///
/// Must be called once, first thing at boot, before any zero-initialized static is used.
pub unsafe fn clear_bss() {
    // SAFETY: both symbols come from the linker script and delimit the BSS section
    unsafe {
        let start = addr_of_mut!(__bss);
        let len = addr_of!(__bss_end) as usize - start as usize;
        ptr::write_bytes(start, 0, len);
    }
}

/// Returns the memory regions reserved by the linker script.
pub fn memory_layout() -> MemoryLayout {
    // SAFETY: only the addresses of these symbols are taken
    let (kernel_base, free_ram, free_ram_end) = unsafe {
        (
            addr_of!(__kernel_base) as u32,
            addr_of!(__free_ram) as u32,
            addr_of!(__free_ram_end) as u32,
        )
    };

    MemoryLayout {
        kernel_base: PhysAddr::new(kernel_base),
        free_ram: PhysAddr::new(free_ram),
        free_ram_end: PhysAddr::new(free_ram_end),
        mmio: PhysAddr::new(VIRTIO_BLK_PADDR),
    }
}
