//! This module provides RISC-V specific functions: trap entry, context switching and the
//! physical memory layout set up by the linker script.

use ::riscv::{
    instructions::wfi,
    registers::{SiFlags, Sie, Sstatus, SstatusFlags},
};

pub use context::{user_entry, Hart};
pub use memory::{clear_bss, memory_layout};
pub use uaccess::with_user_access;

mod context;
mod memory;
pub mod trap;
mod uaccess;

/// Halts execution on the current hart forever.
pub fn halt() -> ! {
    // Disable all interrupts
    Sie::clear(SiFlags::SSIE | SiFlags::STIE | SiFlags::SEIE);
    // SAFETY: masking interrupts cannot break memory safety
    unsafe { Sstatus::clear(SstatusFlags::SIE) };

    // Loop forever
    loop {
        wfi();
    }
}
