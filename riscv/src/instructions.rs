//! Special RISC-V instructions.

use core::arch::asm;

/// Halts the hart until the next interrupt arrives.
#[inline]
pub fn wfi() {
    // SAFETY: `wfi` has no architectural side effects besides stalling the hart
    unsafe {
        asm!("wfi", options(nostack, nomem));
    }
}

/// Flushes every address-translation cache entry of the current hart.
#[inline]
pub fn sfence_vma() {
    // SAFETY: invalidating cached translations never breaks memory safety by itself
    unsafe {
        asm!("sfence.vma zero, zero", options(nostack));
    }
}
