//! RISC-V user mode memory access interface.

use ::riscv::registers::{Sstatus, SstatusFlags};

/// Executes the given closure with user memory access enabled.
pub fn with_user_access<F, T>(f: F) -> T
where
    F: FnOnce() -> T,
{
    let was_enabled = Sstatus::read().contains(SstatusFlags::SUM);

    // Enable user access
    // SAFETY: enabling SUM is safe since it only expands access permissions
    unsafe { Sstatus::set(SstatusFlags::SUM) };

    let ret = f();

    if !was_enabled {
        // SAFETY: we are restoring previous state
        unsafe { Sstatus::clear(SstatusFlags::SUM) };
    }

    ret
}
