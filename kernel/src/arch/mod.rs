//! Architecture-specific functions.

/// RISC-V architecture.
#[cfg(target_arch = "riscv32")]
mod riscv;
#[cfg(target_arch = "riscv32")]
pub use self::riscv::*;

/// Halt stub used on the host.
#[cfg(not(target_arch = "riscv32"))]
pub fn halt() -> ! {
    loop {
        core::hint::spin_loop();
    }
}
