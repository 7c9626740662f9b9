//! Kernel panic handler.

/// Implements the kernel's panic behavior.
#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    kprintln!("Kernel panic: {}", info);

    kprintln!("Halting!");

    crate::arch::halt();
}
