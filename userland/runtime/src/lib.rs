#![no_std]

pub mod fs;
pub mod io;

mod syscall;

#[cfg(target_arch = "riscv32")]
core::arch::global_asm!(include_str!("arch/riscv32/start.S"));

/// Terminates the calling process.
pub fn exit() -> ! {
    syscall::sys_exit()
}

/// Powers the machine off.
pub fn shutdown() -> ! {
    syscall::sys_shutdown()
}

#[unsafe(no_mangle)]
pub extern "C" fn __entry() -> ! {
    unsafe extern "C" {
        fn main() -> isize;
    }
    unsafe { main() };
    exit()
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    crate::println!("user panic: {}", info);
    exit()
}
