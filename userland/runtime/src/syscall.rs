use core::{arch::asm, ffi::CStr};

/// Writes a character to the console.
pub(crate) fn sys_putchar(ch: u8) {
    syscall3(Syscall::PutChar, ch as usize, 0, 0);
}

/// Reads a character from the console, blocking until one is available.
pub(crate) fn sys_getchar() -> isize {
    syscall3(Syscall::GetChar, 0, 0, 0)
}

/// Terminates the calling process.
pub(crate) fn sys_exit() -> ! {
    syscall3(Syscall::Exit, 0, 0, 0);
    unreachable!("exit returned");
}

/// Reads up to `len` bytes of the file `name` into `buf`.
pub(crate) fn sys_readfile(name: &CStr, buf: *mut u8, len: usize) -> isize {
    syscall3(Syscall::ReadFile, name.as_ptr() as usize, buf as usize, len)
}

/// Replaces the contents of the file `name` with `len` bytes from `buf`.
pub(crate) fn sys_writefile(name: &CStr, buf: *const u8, len: usize) -> isize {
    syscall3(Syscall::WriteFile, name.as_ptr() as usize, buf as usize, len)
}

/// Powers the machine off.
pub(crate) fn sys_shutdown() -> ! {
    syscall3(Syscall::Shutdown, 0, 0, 0);
    unreachable!("shutdown returned");
}

/// Perform a syscall with up to 3 arguments.
///
/// The syscall number goes in `a3`, the result comes back in `a0`.
fn syscall3(sc: Syscall, mut arg0: usize, arg1: usize, arg2: usize) -> isize {
    unsafe {
        asm!("ecall",
                inout("a0") arg0,
                in("a1") arg1,
                in("a2") arg2,
                in("a3") usize::from(sc));
    }

    arg0 as isize
}

/// Syscall numbers.
#[derive(Clone, Copy)]
enum Syscall {
    PutChar = 1,
    GetChar = 2,
    Exit = 3,
    ReadFile = 4,
    WriteFile = 5,
    Shutdown = 8,
}

impl From<Syscall> for usize {
    fn from(syscall: Syscall) -> Self {
        syscall as usize
    }
}
