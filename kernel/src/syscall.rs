//! Trap dispatch and syscalls implementation.
//!
//! Syscall ABI: the number is passed in `a3`, arguments in `a0` to `a2`, and the result is
//! returned in `a0`. Every failure is reported to user space as `-1`.

use core::{marker::PhantomData, slice};

use riscv::trap::{Trap, TrapFrame};

use crate::{
    config::FILE_DATA_MAX,
    drivers::block::BlockDevice,
    fs::{tar::NAME_MAX, FileTable},
    proc::Pid,
};

/// Syscall numbers.
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sysno {
    /// Write a character to the console.
    PutChar = 1,
    /// Read a character from the console, waiting for one if needed.
    GetChar = 2,
    /// Terminate the calling process.
    Exit = 3,
    /// Read the beginning of a file.
    ReadFile = 4,
    /// Replace the contents of a file.
    WriteFile = 5,
    /// Power off the machine.
    Shutdown = 8,
}

impl TryFrom<usize> for Sysno {
    type Error = usize;

    fn try_from(n: usize) -> Result<Self, Self::Error> {
        Ok(match n {
            1 => Sysno::PutChar,
            2 => Sysno::GetChar,
            3 => Sysno::Exit,
            4 => Sysno::ReadFile,
            5 => Sysno::WriteFile,
            8 => Sysno::Shutdown,
            _ => return Err(n),
        })
    }
}

/// Syscall arguments passed from user space.
#[derive(Debug, Copy, Clone)]
pub struct SysArgs([usize; 3]);

impl SysArgs {
    /// Creates a new `SysArgs` instance from the given array of syscall arguments.
    #[inline]
    pub fn new(args: [usize; 3]) -> Self {
        SysArgs(args)
    }

    /// Retrieves the syscall argument at the specified index.
    #[inline]
    pub fn get(&self, n: usize) -> usize {
        self.0[n]
    }
}

/// Possible syscall error codes.
#[repr(isize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    /// No such file or directory
    ENOENT = 2,
    /// Invalid argument
    EINVAL = 22,
    /// Function not implemented
    ENOSYS = 38,
}

/// Syscall result type.
pub type SysResult<T> = Result<T, Errno>;

/// Converts a `SysResult` into a raw return value for syscalls.
pub fn to_ret(res: SysResult<usize>) -> usize {
    match res {
        Ok(val) => val,
        Err(_) => -1isize as usize,
    }
}

/// A raw pointer to a user-space memory location.
///
/// User memory cannot be directly dereferenced from kernel space, so this type is used to
/// represent pointers to user memory safely. To access the data pointed to by a `UserPtr`,
/// the copy functions of [`SyscallContext`] must be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserPtr<T> {
    addr: usize,
    _marker: PhantomData<T>,
}

impl<T> UserPtr<T> {
    /// Marks a raw user-space pointer.
    pub fn new(addr: usize) -> Self {
        UserPtr {
            addr,
            _marker: PhantomData,
        }
    }

    /// Returns the user address.
    pub fn addr(&self) -> usize {
        self.addr
    }

    /// Returns a pointer `count` elements further.
    pub fn add(&self, count: usize) -> Self {
        Self::new(self.addr.wrapping_add(count * core::mem::size_of::<T>()))
    }
}

/// The kernel services syscalls are built upon.
pub trait SyscallContext {
    /// Writes a byte to the console.
    fn putchar(&mut self, byte: u8);

    /// Reads a byte from the console, if one is pending.
    fn getchar(&mut self) -> Option<u8>;

    /// Lets other processes run.
    fn yield_now(&mut self);

    /// Marks the calling process as exited and returns its pid.
    fn exit_current(&mut self) -> Pid;

    /// Powers the machine off.
    fn shutdown(&mut self) -> !;

    /// Runs `f` with exclusive access to the file table and the device backing it.
    fn with_files<R>(&mut self, f: impl FnOnce(&mut FileTable, &mut dyn BlockDevice) -> R) -> R;

    /// Copies `dst.len()` bytes from user memory at `src` into `dst`.
    ///
    /// # Safety
    ///
    /// `src` must point to `dst.len()` bytes mapped in the calling process.
    unsafe fn copy_from_user(&mut self, dst: &mut [u8], src: UserPtr<u8>);

    /// Copies `src` into user memory at `dst`.
    ///
    /// # Safety
    ///
    /// `dst` must point to `src.len()` writable bytes mapped in the calling process.
    unsafe fn copy_to_user(&mut self, dst: UserPtr<u8>, src: &[u8]);
}

/// Dispatches a trap taken with the register state `tf` and returns the address to resume at.
///
/// Environment calls run the requested syscall and resume at the next instruction. Any other
/// trap is fatal.
pub fn handle_trap<C: SyscallContext>(
    ctx: &mut C,
    tf: &mut TrapFrame,
    scause: usize,
    stval: usize,
    sepc: usize,
) -> usize {
    let trap = Trap::from_scause(scause);

    if !trap.is_ecall() {
        panic!(
            "unexpected trap scause={:x}, stval={:x}, sepc={:x} ({:?})\n{}",
            scause, stval, sepc, trap, tf
        );
    }

    handle_syscall(ctx, tf);
    sepc + 4
}

/// Runs the syscall described by `tf` and stores the result in `a0`.
pub fn handle_syscall<C: SyscallContext>(ctx: &mut C, tf: &mut TrapFrame) {
    let args = SysArgs::new([tf.a0, tf.a1, tf.a2]);

    let res = match Sysno::try_from(tf.a3) {
        Ok(Sysno::PutChar) => sys_putchar(ctx, args),
        Ok(Sysno::GetChar) => sys_getchar(ctx),
        Ok(Sysno::Exit) => sys_exit(ctx),
        Ok(Sysno::ReadFile) => sys_readfile(ctx, args),
        Ok(Sysno::WriteFile) => sys_writefile(ctx, args),
        Ok(Sysno::Shutdown) => sys_shutdown(ctx),
        Err(n) => {
            kwarn!("unexpected syscall a3={:x}", n);
            Err(Errno::ENOSYS)
        }
    };

    tf.a0 = to_ret(res);
}

/// Writes the character in the first argument to the console.
pub fn sys_putchar<C: SyscallContext>(ctx: &mut C, args: SysArgs) -> SysResult<usize> {
    ctx.putchar(args.get(0) as u8);
    Ok(0)
}

/// Returns the next console character, yielding to other processes until one arrives.
pub fn sys_getchar<C: SyscallContext>(ctx: &mut C) -> SysResult<usize> {
    loop {
        if let Some(byte) = ctx.getchar() {
            return Ok(byte as usize);
        }
        ctx.yield_now();
    }
}

/// Terminates the calling process. Never returns.
pub fn sys_exit<C: SyscallContext>(ctx: &mut C) -> SysResult<usize> {
    let pid = ctx.exit_current();
    kinfo!("process {} exited", pid);

    ctx.yield_now();
    panic!("unreachable: exited process {} was resumed", pid);
}

/// Shuts the machine down. Never returns.
pub fn sys_shutdown<C: SyscallContext>(ctx: &mut C) -> SysResult<usize> {
    kinfo!("shutdown requested");
    ctx.shutdown()
}

/// Copies up to `len` bytes of the named file into a user buffer.
///
/// Arguments: file name, buffer, length. Returns the number of bytes copied.
pub fn sys_readfile<C: SyscallContext>(ctx: &mut C, args: SysArgs) -> SysResult<usize> {
    let len = checked_len(args.get(2))?;
    let buf = UserPtr::<u8>::new(args.get(1));

    let mut name = [0; NAME_MAX];
    let name = read_user_name(ctx, UserPtr::new(args.get(0)), &mut name)?;

    let mut bounce = [0; FILE_DATA_MAX];
    let n = ctx.with_files(|files, _| {
        let file = files.lookup(name).ok_or(Errno::ENOENT)?;
        Ok(file.read(&mut bounce[..len.min(FILE_DATA_MAX)]))
    })?;

    // SAFETY: the caller handed us a buffer of at least `len >= n` bytes
    unsafe { ctx.copy_to_user(buf, &bounce[..n]) };

    Ok(n)
}

/// Replaces the contents of the named file with up to `len` bytes of a user buffer, then writes
/// the file table back to disk.
///
/// Arguments: file name, buffer, length. Returns the number of bytes written.
pub fn sys_writefile<C: SyscallContext>(ctx: &mut C, args: SysArgs) -> SysResult<usize> {
    let len = checked_len(args.get(2))?.min(FILE_DATA_MAX);
    let buf = UserPtr::<u8>::new(args.get(1));

    let mut name = [0; NAME_MAX];
    let name = read_user_name(ctx, UserPtr::new(args.get(0)), &mut name)?;

    let mut bounce = [0; FILE_DATA_MAX];
    // SAFETY: the caller handed us a buffer of at least `len` bytes
    unsafe { ctx.copy_from_user(&mut bounce[..len], buf) };

    ctx.with_files(|files, dev| {
        let file = files.lookup_mut(name).ok_or(Errno::ENOENT)?;
        let n = file.write(&bounce[..len]);

        // Failures are logged by the filesystem; the in-memory contents stay updated
        let _ = files.flush(dev);

        Ok(n)
    })
}

/// Rejects lengths that are negative once interpreted as signed.
fn checked_len(raw: usize) -> SysResult<usize> {
    if (raw as isize) < 0 {
        Err(Errno::EINVAL)
    } else {
        Ok(raw)
    }
}

/// Reads a NUL-terminated file name from user memory into `buf`.
///
/// Names that do not fit `buf` cannot name any file.
fn read_user_name<'b, C: SyscallContext>(
    ctx: &mut C,
    src: UserPtr<u8>,
    buf: &'b mut [u8; NAME_MAX],
) -> SysResult<&'b [u8]> {
    let mut len = 0;

    loop {
        let mut byte = 0;
        // SAFETY: the string is NUL-terminated, we never read past its terminator
        unsafe { ctx.copy_from_user(slice::from_mut(&mut byte), src.add(len)) };

        if byte == 0 {
            return Ok(&buf[..len]);
        }
        if len == NAME_MAX {
            return Err(Errno::ENOENT);
        }

        buf[len] = byte;
        len += 1;
    }
}

/// Kernel services backing syscalls on the hardware.
#[cfg(target_arch = "riscv32")]
#[derive(Debug)]
pub struct Kernel;

#[cfg(target_arch = "riscv32")]
impl SyscallContext for Kernel {
    fn putchar(&mut self, byte: u8) {
        crate::drivers::earlycon::get().putchar(byte);
    }

    fn getchar(&mut self) -> Option<u8> {
        crate::drivers::earlycon::get().getchar()
    }

    fn yield_now(&mut self) {
        crate::proc::yield_now();
    }

    fn exit_current(&mut self) -> Pid {
        crate::proc::SCHEDULER.lock().exit_current()
    }

    fn shutdown(&mut self) -> ! {
        sbi::shutdown();
        kerr!("firmware refused to power off");
        crate::arch::halt()
    }

    fn with_files<R>(&mut self, f: impl FnOnce(&mut FileTable, &mut dyn BlockDevice) -> R) -> R {
        let Some(dev) = crate::drivers::BLOCK_DEVICE.get() else {
            panic!("file access before the block device is initialized");
        };

        let mut files = crate::fs::FILES.lock();
        let mut dev = dev.lock();
        f(&mut files, &mut *dev)
    }

    unsafe fn copy_from_user(&mut self, dst: &mut [u8], src: UserPtr<u8>) {
        // TODO: check user buffers against the process's mappings instead of faulting
        crate::arch::with_user_access(|| {
            let p = src.addr() as *const u8;
            for (i, b) in dst.iter_mut().enumerate() {
                // SAFETY: the caller guarantees the range is mapped
                *b = unsafe { core::ptr::read_volatile(p.add(i)) };
            }
        });
    }

    unsafe fn copy_to_user(&mut self, dst: UserPtr<u8>, src: &[u8]) {
        crate::arch::with_user_access(|| {
            let p = dst.addr() as *mut u8;
            for (i, &b) in src.iter().enumerate() {
                // SAFETY: the caller guarantees the range is mapped and writable
                unsafe { core::ptr::write_volatile(p.add(i), b) };
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::{
        config::SECTOR_SIZE,
        drivers::block::RamDisk,
        fs::{tests::disk_with, DISK_SIZE},
    };

    /// Base of the fake user memory.
    const USER: usize = 0x0100_0000;
    const SEPC: usize = 0x0100_0040;

    const NAME: usize = USER;
    const BUF: usize = USER + 0x100;

    struct Mock {
        out: Vec<u8>,
        input: VecDeque<Option<u8>>,
        yields: usize,
        pid: Pid,
        exited: bool,
        files: FileTable,
        disk: RamDisk,
        user: Vec<u8>,
    }

    impl Mock {
        fn new(disk: RamDisk) -> Self {
            let mut files = FileTable::new();
            let mut disk = disk;
            files.load(&mut disk).unwrap();

            Self {
                out: Vec::new(),
                input: VecDeque::new(),
                yields: 0,
                pid: 2,
                exited: false,
                files,
                disk,
                user: vec![0xee; 0x1000],
            }
        }

        fn poke(&mut self, addr: usize, bytes: &[u8]) {
            self.user[addr - USER..addr - USER + bytes.len()].copy_from_slice(bytes);
        }

        fn peek(&self, addr: usize, len: usize) -> &[u8] {
            &self.user[addr - USER..addr - USER + len]
        }

        fn call(&mut self, sysno: usize, a0: usize, a1: usize, a2: usize) -> (isize, usize) {
            let mut tf = TrapFrame {
                a0,
                a1,
                a2,
                a3: sysno,
                ..Default::default()
            };
            let pc = handle_trap(self, &mut tf, 8, 0, SEPC);
            (tf.a0 as isize, pc)
        }

        fn readfile(&mut self, name: &str, len: usize) -> isize {
            self.poke(NAME, name.as_bytes());
            self.poke(NAME + name.len(), &[0]);
            self.call(Sysno::ReadFile as usize, NAME, BUF, len).0
        }

        fn writefile(&mut self, name: &str, data: &[u8], len: usize) -> isize {
            self.poke(NAME, name.as_bytes());
            self.poke(NAME + name.len(), &[0]);
            self.poke(BUF, data);
            self.call(Sysno::WriteFile as usize, NAME, BUF, len).0
        }
    }

    impl SyscallContext for Mock {
        fn putchar(&mut self, byte: u8) {
            self.out.push(byte);
        }

        fn getchar(&mut self) -> Option<u8> {
            self.input.pop_front().flatten()
        }

        fn yield_now(&mut self) {
            self.yields += 1;
        }

        fn exit_current(&mut self) -> Pid {
            self.exited = true;
            self.pid
        }

        fn shutdown(&mut self) -> ! {
            panic!("machine powered off");
        }

        fn with_files<R>(
            &mut self,
            f: impl FnOnce(&mut FileTable, &mut dyn BlockDevice) -> R,
        ) -> R {
            f(&mut self.files, &mut self.disk)
        }

        unsafe fn copy_from_user(&mut self, dst: &mut [u8], src: UserPtr<u8>) {
            let len = dst.len();
            dst.copy_from_slice(self.peek(src.addr(), len));
        }

        unsafe fn copy_to_user(&mut self, dst: UserPtr<u8>, src: &[u8]) {
            self.poke(dst.addr(), src);
        }
    }

    fn hello_disk() -> RamDisk {
        disk_with(&[("hello.txt", "Hello world!\n"), ("meow.txt", "meow")])
    }

    #[test]
    fn sysno_decoding() {
        assert_eq!(Sysno::try_from(1), Ok(Sysno::PutChar));
        assert_eq!(Sysno::try_from(8), Ok(Sysno::Shutdown));
        assert_eq!(Sysno::try_from(6), Err(6));
        assert_eq!(to_ret(Err(Errno::ENOENT)), usize::MAX);
        assert_eq!(to_ret(Ok(7)), 7);
    }

    #[test]
    fn putchar_advances_pc() {
        let mut m = Mock::new(hello_disk());

        let (ret, pc) = m.call(Sysno::PutChar as usize, b'x' as usize, 0, 0);

        assert_eq!(ret, 0);
        assert_eq!(pc, SEPC + 4);
        assert_eq!(m.out, b"x");
    }

    #[test]
    fn getchar_yields_until_input() {
        let mut m = Mock::new(hello_disk());
        m.input.extend([None, None, Some(b'q')]);

        let (ret, _) = m.call(Sysno::GetChar as usize, 0, 0, 0);

        assert_eq!(ret, b'q' as isize);
        assert_eq!(m.yields, 2);
    }

    #[test]
    fn unknown_syscall() {
        let mut m = Mock::new(hello_disk());

        let (ret, pc) = m.call(42, 0, 0, 0);

        assert_eq!(ret, -1);
        assert_eq!(pc, SEPC + 4);
    }

    #[test]
    fn supervisor_ecalls_are_syscalls() {
        let mut m = Mock::new(hello_disk());
        let mut tf = TrapFrame {
            a0: b'k' as usize,
            a3: Sysno::PutChar as usize,
            ..Default::default()
        };

        assert_eq!(handle_trap(&mut m, &mut tf, 9, 0, SEPC), SEPC + 4);
        assert_eq!(m.out, b"k");
    }

    #[test]
    fn writefile_then_readfile() {
        let mut m = Mock::new(hello_disk());
        let msg = b"Hello from shell!\n";

        assert_eq!(m.writefile("hello.txt", msg, msg.len()), msg.len() as isize);
        assert_eq!(m.readfile("hello.txt", 100), msg.len() as isize);
        assert_eq!(m.peek(BUF, msg.len()), msg);
    }

    #[test]
    fn writes_reach_the_disk() {
        let mut m = Mock::new(hello_disk());
        let msg = b"Hello from shell!\n";
        m.writefile("hello.txt", msg, msg.len());

        let mut reloaded = FileTable::new();
        assert_eq!(reloaded.load(&mut m.disk), Ok(2));
        assert_eq!(reloaded.lookup(b"hello.txt").unwrap().contents(), msg);
        assert_eq!(reloaded.lookup(b"meow.txt").unwrap().contents(), b"meow");
    }

    #[test]
    fn missing_files() {
        let mut m = Mock::new(hello_disk());
        let before = m.disk.image();

        assert_eq!(m.readfile("nope.txt", 10), -1);
        assert_eq!(m.writefile("nope.txt", b"data", 4), -1);

        assert_eq!(m.disk.image(), before);
        assert!(m.peek(BUF + 4, 16).iter().all(|&b| b == 0xee));
    }

    #[test]
    fn reads_are_clamped_to_file_size() {
        let mut m = Mock::new(hello_disk());

        assert_eq!(m.readfile("meow.txt", 100), 4);
        assert_eq!(m.peek(BUF, 4), b"meow");
        // Nothing is written past the file contents
        assert_eq!(m.peek(BUF + 4, 1), [0xee]);

        assert_eq!(m.readfile("hello.txt", 5), 5);
        assert_eq!(m.peek(BUF, 6), b"Hello\xee");
    }

    #[test]
    fn writes_are_clamped_to_capacity() {
        let mut m = Mock::new(hello_disk());
        let data = vec![b'z'; FILE_DATA_MAX + 200];
        m.user.resize(0x1000 + FILE_DATA_MAX, 0);

        assert_eq!(
            m.writefile("meow.txt", &data, data.len()),
            FILE_DATA_MAX as isize
        );
        assert_eq!(
            m.files.lookup(b"meow.txt").unwrap().size(),
            FILE_DATA_MAX
        );
    }

    #[test]
    fn negative_lengths() {
        let mut m = Mock::new(hello_disk());

        assert_eq!(m.readfile("hello.txt", -1isize as usize), -1);
        assert_eq!(m.writefile("hello.txt", b"x", -5isize as usize), -1);
        assert_eq!(
            m.files.lookup(b"hello.txt").unwrap().contents(),
            b"Hello world!\n"
        );
    }

    #[test]
    fn overlong_names_are_not_found() {
        let mut m = Mock::new(hello_disk());
        let name = "n".repeat(NAME_MAX + 10);

        assert_eq!(m.readfile(&name, 10), -1);
    }

    #[test]
    fn failed_persist_keeps_memory_contents() {
        let mut m = Mock::new(hello_disk());
        m.disk = RamDisk::new(1);

        assert_eq!(m.writefile("meow.txt", b"purr", 4), 4);
        assert_eq!(m.files.lookup(b"meow.txt").unwrap().contents(), b"purr");
        assert_eq!(m.disk.image().len(), SECTOR_SIZE);
        assert!(DISK_SIZE > SECTOR_SIZE);
    }

    #[test]
    #[should_panic(expected = "exited process 2 was resumed")]
    fn exit_never_returns() {
        let mut m = Mock::new(hello_disk());
        m.call(Sysno::Exit as usize, 0, 0, 0);
    }

    #[test]
    #[should_panic(expected = "machine powered off")]
    fn shutdown_powers_off() {
        let mut m = Mock::new(hello_disk());
        m.call(Sysno::Shutdown as usize, 0, 0, 0);
    }

    #[test]
    #[should_panic(expected = "unexpected trap scause=2, stval=0, sepc=1000040")]
    fn illegal_instructions_are_fatal() {
        let mut m = Mock::new(hello_disk());
        let mut tf = TrapFrame::default();
        handle_trap(&mut m, &mut tf, 2, 0, SEPC);
    }

    #[test]
    #[should_panic(expected = "unexpected trap scause=d, stval=80200000")]
    fn page_faults_are_fatal() {
        let mut m = Mock::new(hello_disk());
        let mut tf = TrapFrame::default();
        handle_trap(&mut m, &mut tf, 13, 0x8020_0000, SEPC);
    }
}
