//! rv32os is a minimal supervisor-mode kernel for 32-bit RISC-V machines with Sv32 paging.
//!
//! It boots on top of an SBI firmware, runs user programs in their own address space under a
//! cooperative round-robin scheduler, and exposes a handful of syscalls backed by a tiny
//! TAR-formatted file system stored on a VirtIO block device.
//!
//! rv32os is developed and tested using [QEMU](https://www.qemu.org/)'s `virt` machine.
//!
//! Everything but the boot path is plain Rust that also builds on the host, where the test suite
//! runs against emulated memory and devices.

// We are building a freestanding binary, so no standard library support for us
#![cfg_attr(target_os = "none", no_std)]
// Keep things clean and tidy
#![warn(missing_docs)]
#![warn(clippy::missing_safety_doc)]
#![warn(clippy::undocumented_unsafe_blocks)]
#![deny(unsafe_op_in_unsafe_fn)]

/// Console and logging macros.
#[macro_use]
pub mod macros;

pub mod arch;
pub mod config;
pub mod drivers;
pub mod fs;
pub mod mm;
pub mod panic;
pub mod proc;
pub mod syscall;

const RV32OS_ASCII_LOGO: &str = r#"
                _________
  _ ____   ____|___ /___ \  ___  ___
 | '__\ \ / /    |_ \ __) |/ _ \/ __|
 | |   \ V /    ___) / __/| (_) \__ \
 |_|    \_/    |____/_____|\___/|___/
"#;

/// Prints the logo and the firmware details.
pub fn print_banner() {
    kprintln!("{}", RV32OS_ASCII_LOGO);

    match sbi::Base::get_spec_version() {
        Ok(version) => {
            kinfo!("SBI specification v{} detected", version);

            if let (Ok(id), Ok(ver)) = (sbi::Base::get_impl_id(), sbi::Base::get_impl_version()) {
                kinfo!("SBI implementation ID=0x{:x} Version=0x{:x}", id, ver);
            }
        }
        Err(_) => kwarn!("SBI base extension not available"),
    }
}

/// Kernel entry point, called by the boot stub on the boot stack.
///
/// # Safety
///
/// Must be called exactly once, by the boot stub.
#[cfg(all(target_arch = "riscv32", target_os = "none"))]
#[no_mangle]
pub unsafe extern "C" fn kmain() -> ! {
    use ::riscv::VirtAddr;

    use crate::{
        config::USER_BASE,
        mm::FRAME_ALLOCATOR,
        proc::{SpaceBuilder, SCHEDULER},
    };

    /// The first user program.
    static USER_IMAGE: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/user.bin"));

    // SAFETY: nothing has touched a zero-initialized static yet
    unsafe { arch::clear_bss() };

    drivers::sbi_console::init();
    print_banner();

    arch::trap::init();

    let disk = drivers::init_block_device()
        .unwrap_or_else(|e| panic!("virtio-blk initialization failed: {}", e));

    {
        let mut allocator = FRAME_ALLOCATOR.lock();
        let mut space = SpaceBuilder {
            allocator: &mut *allocator,
            map: kmm::LinearMap::IDENTITY,
            layout: arch::memory_layout(),
        };

        let mut sched = SCHEDULER.lock();

        sched
            .init_idle(&mut space)
            .unwrap_or_else(|e| panic!("cannot create idle process: {}", e));

        let pid = sched
            .create(
                USER_IMAGE,
                VirtAddr::new(USER_BASE),
                arch::user_entry as usize,
                &mut space,
            )
            .unwrap_or_else(|e| panic!("cannot create user process: {}", e));

        kinfo!("proc: created pid {} ({} bytes image)", pid, USER_IMAGE.len());
    }

    match fs::FILES.lock().load(&mut *disk.lock()) {
        Ok(n) => kinfo!("fs: {} files loaded", n),
        Err(e) => kerr!("fs: cannot load file system: {}", e),
    }

    proc::yield_now();

    panic!("switched to idle process");
}
