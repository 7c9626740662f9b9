//! Board and kernel-wide configuration constants.

#[cfg(feature = "config-qemu")]
mod qemu;

#[cfg(feature = "config-qemu")]
pub use qemu::*;

#[cfg(not(feature = "config-qemu"))]
compile_error!("no board configuration selected, enable the \"config-qemu\" feature");

/// Maximum number of processes, idle process included.
pub const PROCS_MAX: usize = 8;

/// Size of the private kernel stack of every process.
pub const KERNEL_STACK_SIZE: usize = 8192;

/// Size of the stack taking traps raised before the first process runs.
pub const BOOT_TRAP_STACK_SIZE: usize = 4096;

/// Virtual address at which user images are loaded and entered.
pub const USER_BASE: u32 = 0x0100_0000;

/// Maximum number of files held by the in-memory file table.
pub const FILES_MAX: usize = 2;

/// Capacity of the data buffer of every file, in bytes.
pub const FILE_DATA_MAX: usize = 1024;

/// Size of a block device sector, in bytes.
pub const SECTOR_SIZE: usize = 512;
