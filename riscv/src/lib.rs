//! This crate provides RISC-V specific functions and data structures,
//! and access to various system registers.
//!
//! Only the 32-bit flavour of the architecture with Sv32 paging is supported. Register and
//! instruction wrappers are available when compiling for `riscv32`; everything else is plain data
//! and can be exercised on the host.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![deny(missing_debug_implementations)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod addr;
pub mod context;
pub mod mmu;
pub mod trap;

#[cfg(target_arch = "riscv32")]
pub mod instructions;
#[cfg(target_arch = "riscv32")]
pub mod registers;

pub use addr::{PhysAddr, VirtAddr, PAGE_SHIFT, PAGE_SIZE};
