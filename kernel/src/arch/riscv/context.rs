//! Cooperative context switching and the first entry into user mode.

use core::arch::asm;

use ::riscv::{
    context::TaskContext,
    instructions::sfence_vma,
    registers::{Satp, Sscratch, SstatusFlags},
};
use static_assertions::const_assert_eq;

use crate::{config::USER_BASE, proc::ContextSwitch};

// Slots 1 to 12 of the context hold s0 to s11, slots 13 to 15 are padding
const_assert_eq!(TaskContext::SIZE, 16 * 4);

core::arch::global_asm!(
    ".section .text",
    ".global switch_context",
    "switch_context:",
    "addi sp, sp, -{size}",
    "sw ra, 0(sp)",
    "sw s0, 4(sp)",
    "sw s1, 8(sp)",
    "sw s2, 12(sp)",
    "sw s3, 16(sp)",
    "sw s4, 20(sp)",
    "sw s5, 24(sp)",
    "sw s6, 28(sp)",
    "sw s7, 32(sp)",
    "sw s8, 36(sp)",
    "sw s9, 40(sp)",
    "sw s10, 44(sp)",
    "sw s11, 48(sp)",
    "sw sp, (a0)",
    "lw sp, (a1)",
    "lw ra, 0(sp)",
    "lw s0, 4(sp)",
    "lw s1, 8(sp)",
    "lw s2, 12(sp)",
    "lw s3, 16(sp)",
    "lw s4, 20(sp)",
    "lw s5, 24(sp)",
    "lw s6, 28(sp)",
    "lw s7, 32(sp)",
    "lw s8, 36(sp)",
    "lw s9, 40(sp)",
    "lw s10, 44(sp)",
    "lw s11, 48(sp)",
    "addi sp, sp, {size}",
    "ret",
    size = const TaskContext::SIZE,
);

extern "C" {
    fn switch_context(prev_sp: *mut usize, next_sp: *const usize);
}

/// The running hart.
#[derive(Debug)]
pub struct Hart;

impl ContextSwitch for Hart {
    unsafe fn activate_address_space(&self, satp: usize) {
        sfence_vma();
        // SAFETY: the caller guarantees the new table maps the running kernel
        unsafe { Satp::write(satp) };
        sfence_vma();
    }

    unsafe fn set_trap_stack(&self, top: usize) {
        // SAFETY: the caller guarantees `top` is a kernel stack reserved for the next process
        unsafe { Sscratch::write(top) };
    }

    unsafe fn switch_context(&self, prev_sp: *mut usize, next_sp: *const usize) {
        // SAFETY: the caller guarantees `next_sp` holds a resumable context
        unsafe { switch_context(prev_sp, next_sp) };
    }
}

/// Where a fresh user process starts on its kernel stack: drops to U-mode at the image base.
pub extern "C" fn user_entry() -> ! {
    let sstatus = SstatusFlags::SPIE | SstatusFlags::SUM;

    // SAFETY: the process's address space maps its image at `USER_BASE` and `sscratch` holds its
    // kernel stack top
    unsafe {
        asm!(
            "csrw sepc, {sepc}",
            "csrw sstatus, {sstatus}",
            "sret",
            sepc = in(reg) USER_BASE as usize,
            sstatus = in(reg) sstatus.bits(),
            options(noreturn)
        );
    }
}
