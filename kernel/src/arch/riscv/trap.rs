//! RISC-V trap entry.
//!
//! While a process runs, `sscratch` holds the top of its kernel stack. The trampoline swaps it
//! with `sp`, pushes a [`TrapFrame`] there and restores `sscratch` before calling into Rust, so
//! nested switches to other processes find their own stack top in place.

use core::mem::offset_of;

use ::riscv::{
    registers::{Scause, Sepc, Sscratch, Stval, Stvec},
    trap::TrapFrame,
};

use crate::{
    config::BOOT_TRAP_STACK_SIZE,
    syscall::{self, Kernel},
};

core::arch::global_asm!(
    ".section .text",
    ".balign 4",
    ".global trap_entry",
    "trap_entry:",
    // sp <- kernel stack top, sscratch <- interrupted sp
    "csrrw sp, sscratch, sp",
    "addi sp, sp, -{size}",
    "sw ra, {ra}(sp)",
    "sw gp, {gp}(sp)",
    "sw tp, {tp}(sp)",
    "sw t0, {t0}(sp)",
    "sw t1, {t1}(sp)",
    "sw t2, {t2}(sp)",
    "sw t3, {t3}(sp)",
    "sw t4, {t4}(sp)",
    "sw t5, {t5}(sp)",
    "sw t6, {t6}(sp)",
    "sw a0, {a0}(sp)",
    "sw a1, {a1}(sp)",
    "sw a2, {a2}(sp)",
    "sw a3, {a3}(sp)",
    "sw a4, {a4}(sp)",
    "sw a5, {a5}(sp)",
    "sw a6, {a6}(sp)",
    "sw a7, {a7}(sp)",
    "sw s0, {s0}(sp)",
    "sw s1, {s1}(sp)",
    "sw s2, {s2}(sp)",
    "sw s3, {s3}(sp)",
    "sw s4, {s4}(sp)",
    "sw s5, {s5}(sp)",
    "sw s6, {s6}(sp)",
    "sw s7, {s7}(sp)",
    "sw s8, {s8}(sp)",
    "sw s9, {s9}(sp)",
    "sw s10, {s10}(sp)",
    "sw s11, {s11}(sp)",
    // Interrupted sp, then give the kernel stack top back to sscratch
    "csrr a0, sscratch",
    "sw a0, {sp}(sp)",
    "addi a0, sp, {size}",
    "csrw sscratch, a0",
    "mv a0, sp",
    "call {handler}",
    "lw ra, {ra}(sp)",
    "lw gp, {gp}(sp)",
    "lw tp, {tp}(sp)",
    "lw t0, {t0}(sp)",
    "lw t1, {t1}(sp)",
    "lw t2, {t2}(sp)",
    "lw t3, {t3}(sp)",
    "lw t4, {t4}(sp)",
    "lw t5, {t5}(sp)",
    "lw t6, {t6}(sp)",
    "lw a0, {a0}(sp)",
    "lw a1, {a1}(sp)",
    "lw a2, {a2}(sp)",
    "lw a3, {a3}(sp)",
    "lw a4, {a4}(sp)",
    "lw a5, {a5}(sp)",
    "lw a6, {a6}(sp)",
    "lw a7, {a7}(sp)",
    "lw s0, {s0}(sp)",
    "lw s1, {s1}(sp)",
    "lw s2, {s2}(sp)",
    "lw s3, {s3}(sp)",
    "lw s4, {s4}(sp)",
    "lw s5, {s5}(sp)",
    "lw s6, {s6}(sp)",
    "lw s7, {s7}(sp)",
    "lw s8, {s8}(sp)",
    "lw s9, {s9}(sp)",
    "lw s10, {s10}(sp)",
    "lw s11, {s11}(sp)",
    "lw sp, {sp}(sp)",
    "sret",
    size = const TrapFrame::SIZE,
    ra = const offset_of!(TrapFrame, ra),
    gp = const offset_of!(TrapFrame, gp),
    tp = const offset_of!(TrapFrame, tp),
    t0 = const offset_of!(TrapFrame, t0),
    t1 = const offset_of!(TrapFrame, t1),
    t2 = const offset_of!(TrapFrame, t2),
    t3 = const offset_of!(TrapFrame, t3),
    t4 = const offset_of!(TrapFrame, t4),
    t5 = const offset_of!(TrapFrame, t5),
    t6 = const offset_of!(TrapFrame, t6),
    a0 = const offset_of!(TrapFrame, a0),
    a1 = const offset_of!(TrapFrame, a1),
    a2 = const offset_of!(TrapFrame, a2),
    a3 = const offset_of!(TrapFrame, a3),
    a4 = const offset_of!(TrapFrame, a4),
    a5 = const offset_of!(TrapFrame, a5),
    a6 = const offset_of!(TrapFrame, a6),
    a7 = const offset_of!(TrapFrame, a7),
    s0 = const offset_of!(TrapFrame, s0),
    s1 = const offset_of!(TrapFrame, s1),
    s2 = const offset_of!(TrapFrame, s2),
    s3 = const offset_of!(TrapFrame, s3),
    s4 = const offset_of!(TrapFrame, s4),
    s5 = const offset_of!(TrapFrame, s5),
    s6 = const offset_of!(TrapFrame, s6),
    s7 = const offset_of!(TrapFrame, s7),
    s8 = const offset_of!(TrapFrame, s8),
    s9 = const offset_of!(TrapFrame, s9),
    s10 = const offset_of!(TrapFrame, s10),
    s11 = const offset_of!(TrapFrame, s11),
    sp = const offset_of!(TrapFrame, sp),
    handler = sym handle_trap,
);

extern "C" fn handle_trap(tf: &mut TrapFrame) {
    // Read before dispatching: a syscall may switch to other processes
    let scause = Scause::read();
    let stval = Stval::read();
    let sepc = Sepc::read();

    let next = syscall::handle_trap(&mut Kernel, tf, scause, stval, sepc);

    // SAFETY: resuming right after the `ecall` that trapped
    unsafe { Sepc::write(next) };
}

#[repr(C, align(16))]
struct TrapStack([u8; BOOT_TRAP_STACK_SIZE]);

/// Stack used by the trampoline until the scheduler installs a process kernel stack.
static mut BOOT_TRAP_STACK: TrapStack = TrapStack([0; BOOT_TRAP_STACK_SIZE]);

/// Configures the trap vector used to handle traps in S-mode.
///
/// Traps taken before the first context switch land on a dedicated boot trap stack.
pub fn init() {
    extern "C" {
        fn trap_entry();
    }

    let top = core::ptr::addr_of_mut!(BOOT_TRAP_STACK) as usize + BOOT_TRAP_STACK_SIZE;

    // SAFETY: the boot trap stack is only ever used by the trampoline, and `trap_entry` is
    // 4-byte aligned, which selects direct mode
    unsafe {
        Sscratch::write(top);
        Stvec::write(trap_entry as usize);
    }
}
