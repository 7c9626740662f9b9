//! Callee-saved register context exchanged by the context switch primitive.

use core::mem::size_of;

use static_assertions::{const_assert, const_assert_eq};

/// Registers preserved across a cooperative context switch.
///
/// The switch routine pushes this structure onto the outgoing stack and pops it from the
/// incoming one, so a suspended task's saved stack pointer always points at one of these.
/// It is padded to 16 bytes to keep the stack aligned.
#[repr(C, align(16))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskContext {
    /// Return address of the switch routine.
    pub ra: usize,
    /// Callee-saved registers `s0` to `s11`.
    pub s: [usize; 12],
}

impl TaskContext {
    /// Number of registers saved in a context.
    pub const REGS: usize = 13;

    /// Size of the context on the stack, in bytes, padding included.
    pub const SIZE: usize = size_of::<Self>();

    /// Creates the context of a task that has never run: resuming it jumps to `entry` with all
    /// callee-saved registers cleared.
    pub const fn new(entry: usize) -> Self {
        Self {
            ra: entry,
            s: [0; 12],
        }
    }
}

const_assert!(TaskContext::SIZE >= TaskContext::REGS * size_of::<usize>());
const_assert_eq!(TaskContext::SIZE % 16, 0);

#[cfg(test)]
mod tests {
    use core::mem::offset_of;

    use super::*;

    #[test]
    fn layout() {
        assert_eq!(offset_of!(TaskContext, ra), 0);
        assert_eq!(offset_of!(TaskContext, s), size_of::<usize>());
        assert_eq!(TaskContext::SIZE % 16, 0);
        assert_eq!(TaskContext::SIZE, 16 * size_of::<usize>());
    }

    #[test]
    fn fresh_context() {
        let ctx = TaskContext::new(0x8020_1000);

        assert_eq!(ctx.ra, 0x8020_1000);
        assert!(ctx.s.iter().all(|&r| r == 0));
    }
}
