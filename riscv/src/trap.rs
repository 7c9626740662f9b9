//! Trap causes and the register snapshot taken on trap entry.

use core::{fmt, mem::size_of};

use static_assertions::{const_assert, const_assert_eq};

/// `scause` bit distinguishing interrupts from exceptions.
pub const CAUSE_IRQ_FLAG: usize = 1 << (usize::BITS - 1);

/// Possible exception causes on a RISC-V CPU.
#[repr(usize)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Exception {
    /// Instruction address misaligned.
    InstrAddrMisaligned = 0,
    /// Instruction access fault.
    InstrAccessFault = 1,
    /// Illegal instruction.
    IllegalInstr = 2,
    /// Breakpoint.
    Breakpoint = 3,
    /// Load address misaligned.
    LoadAddrMisaligned = 4,
    /// Load access fault.
    LoadAccessFault = 5,
    /// Store/AMO address misaligned.
    StoreAddrMisaligned = 6,
    /// Store/AMO access fault.
    StoreAccessFault = 7,
    /// Environment call from U-mode.
    EnvCallFromU = 8,
    /// Environment call from S-mode.
    EnvCallFromS = 9,
    /// Instruction page fault.
    InstrPageFault = 12,
    /// Load page fault.
    LoadPageFault = 13,
    /// Store/AMO page fault.
    StorePageFault = 15,
}

impl TryFrom<usize> for Exception {
    type Error = usize;

    fn try_from(n: usize) -> Result<Self, Self::Error> {
        use Exception::*;

        Ok(match n {
            0 => InstrAddrMisaligned,
            1 => InstrAccessFault,
            2 => IllegalInstr,
            3 => Breakpoint,
            4 => LoadAddrMisaligned,
            5 => LoadAccessFault,
            6 => StoreAddrMisaligned,
            7 => StoreAccessFault,
            8 => EnvCallFromU,
            9 => EnvCallFromS,
            12 => InstrPageFault,
            13 => LoadPageFault,
            15 => StorePageFault,
            _ => return Err(n),
        })
    }
}

/// A decoded `scause` value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Trap {
    /// An asynchronous interrupt with the given code.
    Interrupt(usize),
    /// A synchronous exception.
    Exception(Exception),
    /// An exception code reserved by the privileged specification.
    Reserved(usize),
}

impl Trap {
    /// Decodes a raw `scause` value.
    pub fn from_scause(scause: usize) -> Self {
        let code = scause & !CAUSE_IRQ_FLAG;

        if scause & CAUSE_IRQ_FLAG != 0 {
            Trap::Interrupt(code)
        } else {
            Exception::try_from(code).map_or(Trap::Reserved(code), Trap::Exception)
        }
    }

    /// Returns whether this trap was caused by an `ecall` instruction.
    pub fn is_ecall(&self) -> bool {
        matches!(
            self,
            Trap::Exception(Exception::EnvCallFromU | Exception::EnvCallFromS)
        )
    }
}

/// Information stored by the trap handler.
///
/// Note: the order of the fields in this structure **must** match the order in which registers
/// are pushed to the stack in the handler's trampoline. The trampoline derives its offsets from
/// this definition, so keep the two in the same crate build.
///
/// The frame is padded to 16 bytes so the stack stays aligned as the psABI requires.
#[repr(C, align(16))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct TrapFrame {
    pub ra: usize,
    pub gp: usize,
    pub tp: usize,
    pub t0: usize,
    pub t1: usize,
    pub t2: usize,
    pub t3: usize,
    pub t4: usize,
    pub t5: usize,
    pub t6: usize,
    pub a0: usize,
    pub a1: usize,
    pub a2: usize,
    pub a3: usize,
    pub a4: usize,
    pub a5: usize,
    pub a6: usize,
    pub a7: usize,
    pub s0: usize,
    pub s1: usize,
    pub s2: usize,
    pub s3: usize,
    pub s4: usize,
    pub s5: usize,
    pub s6: usize,
    pub s7: usize,
    pub s8: usize,
    pub s9: usize,
    pub s10: usize,
    pub s11: usize,
    /// Stack pointer of the interrupted context.
    pub sp: usize,
}

impl TrapFrame {
    /// Number of registers saved in a frame.
    pub const REGS: usize = 31;

    /// Size of the frame on the stack, in bytes, padding included.
    pub const SIZE: usize = size_of::<Self>();
}

const_assert!(TrapFrame::SIZE >= TrapFrame::REGS * size_of::<usize>());
const_assert_eq!(TrapFrame::SIZE % 16, 0);

impl fmt::Display for TrapFrame {
    #[rustfmt::skip]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self;
        writeln!(f, " RA was at {:08x}", s.ra)?;
        writeln!(f, " sp : {:08x}  gp : {:08x}  tp : {:08x}", s.sp, s.gp, s.tp)?;
        writeln!(f, " t0 : {:08x}  t1 : {:08x}  t2 : {:08x}", s.t0, s.t1, s.t2)?;
        writeln!(f, " t3 : {:08x}  t4 : {:08x}  t5 : {:08x}", s.t3, s.t4, s.t5)?;
        writeln!(f, " t6 : {:08x}  a0 : {:08x}  a1 : {:08x}", s.t6, s.a0, s.a1)?;
        writeln!(f, " a2 : {:08x}  a3 : {:08x}  a4 : {:08x}", s.a2, s.a3, s.a4)?;
        writeln!(f, " a5 : {:08x}  a6 : {:08x}  a7 : {:08x}", s.a5, s.a6, s.a7)?;
        writeln!(f, " s0 : {:08x}  s1 : {:08x}  s2 : {:08x}", s.s0, s.s1, s.s2)?;
        writeln!(f, " s3 : {:08x}  s4 : {:08x}  s5 : {:08x}", s.s3, s.s4, s.s5)?;
        writeln!(f, " s6 : {:08x}  s7 : {:08x}  s8 : {:08x}", s.s6, s.s7, s.s8)?;
        write!(f, " s9 : {:08x}  s10: {:08x}  s11: {:08x}", s.s9, s.s10, s.s11)
    }
}

#[cfg(test)]
mod tests {
    use core::mem::offset_of;

    use super::*;

    const W: usize = size_of::<usize>();

    #[test]
    fn scause_decoding() {
        assert_eq!(Trap::from_scause(8), Trap::Exception(Exception::EnvCallFromU));
        assert_eq!(Trap::from_scause(9), Trap::Exception(Exception::EnvCallFromS));
        assert_eq!(Trap::from_scause(2), Trap::Exception(Exception::IllegalInstr));
        assert_eq!(Trap::from_scause(CAUSE_IRQ_FLAG | 5), Trap::Interrupt(5));
        assert_eq!(Trap::from_scause(10), Trap::Reserved(10));

        assert!(Trap::from_scause(8).is_ecall());
        assert!(Trap::from_scause(9).is_ecall());
        assert!(!Trap::from_scause(CAUSE_IRQ_FLAG | 8).is_ecall());
        assert!(!Trap::from_scause(13).is_ecall());
    }

    #[test]
    fn frame_offsets() {
        let expected = [
            (offset_of!(TrapFrame, ra), 0),
            (offset_of!(TrapFrame, gp), 1),
            (offset_of!(TrapFrame, tp), 2),
            (offset_of!(TrapFrame, t0), 3),
            (offset_of!(TrapFrame, t1), 4),
            (offset_of!(TrapFrame, t2), 5),
            (offset_of!(TrapFrame, t3), 6),
            (offset_of!(TrapFrame, t4), 7),
            (offset_of!(TrapFrame, t5), 8),
            (offset_of!(TrapFrame, t6), 9),
            (offset_of!(TrapFrame, a0), 10),
            (offset_of!(TrapFrame, a1), 11),
            (offset_of!(TrapFrame, a2), 12),
            (offset_of!(TrapFrame, a3), 13),
            (offset_of!(TrapFrame, a4), 14),
            (offset_of!(TrapFrame, a5), 15),
            (offset_of!(TrapFrame, a6), 16),
            (offset_of!(TrapFrame, a7), 17),
            (offset_of!(TrapFrame, s0), 18),
            (offset_of!(TrapFrame, s1), 19),
            (offset_of!(TrapFrame, s2), 20),
            (offset_of!(TrapFrame, s3), 21),
            (offset_of!(TrapFrame, s4), 22),
            (offset_of!(TrapFrame, s5), 23),
            (offset_of!(TrapFrame, s6), 24),
            (offset_of!(TrapFrame, s7), 25),
            (offset_of!(TrapFrame, s8), 26),
            (offset_of!(TrapFrame, s9), 27),
            (offset_of!(TrapFrame, s10), 28),
            (offset_of!(TrapFrame, s11), 29),
            (offset_of!(TrapFrame, sp), 30),
        ];

        for (offset, slot) in expected {
            assert_eq!(offset, slot * W);
        }
    }

    #[test]
    fn every_field_maps_to_its_own_slot() {
        // Fill the raw stack words the way the trampoline does and read them back by name
        let mut words = [0usize; TrapFrame::SIZE / W];
        for (i, w) in words.iter_mut().take(TrapFrame::REGS).enumerate() {
            *w = 0x1000 + i;
        }

        let tf: TrapFrame = unsafe { core::mem::transmute(words) };
        let named = [
            tf.ra, tf.gp, tf.tp, tf.t0, tf.t1, tf.t2, tf.t3, tf.t4, tf.t5, tf.t6, tf.a0, tf.a1,
            tf.a2, tf.a3, tf.a4, tf.a5, tf.a6, tf.a7, tf.s0, tf.s1, tf.s2, tf.s3, tf.s4, tf.s5,
            tf.s6, tf.s7, tf.s8, tf.s9, tf.s10, tf.s11, tf.sp,
        ];

        assert_eq!(named[..], words[..TrapFrame::REGS]);
    }

    #[test]
    fn frame_keeps_stack_aligned() {
        assert_eq!(TrapFrame::SIZE % 16, 0);
        assert_eq!(TrapFrame::SIZE, 32 * W);
    }

    #[test]
    fn dump_mentions_every_register() {
        let tf = TrapFrame {
            a3: 0xdead_beef,
            sp: 0x0100_8000,
            ..Default::default()
        };
        let dump = format!("{}", tf);

        assert!(dump.contains("a3 : deadbeef"));
        assert!(dump.contains("sp : 01008000"));
        assert!(dump.contains("RA was at 00000000"));
        // One `name : value` pair for each of the remaining 30 registers
        assert_eq!(dump.matches(':').count(), 30);
    }
}
