//! Access to various system registers.

use core::arch::asm;

use bitflags::bitflags;

/// Generates read/write accessors for a CSR holding a plain machine word.
macro_rules! word_csr {
    ($(#[$doc:meta])* $name:ident, $csr:literal) => {
        $(#[$doc])*
        #[derive(Debug)]
        pub struct $name;

        impl $name {
            #[doc = concat!("Reads the content of `", $csr, "`.")]
            #[inline]
            pub fn read() -> usize {
                let value: usize;
                // SAFETY: reading this CSR has no side effects
                unsafe {
                    asm!(concat!("csrr {}, ", $csr), out(reg) value, options(nomem, nostack));
                }
                value
            }

            #[doc = concat!("Writes to `", $csr, "`.")]
            ///
            /// ## Safety
            ///
            /// This function is unsafe because it's possible to violate memory safety through it.
            #[inline]
            pub unsafe fn write(v: usize) {
                unsafe { asm!(concat!("csrw ", $csr, ", {}"), in(reg) v, options(nostack)) };
            }
        }
    };
}

bitflags! {
    /// Flags for the `sstatus` register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SstatusFlags: usize {
        /// S-Mode interrupt enable.
        const SIE = 1 << 1;
        /// S-Mode previous interrupt enable.
        const SPIE = 1 << 5;
        /// S-Mode previous privilege level.
        const SPP = 1 << 8;
        /// Permit S-Mode user memory access.
        const SUM = 1 << 18;
        /// Make executable readable.
        const MXR = 1 << 19;
    }
}

/// The `sstatus` register keeps track of the processor’s current operating state.
#[derive(Debug)]
pub struct Sstatus;

impl Sstatus {
    /// Reads the content of `sstatus`.
    #[inline]
    pub fn read() -> SstatusFlags {
        SstatusFlags::from_bits_retain(Self::read_raw())
    }

    /// Reads the raw content of `sstatus`.
    #[inline]
    pub fn read_raw() -> usize {
        let value: usize;
        // SAFETY: reading `sstatus` has no side effects
        unsafe {
            asm!("csrr {}, sstatus", out(reg) value, options(nomem, nostack));
        }
        value
    }

    /// Writes flags to `sstatus`.
    ///
    /// ## Safety
    ///
    /// This function is unsafe because it's possible to violate memory safety through it.
    #[inline]
    pub unsafe fn write(flags: SstatusFlags) {
        unsafe { asm!("csrw sstatus, {}", in(reg) flags.bits(), options(nostack)) };
    }

    /// Sets the specified flags to `sstatus`.
    ///
    /// ## Safety
    ///
    /// This function is unsafe because it's possible to violate memory safety through it.
    #[inline]
    pub unsafe fn set(flags: SstatusFlags) {
        unsafe { asm!("csrs sstatus, {}", in(reg) flags.bits(), options(nostack)) };
    }

    /// Clears the specified flags from `sstatus`.
    ///
    /// ## Safety
    ///
    /// This function is unsafe because it's possible to violate memory safety through it.
    #[inline]
    pub unsafe fn clear(flags: SstatusFlags) {
        unsafe { asm!("csrc sstatus, {}", in(reg) flags.bits(), options(nostack)) };
    }
}

bitflags! {
    /// Flags for the `sie`/`sip` registers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SiFlags: usize {
        /// S-Mode software interrupt enable.
        const SSIE = 1 << 1;
        /// S-Mode timer interrupt enable.
        const STIE = 1 << 5;
        /// S-Mode external interrupt enable.
        const SEIE = 1 << 9;
    }
}

/// The `sie` register contains interrupt enable bits.
#[derive(Debug)]
pub struct Sie;

impl Sie {
    /// Clears the specified flags from `sie`.
    #[inline]
    pub fn clear(flags: SiFlags) {
        // SAFETY: masking interrupts cannot break memory safety
        unsafe { asm!("csrc sie, {}", in(reg) flags.bits(), options(nostack)) };
    }
}

word_csr!(
    /// The `stvec` register holds trap vector configuration.
    Stvec,
    "stvec"
);

word_csr!(
    /// The `sscratch` register holds the kernel stack top of the running process.
    Sscratch,
    "sscratch"
);

word_csr!(
    /// The `sepc` register holds the address of the instruction that trapped.
    Sepc,
    "sepc"
);

word_csr!(
    /// The `scause` register holds the code of the last trap.
    Scause,
    "scause"
);

word_csr!(
    /// The `stval` register holds exception-specific information to assist software in handling
    /// a trap.
    Stval,
    "stval"
);

word_csr!(
    /// The `satp` register controls S-Mode address translation and protection.
    Satp,
    "satp"
);
