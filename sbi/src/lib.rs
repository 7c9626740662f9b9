//! Implementation of the Supervisor Binary Interface (SBI) specification for RISC-V.
//!
//! This crate can be used to interact with an M-mode Runtime Firmware running on a RISC-V machine
//! to execute certain privileged operations in supervisor mode.
//!
//! On non-RISC-V hosts every call fails with [`SbiError::NotSupported`], which keeps code built on
//! top of this crate testable.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![deny(missing_debug_implementations)]

use core::fmt;

/// A standard SBI error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SbiError {
    /// Operation failed.
    Failed,
    /// Operation not supported.
    NotSupported,
    /// Invalid parameters in request.
    InvalidParam,
    /// Permission denied.
    Denied,
    /// Invalid address.
    InvalidAddress,
    /// Already available.
    AlreadyAvailable,
    /// An error code not covered by this crate.
    Unknown(isize),
}

impl From<isize> for SbiError {
    fn from(code: isize) -> Self {
        match code {
            -1 => SbiError::Failed,
            -2 => SbiError::NotSupported,
            -3 => SbiError::InvalidParam,
            -4 => SbiError::Denied,
            -5 => SbiError::InvalidAddress,
            -6 => SbiError::AlreadyAvailable,
            _ => SbiError::Unknown(code),
        }
    }
}

impl fmt::Display for SbiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SbiError::Failed => f.write_str("operation failed"),
            SbiError::NotSupported => f.write_str("operation not supported"),
            SbiError::InvalidParam => f.write_str("invalid parameter"),
            SbiError::Denied => f.write_str("operation not permitted"),
            SbiError::InvalidAddress => f.write_str("invalid address"),
            SbiError::AlreadyAvailable => f.write_str("already available"),
            SbiError::Unknown(code) => write!(f, "unknown error {}", code),
        }
    }
}

impl SbiError {
    /// Returns the raw SBI error code.
    pub fn code(self) -> isize {
        match self {
            SbiError::Failed => -1,
            SbiError::NotSupported => -2,
            SbiError::InvalidParam => -3,
            SbiError::Denied => -4,
            SbiError::InvalidAddress => -5,
            SbiError::AlreadyAvailable => -6,
            SbiError::Unknown(code) => code,
        }
    }
}

/// Result type for SBI operations.
pub type Result<T> = core::result::Result<T, SbiError>;

/// SBI extensions used by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Extension {
    /// Legacy Console Putchar operation.
    LegacyPutChar = 0x01,
    /// Legacy Console Getchar operation.
    LegacyGetChar = 0x02,
    /// Legacy System Shutdown operation.
    LegacySystemShutdown = 0x08,

    /// Base Extension.
    Base = 0x10,
    /// System Reset Extension.
    SystemReset = 0x53525354,
}

/// SBI specification version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecVersion {
    /// Major number of the SBI spec.
    pub major: usize,
    /// Minor number of the SBI spec.
    pub minor: usize,
}

impl SpecVersion {
    /// Decodes the value returned by `sbi_get_spec_version`.
    pub fn from_raw(v: usize) -> Self {
        SpecVersion {
            major: (v >> 24) & 0x7f,
            minor: v & 0xffffff,
        }
    }
}

impl fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

macro_rules! ecall {
    ($ext:expr, $fid:expr) => {
        ecall($ext, $fid, 0, 0)
    };
    ($ext:expr, $fid:expr, $a0:expr) => {
        ecall($ext, $fid, $a0, 0)
    };
    ($ext:expr, $fid:expr, $a0:expr, $a1: expr) => {
        ecall($ext, $fid, $a0, $a1)
    };
}

/// SBI Base Extension.
#[derive(Debug)]
pub struct Base;

impl Base {
    /// Returns the current SBI specification version.
    pub fn get_spec_version() -> Result<SpecVersion> {
        ecall!(Extension::Base, 0).map(SpecVersion::from_raw)
    }

    /// Returns the current SBI implementation ID, which is different for every SBI implementation.
    ///
    /// The implementation ID allows software to probe for SBI implementation quirks.
    pub fn get_impl_id() -> Result<usize> {
        ecall!(Extension::Base, 1)
    }

    /// Returns the current SBI implementation version.
    ///
    /// The encoding of this version number is specific to the SBI implementation.
    pub fn get_impl_version() -> Result<usize> {
        ecall!(Extension::Base, 2)
    }

    /// Returns zero if the given SBI extension ID (EID) is not available, or an extension-specific
    /// non-zero value if it is available.
    pub fn probe_extension(id: Extension) -> Result<usize> {
        ecall!(Extension::Base, 3, id as usize)
    }
}

/// Types of system reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum ResetType {
    /// Power off the whole system.
    Shutdown = 0,
}

/// Reasons for a system reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum ResetReason {
    /// Regular shutdown or reboot.
    NoReason = 0,
    /// Reset caused by a system failure.
    SystemFailure = 1,
}

/// SBI System Reset Extension.
#[derive(Debug)]
pub struct SystemReset;

impl SystemReset {
    /// Requests a system-level reset. Only returns on failure.
    pub fn reset(kind: ResetType, reason: ResetReason) -> SbiError {
        match ecall!(Extension::SystemReset, 0, kind as usize, reason as usize) {
            Ok(_) => SbiError::Failed,
            Err(e) => e,
        }
    }
}

/// Legacy (v0.1) extensions, still implemented by OpenSBI.
pub mod legacy {
    use super::{legacy_ecall, Extension};

    /// Writes a byte to the debug console.
    pub fn console_putchar(ch: u8) {
        legacy_ecall(Extension::LegacyPutChar, ch as usize);
    }

    /// Reads a byte from the debug console, if one is pending.
    pub fn console_getchar() -> Option<u8> {
        let ret = legacy_ecall(Extension::LegacyGetChar, 0);
        u8::try_from(ret).ok()
    }

    /// Powers the system off. Only returns if the firmware does not support the call.
    pub fn shutdown() {
        legacy_ecall(Extension::LegacySystemShutdown, 0);
    }
}

/// Powers the system off, preferring the System Reset extension over the legacy call.
///
/// Only returns if the firmware refused both requests.
pub fn shutdown() {
    let _ = SystemReset::reset(ResetType::Shutdown, ResetReason::NoReason);
    legacy::shutdown();
}

/// Low-level syscall to invoke an operation over SBI.
#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
fn ecall(ext: Extension, fid: usize, a0: usize, a1: usize) -> Result<usize> {
    let (error, value): (isize, usize);

    // SAFETY: the firmware only clobbers a0 and a1 on return
    unsafe {
        core::arch::asm!("ecall",
                inlateout("a0") a0 => error,
                inlateout("a1") a1 => value,
                in("a6") fid,
                in("a7") ext as usize);
    }

    if error == 0 {
        Ok(value)
    } else {
        Err(SbiError::from(error))
    }
}

#[cfg(not(any(target_arch = "riscv32", target_arch = "riscv64")))]
fn ecall(_ext: Extension, _fid: usize, _a0: usize, _a1: usize) -> Result<usize> {
    Err(SbiError::NotSupported)
}

/// Low-level syscall for legacy extensions, which return a single value in `a0`.
#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
fn legacy_ecall(ext: Extension, a0: usize) -> isize {
    let ret: isize;

    // SAFETY: legacy calls only clobber a0
    unsafe {
        core::arch::asm!("ecall",
                inlateout("a0") a0 => ret,
                in("a7") ext as usize);
    }

    ret
}

#[cfg(not(any(target_arch = "riscv32", target_arch = "riscv64")))]
fn legacy_ecall(_ext: Extension, _a0: usize) -> isize {
    SbiError::NotSupported.code()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        for code in -6..=-1 {
            assert_eq!(SbiError::from(code).code(), code);
        }
        assert_eq!(SbiError::from(-42), SbiError::Unknown(-42));
        assert_eq!(SbiError::from(-2).to_string(), "operation not supported");
    }

    #[test]
    fn spec_version_decoding() {
        let v = SpecVersion::from_raw((2 << 24) | 1);

        assert_eq!(v, SpecVersion { major: 2, minor: 1 });
        assert_eq!(v.to_string(), "2.1");
    }

    #[test]
    fn host_calls_are_unsupported() {
        assert_eq!(Base::get_impl_id(), Err(SbiError::NotSupported));
        assert_eq!(legacy::console_getchar(), None);
    }
}
