//! Kernel console registry.
//!
//! The console is registered once during boot and then shared by the logging macros and the
//! character syscalls. Until a console is registered (and on the host) output is discarded and no
//! input is ever available.

use core::fmt;

/// The global console instance.
static CONSOLE: spin::Once<&'static dyn EarlyCon> = spin::Once::new();

/// A trait for byte-oriented console drivers.
pub trait EarlyCon: Send + Sync {
    /// Writes a single byte to the console.
    fn put(&self, byte: u8);

    /// Reads a single byte from the console, if one is pending.
    fn get(&self) -> Option<u8>;
}

/// A reference to the registered console that implements `fmt::Write`.
#[derive(Debug)]
pub struct EarlyConRef;

impl EarlyConRef {
    /// Reads a byte from the registered console, if any.
    pub fn getchar(&self) -> Option<u8> {
        CONSOLE.get().and_then(|con| con.get())
    }

    /// Writes a byte to the registered console, if any.
    pub fn putchar(&self, byte: u8) {
        if let Some(con) = CONSOLE.get() {
            con.put(byte);
        }
    }
}

impl fmt::Write for EarlyConRef {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if let Some(con) = CONSOLE.get() {
            for byte in s.bytes() {
                con.put(byte);
            }
        }
        Ok(())
    }
}

/// Installs the global console. Later registrations are ignored.
pub fn register(console: &'static dyn EarlyCon) {
    CONSOLE.call_once(|| console);
}

/// Returns a reference for the console.
///
/// Note that no guarantee is made that a console has been registered.
/// In such case, the returned reference will be a no-op implementation.
pub fn get() -> EarlyConRef {
    EarlyConRef
}
