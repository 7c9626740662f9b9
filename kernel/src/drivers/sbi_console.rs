//! Console backed by the SBI debug console calls.

use crate::drivers::earlycon::{self, EarlyCon};

/// The firmware console.
#[derive(Debug)]
pub struct SbiConsole;

impl EarlyCon for SbiConsole {
    fn put(&self, byte: u8) {
        sbi::legacy::console_putchar(byte);
    }

    fn get(&self) -> Option<u8> {
        sbi::legacy::console_getchar()
    }
}

static SBI_CONSOLE: SbiConsole = SbiConsole;

/// Registers the SBI console as the kernel console.
pub fn init() {
    earlycon::register(&SBI_CONSOLE);
}
