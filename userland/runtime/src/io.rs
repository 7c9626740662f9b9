use core::fmt;

use crate::syscall::{sys_getchar, sys_putchar};

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    code: isize,
}

impl Error {
    /// Wraps a negative syscall return value.
    pub(crate) fn from_ret(ret: isize) -> Result<usize> {
        if ret < 0 {
            Err(Error { code: ret })
        } else {
            Ok(ret as usize)
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error code: {}", self.code)
    }
}

pub trait Write {
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    fn flush(&mut self) -> Result<()>;
}

/// The console.
pub struct Stdout;

impl Write for Stdout {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        for &b in buf {
            sys_putchar(b);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl fmt::Write for Stdout {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        Write::write(self, s.as_bytes()).map(|_| ()).map_err(|_| fmt::Error)
    }
}

pub fn stdout() -> Stdout {
    Stdout
}

/// Writes a character to the console.
pub fn putchar(ch: u8) {
    sys_putchar(ch);
}

/// Reads a character from the console, waiting for one if needed.
pub fn getchar() -> Result<u8> {
    Error::from_ret(sys_getchar()).map(|c| c as u8)
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments<'_>) {
    fmt::Write::write_fmt(&mut stdout(), args).ok();
}

/// Prints to the console.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::io::_print(format_args!($($arg)*))
    };
}

/// Prints to the console with a newline (`\n`).
#[macro_export]
macro_rules! println {
    () => {
        $crate::print!("\n")
    };
    ($($arg:tt)*) => {
        $crate::io::_print(format_args!("{}\n", format_args!($($arg)*)))
    };
}
