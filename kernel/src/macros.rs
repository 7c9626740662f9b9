//! Kernel console printing and leveled logging macros.

/// Prints to the kernel console.
///
/// Equivalent to the [`kprintln!`] macro except that a newline is not printed
/// at the end of the message.
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {{
        use core::fmt::Write;

        write!($crate::drivers::earlycon::get(), $($arg)+).ok();
    }};
}

/// Prints to the kernel console with a newline (`\n`).
#[macro_export]
macro_rules! kprintln {
    () => {
        $crate::kprint!("\n")
    };
    ($fmt:expr) => {
        $crate::kprint!(concat!($fmt, "\n"))
    };
    ($fmt:expr, $($arg:tt)+) => {
        $crate::kprint!(concat!($fmt, "\n"), $($arg)+)
    };
}

/// Prints an informational message to the kernel console.
#[macro_export]
macro_rules! kinfo {
    ($fmt:expr) => {
        $crate::kprintln!(concat!("[INFO] ", $fmt))
    };
    ($fmt:expr, $($arg:tt)+) => {
        $crate::kprintln!(concat!("[INFO] ", $fmt), $($arg)+)
    };
}

/// Prints a warning to the kernel console.
#[macro_export]
macro_rules! kwarn {
    ($fmt:expr) => {
        $crate::kprintln!(concat!("[WARN] ", $fmt))
    };
    ($fmt:expr, $($arg:tt)+) => {
        $crate::kprintln!(concat!("[WARN] ", $fmt), $($arg)+)
    };
}

/// Prints an error to the kernel console.
#[macro_export]
macro_rules! kerr {
    ($fmt:expr) => {
        $crate::kprintln!(concat!("[FAIL] ", $fmt))
    };
    ($fmt:expr, $($arg:tt)+) => {
        $crate::kprintln!(concat!("[FAIL] ", $fmt), $($arg)+)
    };
}
