//! Whole-file access to the kernel file table.

use core::ffi::CStr;

use crate::{
    io::{Error, Result},
    syscall::{sys_readfile, sys_writefile},
};

/// Reads the beginning of the file `name` into `buf`, returning the number of bytes read.
pub fn read(name: &CStr, buf: &mut [u8]) -> Result<usize> {
    Error::from_ret(sys_readfile(name, buf.as_mut_ptr(), buf.len()))
}

/// Replaces the contents of the file `name` with `data`, returning the number of bytes kept.
pub fn write(name: &CStr, data: &[u8]) -> Result<usize> {
    Error::from_ret(sys_writefile(name, data.as_ptr(), data.len()))
}
