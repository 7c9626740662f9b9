//! Collection of memory allocators.

use core::fmt;

use crate::PhysicalAddress;

pub mod bump;

pub use bump::BumpFrameAllocator;

/// The error type returned by fallible allocator operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AllocatorError {
    /// The provided address is not properly aligned.
    UnalignedAddress,
    /// The provided page size is not valid.
    InvalidPageSize,
    /// The managed region cannot satisfy the request.
    OutOfMemory,
}

impl fmt::Display for AllocatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AllocatorError::UnalignedAddress => "unaligned address",
            AllocatorError::InvalidPageSize => "invalid page size",
            AllocatorError::OutOfMemory => "out of memory",
        })
    }
}

/// A trait for page-grained memory allocators.
pub trait FrameAllocator<A, const N: u32>
where
    A: PhysicalAddress<u32>,
{
    /// Allocates a zero-filled memory section of `count` contiguous pages.
    ///
    /// Returns [`AllocatorError::OutOfMemory`] if the section does not fit in the remaining
    /// memory; the allocator state is left untouched in that case.
    fn alloc(&mut self, count: usize) -> Result<A, AllocatorError>;
}

impl<A, T, const N: u32> FrameAllocator<A, N> for &mut T
where
    A: PhysicalAddress<u32>,
    T: FrameAllocator<A, N> + ?Sized,
{
    fn alloc(&mut self, count: usize) -> Result<A, AllocatorError> {
        (**self).alloc(count)
    }
}
