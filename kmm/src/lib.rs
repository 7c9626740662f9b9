//! Kernel memory management.
//!
//! Architecture-independent building blocks: address traits, the frame allocator interface and a
//! linear physical-to-kernel mapping used to touch freshly allocated frames.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![deny(missing_debug_implementations)]
#![deny(unsafe_op_in_unsafe_fn)]

use core::ops::{Add, Sub};

pub mod allocator;

/// A physical memory address representable as an integer of type `U`.
pub trait PhysicalAddress<U>: Copy + Clone + PartialOrd + Into<U> + AddressOps<U> {}

/// Operations common to physical address implementations.
pub trait AddressOps<U>:
    Align<U>
    + Add<Output = Self>
    + Sub<Output = Self>
    + Add<U, Output = Self>
    + Sub<U, Output = Self>
    + Sized
{
}

/// A trait for numeric types that can be aligned to a boundary.
pub trait Align<U> {
    /// Aligns address upwards to the specified bound.
    ///
    /// Returns the first address greater or equal than `addr` with alignment `align`.
    fn align_up(&self, align: U) -> Self;

    /// Aligns address downwards to the specified bound.
    ///
    /// Returns the first address lower or equal than `addr` with alignment `align`.
    fn align_down(&self, align: U) -> Self;

    /// Checks whether the address has the specified alignment.
    fn is_aligned(&self, align: U) -> bool;
}

impl Align<usize> for usize {
    fn align_up(&self, align: usize) -> Self {
        assert!(align.is_power_of_two(), "Alignment must be a power of two");
        (self + align - 1) & !(align - 1)
    }

    fn align_down(&self, align: usize) -> Self {
        assert!(align.is_power_of_two(), "Alignment must be a power of two");
        self & !(align - 1)
    }

    fn is_aligned(&self, align: usize) -> bool {
        assert!(align.is_power_of_two(), "Alignment must be a power of two");
        self & (align - 1) == 0
    }
}

impl Align<u32> for u32 {
    fn align_up(&self, align: u32) -> Self {
        assert!(align.is_power_of_two(), "Alignment must be a power of two");
        (self + align - 1) & !(align - 1)
    }

    fn align_down(&self, align: u32) -> Self {
        assert!(align.is_power_of_two(), "Alignment must be a power of two");
        self & !(align - 1)
    }

    fn is_aligned(&self, align: u32) -> bool {
        assert!(align.is_power_of_two(), "Alignment must be a power of two");
        self & (align - 1) == 0
    }
}

/// A fixed-offset window through which the kernel reaches physical memory.
///
/// The kernel runs with physical memory identity-mapped, so on the target the offset is zero.
/// Host-side tests back "physical" memory with an ordinary buffer and use the distance between
/// the buffer and the fake physical base as the offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearMap {
    offset: usize,
}

impl LinearMap {
    /// Physical memory is reachable at the same address.
    pub const IDENTITY: Self = Self { offset: 0 };

    /// Creates a linear map translating physical address `pa` to `pa + offset`.
    ///
    /// # Safety
    ///
    /// Every physical address handed to [`LinearMap::ptr`] must be backed by accessible memory
    /// at the translated address.
    pub const unsafe fn new(offset: usize) -> Self {
        Self { offset }
    }

    /// Returns the offset applied by this map.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Translates a physical address into a pointer usable by the kernel.
    pub fn ptr<T, A: Into<u32>>(&self, pa: A) -> *mut T {
        (pa.into() as usize).wrapping_add(self.offset) as *mut T
    }
}
