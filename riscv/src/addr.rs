//! Physical and virtual addresses manipulation.

use core::{
    fmt,
    ops::{Add, Sub},
};

use kmm::{AddressOps, Align, PhysicalAddress};

/// Number of bits of the page offset.
pub const PAGE_SHIFT: u32 = 12;

/// Size of a base page, in bytes.
pub const PAGE_SIZE: u32 = 1 << PAGE_SHIFT;

/// A 32-bit physical memory address.
///
/// Sv32 can address 34 bits of physical memory, but everything this kernel touches lives below
/// 4 GiB, so the address is kept in a plain `u32`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(u32);

impl PhysAddr {
    /// Creates a new physical address.
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Creates the physical address of the first byte of the page with number `ppn`.
    pub const fn from_ppn(ppn: u32) -> Self {
        Self(ppn << PAGE_SHIFT)
    }

    /// Returns the integer representation of this address.
    pub const fn data(self) -> u32 {
        self.0
    }

    /// Returns the physical page number of this address.
    pub const fn ppn(self) -> u32 {
        self.0 >> PAGE_SHIFT
    }

    /// Returns the lowest 12 bits of this address.
    pub const fn page_offset(self) -> u32 {
        self.0 & (PAGE_SIZE - 1)
    }
}

impl PhysicalAddress<u32> for PhysAddr {}

impl AddressOps<u32> for PhysAddr {}

impl Align<u32> for PhysAddr {
    fn align_up(&self, align: u32) -> Self {
        assert!(align.is_power_of_two(), "Alignment must be a power of two");
        Self::new((self.data() + align - 1) & !(align - 1))
    }

    fn align_down(&self, align: u32) -> Self {
        assert!(align.is_power_of_two(), "Alignment must be a power of two");
        Self::new(self.data() & !(align - 1))
    }

    fn is_aligned(&self, align: u32) -> bool {
        assert!(align.is_power_of_two(), "Alignment must be a power of two");
        (self.data() & (align - 1)) == 0
    }
}

impl From<PhysAddr> for u32 {
    fn from(pa: PhysAddr) -> Self {
        pa.0
    }
}

impl From<u32> for PhysAddr {
    fn from(addr: u32) -> Self {
        Self::new(addr)
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::LowerHex for PhysAddr {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Add for PhysAddr {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.0 + rhs.0)
    }
}

impl Add<u32> for PhysAddr {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        Self::new(self.0 + rhs)
    }
}

impl Sub for PhysAddr {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.0 - rhs.0)
    }
}

impl Sub<u32> for PhysAddr {
    type Output = Self;

    fn sub(self, rhs: u32) -> Self::Output {
        Self::new(self.0 - rhs)
    }
}

/// A 32-bit virtual memory address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(u32);

impl VirtAddr {
    /// Creates a new virtual address.
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Returns the integer representation of this address.
    pub const fn data(self) -> u32 {
        self.0
    }

    /// Returns the index into the root page table (bits 31..22).
    pub const fn vpn1(self) -> usize {
        ((self.0 >> 22) & 0x3ff) as usize
    }

    /// Returns the index into the leaf page table (bits 21..12).
    pub const fn vpn0(self) -> usize {
        ((self.0 >> 12) & 0x3ff) as usize
    }

    /// Returns the lowest 12 bits of this address.
    pub const fn page_offset(self) -> u32 {
        self.0 & (PAGE_SIZE - 1)
    }
}

impl Align<u32> for VirtAddr {
    fn align_up(&self, align: u32) -> Self {
        assert!(align.is_power_of_two(), "Alignment must be a power of two");
        Self::new((self.data() + align - 1) & !(align - 1))
    }

    fn align_down(&self, align: u32) -> Self {
        assert!(align.is_power_of_two(), "Alignment must be a power of two");
        Self::new(self.data() & !(align - 1))
    }

    fn is_aligned(&self, align: u32) -> bool {
        assert!(align.is_power_of_two(), "Alignment must be a power of two");
        (self.data() & (align - 1)) == 0
    }
}

impl Add<u32> for VirtAddr {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        Self::new(self.0 + rhs)
    }
}

impl From<VirtAddr> for u32 {
    fn from(va: VirtAddr) -> Self {
        va.0
    }
}

impl From<u32> for VirtAddr {
    fn from(addr: u32) -> Self {
        Self::new(addr)
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::LowerHex for VirtAddr {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_indices() {
        let va = VirtAddr::new(0x0100_3abc);

        assert_eq!(va.vpn1(), 0x004);
        assert_eq!(va.vpn0(), 0x003);
        assert_eq!(va.page_offset(), 0xabc);

        let va = VirtAddr::new(0xffff_ffff);
        assert_eq!(va.vpn1(), 0x3ff);
        assert_eq!(va.vpn0(), 0x3ff);
    }

    #[test]
    fn page_numbers() {
        let pa = PhysAddr::new(0x8020_1234);

        assert_eq!(pa.ppn(), 0x80201);
        assert_eq!(pa.page_offset(), 0x234);
        assert_eq!(PhysAddr::from_ppn(pa.ppn()), pa.align_down(PAGE_SIZE));
    }

    #[test]
    fn alignment() {
        let pa = PhysAddr::new(0x8000_0001);

        assert!(!pa.is_aligned(PAGE_SIZE));
        assert_eq!(pa.align_up(PAGE_SIZE), PhysAddr::new(0x8000_1000));
        assert_eq!(pa.align_down(PAGE_SIZE), PhysAddr::new(0x8000_0000));
    }
}
