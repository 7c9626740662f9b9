//! Abstractions for Sv32 page tables and other paging related structures.
//!
//! Page tables live in physical frames handed out by a [`FrameAllocator`]. They are never
//! referenced directly: a [`PageTableWalker`] owns the physical address of a root table and
//! reaches the frames through a [`LinearMap`], enforcing the two-level index decomposition and
//! the alignment preconditions at its API boundary.

use core::fmt;

use bitflags::bitflags;
use kmm::{
    allocator::{AllocatorError, FrameAllocator},
    Align, LinearMap,
};
use static_assertions::const_assert_eq;

use crate::{PhysAddr, VirtAddr, PAGE_SIZE};

/// Number of entries in every page table.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// `satp.MODE` value enabling Sv32 translation.
pub const SATP_SV32: usize = 1 << 31;

const PTE_PPN_MASK: u32 = 0x3f_ffff;
const PTE_PPN_OFFSET: u32 = 10;

bitflags! {
    /// Bitfields of a page table entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EntryFlags: u32 {
        /// If set, this entry represents a valid mapping.
        const VALID = 1 << 0;
        /// If set, this page contains readable memory.
        const READ = 1 << 1;
        /// If set, this page contains writable memory.
        const WRITE = 1 << 2;
        /// If set, this page contains executable memory.
        const EXEC = 1 << 3;
        /// If set, this page can be accessed in U-mode.
        const USER = 1 << 4;
        /// If set, this mapping is global.
        const GLOBAL = 1 << 5;
        /// If set, this page has been accessed by the CPU.
        const ACCESS = 1 << 6;
        /// If set, this page has been written by the CPU.
        const DIRTY = 1 << 7;

        /// If set, this page contains read-write memory.
        const RW = Self::READ.bits() | Self::WRITE.bits();
        /// If set, this page contains read-write-exec memory.
        const RWX = Self::READ.bits() | Self::WRITE.bits() | Self::EXEC.bits();
        /// Read-write-exec memory accessible from U-mode.
        const URWX = Self::RWX.bits() | Self::USER.bits();
    }
}

/// An entry in a [`PageTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Entry(u32);

impl Entry {
    /// Returns whether the mapping contained in this entry is valid for use in translation.
    pub fn is_valid(&self) -> bool {
        self.flags().contains(EntryFlags::VALID)
    }

    /// Returns whether this entry is a leaf or a pointer to another page table.
    pub fn is_leaf(&self) -> bool {
        self.flags().intersects(EntryFlags::RWX)
    }

    /// Returns the flags currently set on this entry.
    pub fn flags(&self) -> EntryFlags {
        EntryFlags::from_bits_truncate(self.0)
    }

    /// Returns the PPN portion of this entry.
    pub fn ppn(&self) -> u32 {
        (self.0 >> PTE_PPN_OFFSET) & PTE_PPN_MASK
    }

    /// Returns the physical address this entry points to.
    pub fn addr(&self) -> PhysAddr {
        PhysAddr::from_ppn(self.ppn())
    }

    /// Points this entry to `pa` with the given flags, replacing whatever was there.
    pub fn set(&mut self, pa: PhysAddr, flags: EntryFlags) {
        self.0 = ((pa.ppn() & PTE_PPN_MASK) << PTE_PPN_OFFSET) | flags.bits();
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = self.flags();
        let flag = |bit, c| if flags.contains(bit) { c } else { ' ' };

        write!(
            f,
            "phy: 0x{:08x} {}{}{}{}{}{}{}",
            self.addr().data(),
            flag(EntryFlags::READ, 'R'),
            flag(EntryFlags::WRITE, 'W'),
            flag(EntryFlags::EXEC, 'X'),
            flag(EntryFlags::USER, 'U'),
            flag(EntryFlags::GLOBAL, 'G'),
            flag(EntryFlags::ACCESS, 'A'),
            flag(EntryFlags::DIRTY, 'D'),
        )
    }
}

/// A page table for virtual address translation, occupying exactly one frame.
#[derive(Debug)]
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [Entry; ENTRIES_PER_TABLE],
}

const_assert_eq!(core::mem::size_of::<PageTable>(), PAGE_SIZE as usize);

impl PageTable {
    /// Returns a reference to an entry in this page table.
    pub fn get_entry(&self, i: usize) -> Option<&Entry> {
        self.entries.get(i)
    }

    /// Returns a mutable reference to an entry in this page table.
    pub fn get_entry_mut(&mut self, i: usize) -> Option<&mut Entry> {
        self.entries.get_mut(i)
    }
}

impl fmt::Display for PageTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.entries.iter().enumerate() {
            if e.is_valid() {
                writeln!(f, "{:>4}: {}", i, e)?;
            }
        }
        Ok(())
    }
}

/// An error condition returned by memory mapping functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapError {
    /// The virtual address is not page-aligned.
    UnalignedVirt(VirtAddr),
    /// The physical address is not page-aligned.
    UnalignedPhys(PhysAddr),
    /// Frame allocation for a leaf table failed.
    AllocationFailed(AllocatorError),
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::UnalignedVirt(va) => write!(f, "unaligned virtual address {:#x}", va),
            MapError::UnalignedPhys(pa) => write!(f, "unaligned physical address {:#x}", pa),
            MapError::AllocationFailed(e) => write!(f, "page table allocation failed: {}", e),
        }
    }
}

impl From<AllocatorError> for MapError {
    fn from(e: AllocatorError) -> Self {
        MapError::AllocationFailed(e)
    }
}

/// Typed accessor for a two-level Sv32 page table hierarchy.
#[derive(Debug)]
pub struct PageTableWalker {
    root: PhysAddr,
    map: LinearMap,
}

impl PageTableWalker {
    /// Allocates an empty root table and returns a walker for it.
    pub fn create<A>(frame_allocator: &mut A, map: LinearMap) -> Result<Self, MapError>
    where
        A: FrameAllocator<PhysAddr, PAGE_SIZE>,
    {
        let root = frame_allocator.alloc(1)?;

        // SAFETY: the frame was just allocated and zeroed, so it is an empty page table
        Ok(unsafe { Self::new(root, map) })
    }

    /// Creates a walker over the hierarchy rooted at `root`.
    ///
    /// # Safety
    ///
    /// `root` and every table it references must be page tables reachable through `map`, and
    /// no other code may access them while the walker is alive.
    pub unsafe fn new(root: PhysAddr, map: LinearMap) -> Self {
        Self { root, map }
    }

    /// Returns the physical address of the root table.
    pub fn root(&self) -> PhysAddr {
        self.root
    }

    /// Returns the value to be written to `satp` to activate this address space.
    pub fn satp(&self) -> usize {
        SATP_SV32 | self.root.ppn() as usize
    }

    /// Maps the page at `vaddr` to the frame at `paddr` with the given flags.
    ///
    /// A leaf table is allocated with `frame_allocator` when the root slot is empty. An existing
    /// mapping for the same page is overwritten.
    pub fn map<A>(
        &mut self,
        vaddr: VirtAddr,
        paddr: PhysAddr,
        flags: EntryFlags,
        frame_allocator: &mut A,
    ) -> Result<(), MapError>
    where
        A: FrameAllocator<PhysAddr, PAGE_SIZE>,
    {
        if !vaddr.is_aligned(PAGE_SIZE) {
            return Err(MapError::UnalignedVirt(vaddr));
        }
        if !paddr.is_aligned(PAGE_SIZE) {
            return Err(MapError::UnalignedPhys(paddr));
        }

        let root_pa = self.root;
        let root = self.table_mut(root_pa);
        let slot = &mut root.entries[vaddr.vpn1()];

        let leaf_pa = if slot.is_valid() {
            slot.addr()
        } else {
            let pa = frame_allocator.alloc(1)?;
            slot.set(pa, EntryFlags::VALID);
            pa
        };

        let leaf = self.table_mut(leaf_pa);
        leaf.entries[vaddr.vpn0()].set(paddr, flags | EntryFlags::VALID);

        Ok(())
    }

    /// Maps `size` bytes starting at `vaddr` to consecutive frames starting at `paddr`.
    pub fn map_range<A>(
        &mut self,
        vaddr: VirtAddr,
        paddr: PhysAddr,
        size: u32,
        flags: EntryFlags,
        frame_allocator: &mut A,
    ) -> Result<(), MapError>
    where
        A: FrameAllocator<PhysAddr, PAGE_SIZE>,
    {
        let size = size.align_up(PAGE_SIZE);

        for off in (0..size).step_by(PAGE_SIZE as usize) {
            self.map(vaddr + off, paddr + off, flags, frame_allocator)?;
        }

        Ok(())
    }

    /// Sets up identity mapping for a range of addresses, meaning that `vaddr == paddr` for all
    /// addresses in the specified range.
    pub fn identity_map_range<A>(
        &mut self,
        start: PhysAddr,
        end: PhysAddr,
        flags: EntryFlags,
        frame_allocator: &mut A,
    ) -> Result<(), MapError>
    where
        A: FrameAllocator<PhysAddr, PAGE_SIZE>,
    {
        let start = start.align_down(PAGE_SIZE);
        let end = end.align_up(PAGE_SIZE);

        self.map_range(
            VirtAddr::new(start.data()),
            start,
            (end - start).data(),
            flags,
            frame_allocator,
        )
    }

    /// Returns the physical address and flags mapped at the specified virtual address, or `None`
    /// if the address is not mapped.
    pub fn translate(&self, vaddr: VirtAddr) -> Option<(PhysAddr, EntryFlags)> {
        let root = self.table(self.root);
        let slot = root.get_entry(vaddr.vpn1())?;
        if !slot.is_valid() {
            return None;
        }

        let leaf = self.table(slot.addr());
        let pte = leaf.get_entry(vaddr.vpn0())?;
        if !pte.is_valid() {
            return None;
        }

        Some((pte.addr() + vaddr.page_offset(), pte.flags()))
    }

    fn table(&self, pa: PhysAddr) -> &PageTable {
        // SAFETY: the constructor guarantees every table of this hierarchy is reachable through
        // `self.map` and exclusively owned by this walker.
        unsafe { &*self.map.ptr::<PageTable, _>(pa) }
    }

    fn table_mut(&mut self, pa: PhysAddr) -> &mut PageTable {
        // SAFETY: see `table`; `&mut self` rules out aliasing through this walker.
        unsafe { &mut *self.map.ptr::<PageTable, _>(pa) }
    }
}

#[cfg(test)]
mod tests {
    use std::alloc::Layout;

    use kmm::allocator::BumpFrameAllocator;
    use proptest::prelude::*;

    use super::*;

    const NUM_PAGES: u32 = 8;
    const PHYS_BASE: u32 = 0x8040_0000;

    fn frames(num_pages: u32) -> BumpFrameAllocator<PhysAddr, PAGE_SIZE> {
        let size = (num_pages * PAGE_SIZE) as usize;
        let chunk =
            unsafe { std::alloc::alloc(Layout::from_size_align(size, PAGE_SIZE as usize).unwrap()) };

        unsafe {
            let map = LinearMap::new((chunk as usize).wrapping_sub(PHYS_BASE as usize));
            BumpFrameAllocator::init(
                PhysAddr::new(PHYS_BASE),
                PhysAddr::new(PHYS_BASE + num_pages * PAGE_SIZE),
                map,
            )
            .unwrap()
        }
    }

    fn walker(frames: &mut BumpFrameAllocator<PhysAddr, PAGE_SIZE>) -> PageTableWalker {
        let map = frames.linear_map();
        PageTableWalker::create(frames, map).unwrap()
    }

    #[test]
    fn entry_encoding() {
        let mut e = Entry::default();
        e.set(PhysAddr::new(0x8020_3000), EntryFlags::URWX | EntryFlags::VALID);

        assert_eq!(e.0, (0x80203 << 10) | 0x1f);
        assert_eq!(e.ppn(), 0x80203);
        assert!(e.is_valid());
        assert!(e.is_leaf());
        assert!(!Entry::default().is_valid());
    }

    #[test]
    fn unmapped_address() {
        let mut frames = frames(NUM_PAGES);
        let pt = walker(&mut frames);

        assert_eq!(pt.translate(VirtAddr::new(0x0100_0000)), None);
    }

    #[test]
    fn map_and_translate() {
        let mut frames = frames(NUM_PAGES);
        let mut pt = walker(&mut frames);

        pt.map(
            VirtAddr::new(0x0100_0000),
            PhysAddr::new(0x8020_0000),
            EntryFlags::URWX,
            &mut frames,
        )
        .unwrap();

        let (pa, flags) = pt.translate(VirtAddr::new(0x0100_0123)).unwrap();
        assert_eq!(pa, PhysAddr::new(0x8020_0123));
        assert_eq!(flags, EntryFlags::URWX | EntryFlags::VALID);

        // Neighbouring page in the same leaf table is still unmapped
        assert_eq!(pt.translate(VirtAddr::new(0x0100_1000)), None);
    }

    #[test]
    fn root_slot_points_to_leaf_table() {
        let mut frames = frames(NUM_PAGES);
        let mut pt = walker(&mut frames);
        let va = VirtAddr::new(0x0100_0000);

        pt.map(va, PhysAddr::new(0x8020_0000), EntryFlags::RW, &mut frames)
            .unwrap();

        let root = pt.table(pt.root());
        let slot = root.get_entry(va.vpn1()).unwrap();
        assert!(slot.is_valid());
        assert!(!slot.is_leaf());
        assert!(slot.addr().is_aligned(PAGE_SIZE));
    }

    #[test]
    fn remap_overwrites() {
        let mut frames = frames(NUM_PAGES);
        let mut pt = walker(&mut frames);
        let va = VirtAddr::new(0x0100_0000);

        pt.map(va, PhysAddr::new(0x8020_0000), EntryFlags::RWX, &mut frames)
            .unwrap();
        let used = frames.remaining();

        pt.map(va, PhysAddr::new(0x8030_0000), EntryFlags::RW, &mut frames)
            .unwrap();

        assert_eq!(
            pt.translate(va),
            Some((PhysAddr::new(0x8030_0000), EntryFlags::RW | EntryFlags::VALID))
        );
        // No new leaf table was needed
        assert_eq!(frames.remaining(), used);
    }

    #[test]
    fn leaf_tables_are_shared_within_4mib() {
        let mut frames = frames(NUM_PAGES);
        let mut pt = walker(&mut frames);
        let before = frames.remaining();

        pt.map_range(
            VirtAddr::new(0x0100_0000),
            PhysAddr::new(0x8020_0000),
            4 * PAGE_SIZE,
            EntryFlags::RW,
            &mut frames,
        )
        .unwrap();
        assert_eq!(frames.remaining(), before - 1);

        pt.map(
            VirtAddr::new(0x0140_0000),
            PhysAddr::new(0x8020_0000),
            EntryFlags::RW,
            &mut frames,
        )
        .unwrap();
        assert_eq!(frames.remaining(), before - 2);
    }

    #[test]
    fn identity_mapping() {
        let mut frames = frames(NUM_PAGES);
        let mut pt = walker(&mut frames);

        pt.identity_map_range(
            PhysAddr::new(0x8000_0000),
            PhysAddr::new(0x8000_2800),
            EntryFlags::RWX,
            &mut frames,
        )
        .unwrap();

        for addr in [0x8000_0000, 0x8000_1004, 0x8000_2fff] {
            let (pa, _) = pt.translate(VirtAddr::new(addr)).unwrap();
            assert_eq!(pa.data(), addr);
        }
        assert_eq!(pt.translate(VirtAddr::new(0x8000_3000)), None);
    }

    #[test]
    fn unaligned_addresses_are_rejected() {
        let mut frames = frames(NUM_PAGES);
        let mut pt = walker(&mut frames);

        assert_eq!(
            pt.map(
                VirtAddr::new(0x0100_0004),
                PhysAddr::new(0x8020_0000),
                EntryFlags::RW,
                &mut frames
            ),
            Err(MapError::UnalignedVirt(VirtAddr::new(0x0100_0004)))
        );
        assert_eq!(
            pt.map(
                VirtAddr::new(0x0100_0000),
                PhysAddr::new(0x8020_0010),
                EntryFlags::RW,
                &mut frames
            ),
            Err(MapError::UnalignedPhys(PhysAddr::new(0x8020_0010)))
        );
    }

    #[test]
    fn leaf_allocation_failure() {
        // Room for the root table only
        let mut frames = frames(1);
        let mut pt = walker(&mut frames);

        assert_eq!(
            pt.map(
                VirtAddr::new(0x0100_0000),
                PhysAddr::new(0x8020_0000),
                EntryFlags::RW,
                &mut frames
            ),
            Err(MapError::AllocationFailed(AllocatorError::OutOfMemory))
        );
    }

    #[test]
    fn satp_value() {
        let mut frames = frames(NUM_PAGES);
        let pt = walker(&mut frames);

        assert_eq!(pt.root(), PhysAddr::new(PHYS_BASE));
        assert_eq!(pt.satp(), (1 << 31) | (PHYS_BASE >> 12) as usize);
    }

    proptest! {
        #[test]
        fn translate_agrees_with_map(
            vpn in 0u32..(1 << 20),
            ppn in 0u32..(1 << 20),
            bits in 0u32..0x100,
            offset in 0u32..PAGE_SIZE,
        ) {
            let mut frames = frames(3);
            let mut pt = walker(&mut frames);
            let flags = EntryFlags::from_bits_truncate(bits);
            let va = VirtAddr::new(vpn << 12);

            pt.map(va, PhysAddr::from_ppn(ppn), flags, &mut frames).unwrap();

            prop_assert_eq!(
                pt.translate(va + offset),
                Some((PhysAddr::from_ppn(ppn) + offset, flags | EntryFlags::VALID))
            );
        }
    }
}
