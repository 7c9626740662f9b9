//! A bump allocator for physical pages.
//!
//! The allocator hands out pages by advancing a cursor through the managed region. Memory is
//! never given back, which keeps allocation `O(1)` and the bookkeeping down to two addresses.

use core::ptr;

use crate::{LinearMap, PhysicalAddress};

use super::{AllocatorError, FrameAllocator};

/// A frame allocator that never frees.
#[derive(Debug)]
pub struct BumpFrameAllocator<A, const N: u32> {
    next: A,
    end: A,
    map: LinearMap,
}

impl<A, const N: u32> BumpFrameAllocator<A, N>
where
    A: PhysicalAddress<u32>,
{
    /// Creates a new bump allocator taking ownership of the memory delimited by addresses
    /// `start` and `end`, and allocating pages of size `N`.
    ///
    /// Returns an `AllocatorError` if any of the following conditions are not met:
    ///  - `N` is a non-zero power of two,
    ///  - `start` and `end` are page-aligned.
    ///
    /// # Safety
    ///
    /// The region must not be in use by anything else, and `map` must translate every address
    /// of the region to writable memory.
    pub unsafe fn init(start: A, end: A, map: LinearMap) -> Result<Self, AllocatorError> {
        if N == 0 || !N.is_power_of_two() {
            return Err(AllocatorError::InvalidPageSize);
        }
        if !start.is_aligned(N) || !end.is_aligned(N) || end < start {
            return Err(AllocatorError::UnalignedAddress);
        }

        Ok(Self {
            next: start,
            end,
            map,
        })
    }

    /// Returns the address that the next allocation will start at.
    pub fn cursor(&self) -> A {
        self.next
    }

    /// Returns the number of pages still available.
    pub fn remaining(&self) -> usize {
        let left: u32 = (self.end - self.next).into();
        (left / N) as usize
    }

    /// Returns the map used to reach the managed memory.
    pub fn linear_map(&self) -> LinearMap {
        self.map
    }
}

impl<A, const N: u32> FrameAllocator<A, N> for BumpFrameAllocator<A, N>
where
    A: PhysicalAddress<u32>,
{
    fn alloc(&mut self, count: usize) -> Result<A, AllocatorError> {
        if count > self.remaining() {
            return Err(AllocatorError::OutOfMemory);
        }

        let size = count as u32 * N;
        let base = self.next;
        self.next = base + size;

        // SAFETY: the range lies inside the region handed over in `init`, which the caller
        // guaranteed to be reachable through `map` and otherwise unused.
        unsafe { ptr::write_bytes(self.map.ptr::<u8, _>(base), 0, size as usize) };

        Ok(base)
    }
}

#[cfg(test)]
mod tests {
    use std::alloc::Layout;

    use proptest::prelude::*;

    use crate::{AddressOps, Align};

    use super::*;

    const PAGE_SIZE: u32 = 4096;
    const NUM_PAGES: u32 = 16;
    const MEM_SIZE: u32 = NUM_PAGES * PAGE_SIZE;
    const PHYS_BASE: u32 = 0x8020_0000;

    #[test]
    fn construction() {
        let allocator = create_allocator();

        assert_eq!(allocator.cursor(), PHYS_BASE);
        assert_eq!(allocator.remaining(), NUM_PAGES as usize);
    }

    #[test]
    fn invalid_addresses() {
        for t in &[
            (1, PAGE_SIZE),
            (PAGE_SIZE, 2 * PAGE_SIZE - 1),
            (2 * PAGE_SIZE, PAGE_SIZE),
        ] {
            unsafe {
                assert!(matches!(
                    BumpFrameAllocator::<_, PAGE_SIZE>::init(t.0, t.1, LinearMap::IDENTITY),
                    Err(AllocatorError::UnalignedAddress)
                ));
            }
        }
    }

    #[test]
    fn invalid_page_size() {
        assert!(matches!(
            unsafe { BumpFrameAllocator::<_, 0>::init(0, PAGE_SIZE, LinearMap::IDENTITY) },
            Err(AllocatorError::InvalidPageSize)
        ));

        assert!(matches!(
            unsafe { BumpFrameAllocator::<_, 24>::init(0, PAGE_SIZE, LinearMap::IDENTITY) },
            Err(AllocatorError::InvalidPageSize)
        ));
    }

    #[test]
    fn pages_are_zeroed() {
        let chunk = host_chunk();
        let mut allocator = allocator_over(chunk);
        let map = allocator.linear_map();

        let pa = allocator.alloc(2).expect("allocation failed");
        unsafe { core::ptr::write_bytes(map.ptr::<u8, _>(pa), 0xaa, 2 * PAGE_SIZE as usize) };

        // A fresh allocator over the same region must hand out clean memory again
        let mut allocator = allocator_over(chunk);
        let pa = allocator.alloc(2).expect("allocation failed");
        let bytes =
            unsafe { core::slice::from_raw_parts(map.ptr::<u8, _>(pa), 2 * PAGE_SIZE as usize) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn exhaustion_boundary() {
        let mut allocator = create_allocator();

        allocator.alloc(NUM_PAGES as usize - 1).expect("allocation failed");
        let last = allocator.alloc(1).expect("last page should fit");
        assert_eq!(last, PHYS_BASE + MEM_SIZE - PAGE_SIZE);

        assert_eq!(allocator.alloc(1), Err(AllocatorError::OutOfMemory));
        assert_eq!(allocator.cursor(), PHYS_BASE + MEM_SIZE);
    }

    #[test]
    fn failed_allocation_keeps_cursor() {
        let mut allocator = create_allocator();

        allocator.alloc(3).expect("allocation failed");
        assert_eq!(
            allocator.alloc(NUM_PAGES as usize),
            Err(AllocatorError::OutOfMemory)
        );
        assert_eq!(allocator.cursor(), PHYS_BASE + 3 * PAGE_SIZE);

        // The rest of the region is still usable
        allocator.alloc(NUM_PAGES as usize - 3).expect("allocation failed");
    }

    proptest! {
        #[test]
        fn allocations_never_overlap(sizes in prop::collection::vec(1usize..4, 1..12)) {
            let mut allocator = create_allocator();
            let mut chunks: Vec<(u32, u32)> = Vec::new();
            let mut used = 0;

            for count in sizes {
                match allocator.alloc(count) {
                    Ok(pa) => {
                        prop_assert!(pa.is_aligned(PAGE_SIZE));
                        let end = pa + count as u32 * PAGE_SIZE;
                        for &(s, e) in &chunks {
                            prop_assert!(end <= s || pa >= e);
                        }
                        chunks.push((pa, end));
                        used += count;
                    }
                    Err(err) => {
                        prop_assert_eq!(err, AllocatorError::OutOfMemory);
                        prop_assert!(used + count > NUM_PAGES as usize);
                    }
                }
            }
        }
    }

    // --- Test types and utilities ---

    impl PhysicalAddress<u32> for u32 {}

    impl AddressOps<u32> for u32 {}

    /// Returns a page-aligned chunk of host memory standing in for physical RAM.
    fn host_chunk() -> usize {
        let layout = Layout::from_size_align(MEM_SIZE as usize, PAGE_SIZE as usize).unwrap();
        let chunk = unsafe { std::alloc::alloc(layout) };
        assert!(!chunk.is_null());
        chunk as usize
    }

    fn allocator_over(chunk: usize) -> BumpFrameAllocator<u32, PAGE_SIZE> {
        unsafe {
            let map = LinearMap::new(chunk.wrapping_sub(PHYS_BASE as usize));
            BumpFrameAllocator::init(PHYS_BASE, PHYS_BASE + MEM_SIZE, map).unwrap()
        }
    }

    fn create_allocator() -> BumpFrameAllocator<u32, PAGE_SIZE> {
        allocator_over(host_chunk())
    }
}
