//! Split virtqueues in the legacy memory layout.

use core::{
    hint,
    mem::{offset_of, size_of},
    ptr::{addr_of, addr_of_mut, read_volatile, write_volatile},
    sync::atomic::{fence, Ordering},
};

use kmm::LinearMap;
use riscv::{PhysAddr, PAGE_SIZE};
use static_assertions::const_assert_eq;

use crate::config::VIRTQ_ENTRY_NUM;

use super::VirtioDev;

/// The buffer continues in the descriptor named by `next`.
pub const VIRTQ_DESC_F_NEXT: u16 = 1;
/// The buffer is written by the device.
pub const VIRTQ_DESC_F_WRITE: u16 = 2;

/// A buffer descriptor.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VirtqDesc {
    pub addr: u64,
    pub len: u32,
    pub flags: u16,
    pub next: u16,
}

/// The driver-owned ring of available descriptor chains.
#[repr(C)]
#[derive(Debug)]
pub struct VirtqAvail {
    pub flags: u16,
    pub idx: u16,
    pub ring: [u16; VIRTQ_ENTRY_NUM],
}

/// A descriptor chain returned by the device.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct VirtqUsedElem {
    pub id: u32,
    pub len: u32,
}

/// The device-owned ring of used descriptor chains. Starts on its own page.
#[repr(C, align(4096))]
#[derive(Debug)]
pub struct VirtqUsed {
    pub flags: u16,
    pub idx: u16,
    pub ring: [VirtqUsedElem; VIRTQ_ENTRY_NUM],
}

/// Memory shared with the device for one queue.
#[repr(C, align(4096))]
#[derive(Debug)]
pub struct VirtqLayout {
    pub desc: [VirtqDesc; VIRTQ_ENTRY_NUM],
    pub avail: VirtqAvail,
    pub used: VirtqUsed,
}

const_assert_eq!(size_of::<VirtqDesc>(), 16);
const_assert_eq!(offset_of!(VirtqLayout, avail), 16 * VIRTQ_ENTRY_NUM);
const_assert_eq!(offset_of!(VirtqLayout, used), PAGE_SIZE as usize);
const_assert_eq!(size_of::<VirtqLayout>(), 2 * PAGE_SIZE as usize);

/// One buffer of a descriptor chain.
#[derive(Debug, Clone, Copy)]
pub struct Buffer {
    pub addr: PhysAddr,
    pub len: u32,
    pub device_writable: bool,
}

/// A virtqueue used for synchronous requests.
#[derive(Debug)]
pub struct Virtq {
    index: u32,
    pa: PhysAddr,
    map: LinearMap,
    last_used: u16,
}

impl Virtq {
    /// Number of pages occupied by the queue.
    pub const PAGES: usize = size_of::<VirtqLayout>() / PAGE_SIZE as usize;

    /// Creates the queue at `index` over the zeroed memory at `pa`.
    ///
    /// # Safety
    ///
    /// `pa` must point to [`Virtq::PAGES`] zeroed pages reachable through `map` and reserved for
    /// this queue.
    pub unsafe fn new(index: u32, pa: PhysAddr, map: LinearMap) -> Self {
        Self {
            index,
            pa,
            map,
            last_used: 0,
        }
    }

    /// Returns the page frame number of the queue memory.
    pub fn pfn(&self) -> u32 {
        self.pa.ppn()
    }

    /// Places `chain` in the descriptor table, makes it available to `dev` and spins until the
    /// device has consumed it.
    pub fn submit_and_wait<D: VirtioDev>(&mut self, dev: &D, chain: &[Buffer]) {
        assert!(!chain.is_empty() && chain.len() <= VIRTQ_ENTRY_NUM);

        let vq = self.map.ptr::<VirtqLayout, _>(self.pa);

        // SAFETY: the queue memory is reserved for this queue (see `new`) and the device only
        // writes the used ring
        unsafe {
            for (i, buf) in chain.iter().enumerate() {
                let last = i + 1 == chain.len();

                let mut flags = 0;
                if !last {
                    flags |= VIRTQ_DESC_F_NEXT;
                }
                if buf.device_writable {
                    flags |= VIRTQ_DESC_F_WRITE;
                }

                let desc = VirtqDesc {
                    addr: buf.addr.data() as u64,
                    len: buf.len,
                    flags,
                    next: if last { 0 } else { i as u16 + 1 },
                };
                write_volatile(addr_of_mut!((*vq).desc[i]), desc);
            }

            let idx = read_volatile(addr_of!((*vq).avail.idx));
            write_volatile(
                addr_of_mut!((*vq).avail.ring[idx as usize % VIRTQ_ENTRY_NUM]),
                0,
            );
            fence(Ordering::SeqCst);

            write_volatile(addr_of_mut!((*vq).avail.idx), idx.wrapping_add(1));
            fence(Ordering::SeqCst);
        }

        dev.notify(self.index);
        self.last_used = self.last_used.wrapping_add(1);

        // SAFETY: see above
        while unsafe { read_volatile(addr_of!((*vq).used.idx)) } != self.last_used {
            hint::spin_loop();
        }
        fence(Ordering::SeqCst);
    }
}
