//! Process management module.
//!
//! Processes live in a fixed table and are scheduled cooperatively in round-robin order. Each
//! one owns a private kernel stack and an Sv32 address space holding the kernel identity
//! mapping, the block device registers and its own user image.

use core::{fmt, mem::size_of, ptr};

use kmm::{
    allocator::{AllocatorError, FrameAllocator},
    LinearMap,
};
use riscv::{
    context::TaskContext,
    mmu::{EntryFlags, MapError, PageTableWalker, SATP_SV32},
    PhysAddr, VirtAddr, PAGE_SIZE,
};

use crate::{
    config::{KERNEL_STACK_SIZE, PROCS_MAX},
    mm::MemoryLayout,
};

/// Process identifier. The idle process is always 0.
pub type Pid = usize;

/// The global process table.
pub static SCHEDULER: spin::Mutex<Scheduler> = spin::Mutex::new(Scheduler::new());

/// Lifecycle of a process table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    /// The slot is free.
    Unused,
    /// The process can be scheduled.
    Runnable,
    /// The process has terminated. The slot is never reused.
    Exited,
}

/// Possible errors when creating a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcError {
    /// Every slot of the process table is taken.
    NoFreeSlot,
    /// The address space could not be built.
    Map(MapError),
}

impl fmt::Display for ProcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcError::NoFreeSlot => write!(f, "no free process slots"),
            ProcError::Map(e) => write!(f, "cannot build address space: {}", e),
        }
    }
}

impl From<MapError> for ProcError {
    fn from(e: MapError) -> Self {
        ProcError::Map(e)
    }
}

impl From<AllocatorError> for ProcError {
    fn from(e: AllocatorError) -> Self {
        ProcError::Map(e.into())
    }
}

/// A private kernel stack.
#[repr(C, align(16))]
struct KernelStack([u8; KERNEL_STACK_SIZE]);

/// Process control block.
pub struct Process {
    pid: Pid,
    state: ProcState,
    sp: usize,
    page_table: Option<PhysAddr>,
    stack: KernelStack,
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("state", &self.state)
            .field("sp", &format_args!("{:#x}", self.sp))
            .field("page_table", &self.page_table)
            .finish_non_exhaustive()
    }
}

impl Process {
    const EMPTY: Self = Self {
        pid: 0,
        state: ProcState::Unused,
        sp: 0,
        page_table: None,
        stack: KernelStack([0; KERNEL_STACK_SIZE]),
    };

    /// Returns the process identifier.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Returns the process state.
    pub fn state(&self) -> ProcState {
        self.state
    }

    /// Returns the saved kernel stack pointer.
    pub fn sp(&self) -> usize {
        self.sp
    }

    /// Returns the root page table of the process.
    pub fn page_table(&self) -> Option<PhysAddr> {
        self.page_table
    }

    /// Returns the address one past the end of the kernel stack.
    pub fn stack_top(&self) -> usize {
        self.stack.0.as_ptr_range().end as usize
    }

    fn satp(&self) -> usize {
        self.page_table.map_or(0, |pt| SATP_SV32 | pt.ppn() as usize)
    }
}

/// Everything needed to build a new address space.
#[derive(Debug)]
pub struct SpaceBuilder<'a, A> {
    /// Allocator for page tables and user pages.
    pub allocator: &'a mut A,
    /// Window through which new frames are reached.
    pub map: LinearMap,
    /// Regions mapped into every address space.
    pub layout: MemoryLayout,
}

/// A context switch decided by the scheduler, to be carried out on the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    /// Where the outgoing process's stack pointer is saved.
    pub prev_sp: *mut usize,
    /// Where the incoming process's stack pointer is loaded from.
    pub next_sp: *const usize,
    /// `satp` value activating the incoming address space.
    pub satp: usize,
    /// Top of the incoming kernel stack, used by the trap trampoline.
    pub stack_top: usize,
}

/// The CPU half of a context switch.
pub trait ContextSwitch {
    /// Installs a new address space, flushing stale translations.
    ///
    /// # Safety
    ///
    /// `satp` must describe a page table that maps the running kernel.
    unsafe fn activate_address_space(&self, satp: usize);

    /// Sets the stack used by the trap trampoline.
    ///
    /// # Safety
    ///
    /// `top` must be the top of a kernel stack reserved for the incoming process.
    unsafe fn set_trap_stack(&self, top: usize);

    /// Saves the callee-saved state on the current stack, stores the stack pointer to `prev_sp`
    /// and resumes the context whose stack pointer is stored at `next_sp`.
    ///
    /// # Safety
    ///
    /// `next_sp` must hold the stack pointer of a suspended or freshly created context.
    unsafe fn switch_context(&self, prev_sp: *mut usize, next_sp: *const usize);
}

impl Switch {
    /// Carries out the switch.
    ///
    /// # Safety
    ///
    /// The pointers must come from the process table and remain valid until the outgoing process
    /// is resumed.
    pub unsafe fn perform<H: ContextSwitch>(&self, hart: &H) {
        // SAFETY: the caller guarantees the switch was produced by the scheduler
        unsafe {
            hart.activate_address_space(self.satp);
            hart.set_trap_stack(self.stack_top);
            hart.switch_context(self.prev_sp, self.next_sp);
        }
    }
}

/// The process table and the currently running process.
#[derive(Debug)]
pub struct Scheduler {
    procs: [Process; PROCS_MAX],
    current: usize,
    idle: usize,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Creates an empty process table.
    pub const fn new() -> Self {
        Self {
            procs: [Process::EMPTY; PROCS_MAX],
            current: 0,
            idle: 0,
        }
    }

    /// Creates a process running `entry` in a new address space, with `image` loaded at
    /// `load_addr` with user permissions.
    ///
    /// The process is assigned pid `slot + 1`.
    pub fn create<A>(
        &mut self,
        image: &[u8],
        load_addr: VirtAddr,
        entry: usize,
        space: &mut SpaceBuilder<'_, A>,
    ) -> Result<Pid, ProcError>
    where
        A: FrameAllocator<PhysAddr, PAGE_SIZE>,
    {
        let slot = self
            .procs
            .iter()
            .position(|p| p.state == ProcState::Unused)
            .ok_or(ProcError::NoFreeSlot)?;

        let page_table = build_address_space(image, load_addr, space)?;

        let proc = &mut self.procs[slot];

        // Resuming the process for the first time "returns" into `entry`
        let top = proc.stack.0.as_mut_ptr_range().end as *mut TaskContext;
        // SAFETY: the context fits at the top of the process's own stack, which is suitably
        // aligned
        let sp = unsafe {
            let ctx = top.sub(1);
            ptr::write(ctx, TaskContext::new(entry));
            ctx as usize
        };

        proc.pid = slot + 1;
        proc.state = ProcState::Runnable;
        proc.sp = sp;
        proc.page_table = Some(page_table);

        Ok(proc.pid)
    }

    /// Creates the idle process and makes it current.
    ///
    /// The idle process owns an address space with the kernel mappings only, and is resumed
    /// whenever nothing else is runnable.
    pub fn init_idle<A>(&mut self, space: &mut SpaceBuilder<'_, A>) -> Result<(), ProcError>
    where
        A: FrameAllocator<PhysAddr, PAGE_SIZE>,
    {
        let pid = self.create(&[], VirtAddr::new(0), 0, space)?;
        let slot = pid - 1;

        self.procs[slot].pid = 0;
        self.idle = slot;
        self.current = slot;

        Ok(())
    }

    /// Returns the running process.
    pub fn current(&self) -> &Process {
        &self.procs[self.current]
    }

    /// Returns the process with the given pid, if any.
    pub fn get(&self, pid: Pid) -> Option<&Process> {
        self.procs
            .iter()
            .find(|p| p.state != ProcState::Unused && p.pid == pid)
    }

    /// Marks the running process as exited and returns its pid.
    pub fn exit_current(&mut self) -> Pid {
        let proc = &mut self.procs[self.current];
        proc.state = ProcState::Exited;
        proc.pid
    }

    /// Picks the next process to run and makes it current.
    ///
    /// Slots are scanned starting right after the current process, which comes last; the idle
    /// process is chosen when no other process is runnable. Returns `None` when the choice is
    /// the running process itself.
    pub fn schedule(&mut self) -> Option<Switch> {
        let start = self.procs[self.current].pid;

        let next = (0..PROCS_MAX)
            .map(|i| (start + i) % PROCS_MAX)
            .find(|&s| self.procs[s].state == ProcState::Runnable && self.procs[s].pid > 0)
            .unwrap_or(self.idle);

        if next == self.current {
            return None;
        }

        let prev = self.current;
        self.current = next;

        let satp = self.procs[next].satp();
        let stack_top = self.procs[next].stack_top();

        Some(Switch {
            prev_sp: &mut self.procs[prev].sp,
            next_sp: &self.procs[next].sp,
            satp,
            stack_top,
        })
    }
}

/// Builds the page table of a new process and returns its root.
fn build_address_space<A>(
    image: &[u8],
    load_addr: VirtAddr,
    space: &mut SpaceBuilder<'_, A>,
) -> Result<PhysAddr, ProcError>
where
    A: FrameAllocator<PhysAddr, PAGE_SIZE>,
{
    let allocator = &mut *space.allocator;
    let map = space.map;
    let mut pt = PageTableWalker::create(allocator, map)?;

    // Kernel mappings
    let (kernel_start, kernel_end) = space.layout.kernel_range();
    pt.identity_map_range(kernel_start, kernel_end, EntryFlags::RWX, allocator)?;
    pt.map(
        VirtAddr::new(space.layout.mmio.data()),
        space.layout.mmio,
        EntryFlags::RW,
        allocator,
    )?;

    // User pages, the last one possibly partial
    for (i, chunk) in image.chunks(PAGE_SIZE as usize).enumerate() {
        let page = allocator.alloc(1)?;

        // SAFETY: the page was just allocated and is reachable through `map`
        unsafe {
            ptr::copy_nonoverlapping(chunk.as_ptr(), map.ptr::<u8, _>(page), chunk.len());
        }

        let va = load_addr + (i * PAGE_SIZE as usize) as u32;
        pt.map(va, page, EntryFlags::URWX, allocator)?;
    }

    Ok(pt.root())
}

const _: () = assert!(KERNEL_STACK_SIZE % 16 == 0 && KERNEL_STACK_SIZE > size_of::<TaskContext>());

/// Gives up the CPU to the next runnable process, returning when the caller is scheduled again.
#[cfg(target_arch = "riscv32")]
pub fn yield_now() {
    // The lock must be released before switching away
    let switch = SCHEDULER.lock().schedule();

    if let Some(switch) = switch {
        // SAFETY: the switch points into the global process table, whose slots never move
        unsafe { switch.perform(&crate::arch::Hart) };
    }
}
