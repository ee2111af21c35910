//! Thread stack handles and the shared stack-space pool.
//!
//! A [`StackPool`] is one static block of memory split into equally sized
//! slots. Slot ownership is tracked in a single atomic bitmap, so handing a
//! stack back (which happens when the scheduler reclaims an exited thread,
//! inside the context-switch trap) never takes a lock.

use crate::errors::MemoryError;
use core::cell::UnsafeCell;
use core::mem::size_of;
use core::ptr::NonNull;
use portable_atomic::{AtomicU32, Ordering};

/// Maximum number of slots a single pool can track.
pub const MAX_POOL_SLOTS: usize = 32;

/// An exclusively owned thread stack region.
///
/// Stacks are full-descending: the thread starts at [`Stack::top`] and grows
/// towards [`Stack::base`].
pub struct Stack {
    /// Lowest address of the region
    base: NonNull<usize>,
    /// Length in machine words
    words: usize,
    /// Pool slot to release on drop, if the stack came from a pool
    home: Option<PoolSlot>,
}

struct PoolSlot {
    in_use: &'static AtomicU32,
    bit: u32,
}

impl Stack {
    /// Wrap a statically allocated region.
    pub fn from_static(region: &'static mut [usize]) -> Self {
        Self {
            base: NonNull::from(&mut region[..]).cast(),
            words: region.len(),
            home: None,
        }
    }

    /// Wrap a raw region.
    ///
    /// # Safety
    ///
    /// `base..base + words` must be valid, writable, word-aligned memory that
    /// nothing else uses for as long as the returned handle (or the thread it
    /// is given to) lives.
    pub unsafe fn from_raw_parts(base: NonNull<usize>, words: usize) -> Self {
        Self { base, words, home: None }
    }

    /// The region between the end of the heap and the top of RAM, which the
    /// boot thread already runs on.
    ///
    /// Requires the linker script to define `_heap_end` and `_estack`.
    #[cfg(target_os = "none")]
    pub fn main_from_linker() -> Self {
        extern "C" {
            static mut _heap_end: usize;
            static mut _estack: usize;
        }
        // Safety: both symbols are placed by the linker script; the region
        // between them is the boot stack and belongs to the main thread.
        unsafe {
            let start = core::ptr::addr_of_mut!(_heap_end);
            let end = core::ptr::addr_of_mut!(_estack) as usize;
            let words = (end - start as usize) / size_of::<usize>();
            Self::from_raw_parts(NonNull::new_unchecked(start), words)
        }
    }

    /// Lowest address of the region.
    pub fn base(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// One past the highest address of the region.
    pub fn top(&self) -> usize {
        self.base() + self.words * size_of::<usize>()
    }

    /// Length in machine words.
    pub fn words(&self) -> usize {
        self.words
    }

    /// Whether `addr` falls inside the region.
    pub fn contains(&self, addr: usize) -> bool {
        (self.base()..self.top()).contains(&addr)
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        if let Some(slot) = self.home.take() {
            slot.in_use.fetch_and(!(1 << slot.bit), Ordering::AcqRel);
        }
    }
}

impl core::fmt::Debug for Stack {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stack")
            .field("base", &format_args!("{:#x}", self.base()))
            .field("words", &self.words)
            .field("pooled", &self.home.is_some())
            .finish()
    }
}

unsafe impl Send for Stack {}
unsafe impl Sync for Stack {}

/// A static pool of `SLOTS` stacks of `WORDS` words each.
///
/// ```ignore
/// static STACKS: StackPool<4, 1024> = StackPool::new();
///
/// let stack = STACKS.allocate()?;
/// SCHED.create_thread(stack, worker, 0)?;
/// ```
pub struct StackPool<const SLOTS: usize, const WORDS: usize> {
    storage: UnsafeCell<[[usize; WORDS]; SLOTS]>,
    in_use: AtomicU32,
}

impl<const SLOTS: usize, const WORDS: usize> StackPool<SLOTS, WORDS> {
    pub const fn new() -> Self {
        assert!(SLOTS <= MAX_POOL_SLOTS, "stack pool holds at most 32 slots");
        Self {
            storage: UnsafeCell::new([[0; WORDS]; SLOTS]),
            in_use: AtomicU32::new(0),
        }
    }

    /// Take a free slot.
    pub fn allocate(&'static self) -> Result<Stack, MemoryError> {
        let mut current = self.in_use.load(Ordering::Acquire);
        loop {
            let bit = (!current).trailing_zeros();
            if bit as usize >= SLOTS {
                return Err(MemoryError::PoolExhausted);
            }
            match self.in_use.compare_exchange_weak(
                current,
                current | (1 << bit),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(self.slot(bit)),
                Err(observed) => current = observed,
            }
        }
    }

    fn slot(&'static self, bit: u32) -> Stack {
        // Safety: the bit we just set grants exclusive use of this row until
        // the returned handle drops.
        let row = unsafe { self.storage.get().cast::<[usize; WORDS]>().add(bit as usize) };
        Stack {
            // Safety: derived from the non-null storage cell.
            base: unsafe { NonNull::new_unchecked(row.cast::<usize>()) },
            words: WORDS,
            home: Some(PoolSlot { in_use: &self.in_use, bit }),
        }
    }

    /// Number of slots currently handed out.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire).count_ones() as usize
    }

    /// Total number of slots.
    pub const fn capacity(&self) -> usize {
        SLOTS
    }
}

impl<const SLOTS: usize, const WORDS: usize> Default for StackPool<SLOTS, WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl<const SLOTS: usize, const WORDS: usize> Sync for StackPool<SLOTS, WORDS> {}
