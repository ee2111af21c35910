//! Thread records and identifiers.
//!
//! Every thread lives in one slot of the scheduler's arena. Links between
//! records are slot indices ([`ThreadId`]) rather than addresses, so the
//! Run Queue, the All-Threads list and mutex wait chains are all plain
//! index chains threaded through the same [`ThreadRecord`]s.

use crate::mem::Stack;
use crate::time::TimeSlice;
use core::num::NonZeroU16;
use core::ops::Range;

/// Stable identifier of a thread: its arena slot.
///
/// Stored off by one so `Option<ThreadId>` stays two bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(NonZeroU16);

impl ThreadId {
    /// Identifier of arena slot `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` does not fit the identifier range.
    pub const fn from_index(index: usize) -> Self {
        assert!(index < u16::MAX as usize, "thread index out of range");
        match NonZeroU16::new(index as u16 + 1) {
            Some(raw) => Self(raw),
            None => panic!("thread index out of range"),
        }
    }

    /// Arena slot of this thread.
    pub const fn index(self) -> usize {
        self.0.get() as usize - 1
    }
}

impl core::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Lifecycle of an arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadStatus {
    /// Slot is free
    Vacant = 0,
    /// Member of the Run Queue
    Runnable = 1,
    /// Waiting on a mutex, off the Run Queue
    Blocked = 2,
    /// Terminated; reclaimed once the trap switches away from it
    Exited = 3,
}

/// Per-thread bookkeeping.
///
/// `run_prev`/`run_next` are only meaningful while the thread is
/// [`ThreadStatus::Runnable`]; a blocked or exited thread keeps its stale
/// links so the pending switch can still step off it.
#[derive(Debug)]
pub(crate) struct ThreadRecord {
    pub(crate) status: ThreadStatus,
    /// Valid only while the thread is not running
    pub(crate) saved_sp: usize,
    /// Opaque word owned by the embedding runtime
    pub(crate) local: usize,
    /// Entry argument, kept alive as a GC root
    pub(crate) arg_root: usize,
    pub(crate) stack: Option<Stack>,
    pub(crate) timeslice: TimeSlice,
    pub(crate) all_next: Option<ThreadId>,
    pub(crate) run_prev: ThreadId,
    pub(crate) run_next: ThreadId,
    /// Mutex wait chain
    pub(crate) queue_next: Option<ThreadId>,
}

impl ThreadRecord {
    pub(crate) const VACANT: ThreadRecord = ThreadRecord {
        status: ThreadStatus::Vacant,
        saved_sp: 0,
        local: 0,
        arg_root: 0,
        stack: None,
        timeslice: TimeSlice::new(),
        all_next: None,
        run_prev: ThreadId::from_index(0),
        run_next: ThreadId::from_index(0),
        queue_next: None,
    };

    /// Reset to a freshly created record alone in its own Run Queue.
    pub(crate) fn occupy(&mut self, id: ThreadId, stack: Stack, saved_sp: usize, arg: usize) {
        *self = ThreadRecord {
            status: ThreadStatus::Runnable,
            saved_sp,
            arg_root: arg,
            stack: Some(stack),
            run_prev: id,
            run_next: id,
            ..ThreadRecord::VACANT
        };
    }

    /// Drop everything the record owns; the stack handle goes back to its pool.
    pub(crate) fn vacate(&mut self) {
        *self = ThreadRecord::VACANT;
    }

    pub(crate) fn is_live(&self) -> bool {
        matches!(self.status, ThreadStatus::Runnable | ThreadStatus::Blocked)
    }
}

/// Snapshot of one thread, as produced by
/// [`Scheduler::threads`](crate::kernel::Scheduler::threads).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub stack_base: usize,
    /// Stack length in words
    pub stack_len: usize,
    pub runnable: bool,
}

/// Memory a conservative collector must treat as roots for one thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootRegion {
    pub thread: ThreadId,
    /// Live part of the stack (`saved_sp..top`). `None` for the running
    /// thread, whose stack the collector walks from its own registers.
    pub scan: Option<Range<usize>>,
    /// The entry argument word
    pub arg: usize,
}
