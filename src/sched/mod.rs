//! Scheduler state: the thread arena and the lists threaded through it.
//!
//! [`State`] is only ever touched inside a critical section (see
//! [`crate::sync::CriticalSection`]) or from the context-switch trap, so
//! none of the list operations here need to be atomic on their own. They
//! do have to leave every list consistent after each call, because the
//! trap may run between any two of them.

pub(crate) mod all_threads;
pub(crate) mod run_queue;

use crate::config::MAIN_THREAD_SLOT;
use crate::thread::{ThreadId, ThreadRecord, ThreadStatus};

pub(crate) struct State<const N: usize> {
    pub(crate) records: [ThreadRecord; N],
    /// Head of the All-Threads list
    pub(crate) all_head: Option<ThreadId>,
    pub(crate) current: ThreadId,
}

impl<const N: usize> State<N> {
    pub(crate) const fn new() -> Self {
        Self {
            records: [ThreadRecord::VACANT; N],
            all_head: None,
            current: ThreadId::from_index(MAIN_THREAD_SLOT),
        }
    }

    pub(crate) fn record(&self, id: ThreadId) -> &ThreadRecord {
        &self.records[id.index()]
    }

    pub(crate) fn record_mut(&mut self, id: ThreadId) -> &mut ThreadRecord {
        &mut self.records[id.index()]
    }

    pub(crate) fn current_record_mut(&mut self) -> &mut ThreadRecord {
        let current = self.current;
        self.record_mut(current)
    }

    /// First free arena slot.
    pub(crate) fn vacant_slot(&self) -> Option<ThreadId> {
        self.records
            .iter()
            .position(|record| record.status == ThreadStatus::Vacant)
            .map(ThreadId::from_index)
    }

    /// (total, runnable, blocked) over the All-Threads list.
    pub(crate) fn counts(&self) -> (usize, usize, usize) {
        self.all_threads()
            .fold((0, 0, 0), |(total, run, blocked), (_, record)| match record.status {
                ThreadStatus::Runnable => (total + 1, run + 1, blocked),
                ThreadStatus::Blocked => (total + 1, run, blocked + 1),
                _ => (total, run, blocked),
            })
    }
}
