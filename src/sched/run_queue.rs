//! The Run Queue: a circular doubly-linked list of runnable threads.
//!
//! The running thread is always a member, so the queue is never empty while
//! the scheduler is initialized. A thread alone in the queue links to itself.

use super::State;
use crate::errors::fatal;
use crate::thread::ThreadId;

impl<const N: usize> State<N> {
    /// Link `id` in immediately behind the current thread, i.e. it runs
    /// after every other runnable thread and just before `current` comes
    /// round again.
    pub(crate) fn run_insert_behind_current(&mut self, id: ThreadId) {
        let current = self.current;
        let prev = self.record(current).run_prev;

        let record = self.record_mut(id);
        record.run_prev = prev;
        record.run_next = current;

        self.record_mut(prev).run_next = id;
        self.record_mut(current).run_prev = id;
    }

    /// Unlink `id` from the Run Queue. Its own links are left as they were so
    /// a pending switch can still step off it.
    ///
    /// Removing the last runnable thread is fatal.
    pub(crate) fn run_remove(&mut self, id: ThreadId) {
        if self.is_sole_runnable(id) {
            fatal("deadlock");
        }
        let (prev, next) = {
            let record = self.record(id);
            (record.run_prev, record.run_next)
        };
        self.record_mut(prev).run_next = next;
        self.record_mut(next).run_prev = prev;
    }

    pub(crate) fn is_sole_runnable(&self, id: ThreadId) -> bool {
        self.record(id).run_next == id
    }

    /// Run Queue members in scheduling order, starting at the current thread.
    #[cfg(test)]
    pub(crate) fn run_order(&self) -> RunOrder<'_, N> {
        RunOrder {
            state: self,
            start: self.current,
            next: Some(self.current),
        }
    }
}

/// Iterator over the Run Queue, starting at the current thread.
#[cfg(test)]
pub(crate) struct RunOrder<'a, const N: usize> {
    state: &'a State<N>,
    start: ThreadId,
    next: Option<ThreadId>,
}

#[cfg(test)]
impl<'a, const N: usize> Iterator for RunOrder<'a, N> {
    type Item = ThreadId;

    fn next(&mut self) -> Option<ThreadId> {
        let id = self.next?;
        let following = self.state.record(id).run_next;
        self.next = (following != self.start).then_some(following);
        Some(id)
    }
}
