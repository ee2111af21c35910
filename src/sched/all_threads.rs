//! The All-Threads list: every live thread, runnable or blocked.

use super::State;
use crate::thread::{ThreadId, ThreadRecord};

impl<const N: usize> State<N> {
    pub(crate) fn all_push(&mut self, id: ThreadId) {
        let head = self.all_head;
        self.record_mut(id).all_next = head;
        self.all_head = Some(id);
    }

    /// Linear scan-and-unlink. Returns `false` if `id` was not listed.
    pub(crate) fn all_unlink(&mut self, id: ThreadId) -> bool {
        let unlinked = self.record(id).all_next;
        if self.all_head == Some(id) {
            self.all_head = unlinked;
            return true;
        }
        let mut cursor = self.all_head;
        while let Some(at) = cursor {
            let next = self.record(at).all_next;
            if next == Some(id) {
                self.record_mut(at).all_next = unlinked;
                return true;
            }
            cursor = next;
        }
        false
    }

    /// Whether at most one thread is left.
    pub(crate) fn all_is_singleton(&self) -> bool {
        match self.all_head {
            Some(head) => self.record(head).all_next.is_none(),
            None => true,
        }
    }

    pub(crate) fn all_threads(&self) -> AllThreads<'_, N> {
        AllThreads {
            state: self,
            next: self.all_head,
        }
    }
}

/// Iterator over the All-Threads list, most recently created first.
pub(crate) struct AllThreads<'a, const N: usize> {
    state: &'a State<N>,
    next: Option<ThreadId>,
}

impl<'a, const N: usize> Iterator for AllThreads<'a, N> {
    type Item = (ThreadId, &'a ThreadRecord);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let record = self.state.record(id);
        self.next = record.all_next;
        Some((id, record))
    }
}
