//! Blocking mutex with a FIFO wait chain.
//!
//! Waiters are not stored in the mutex. The chain is threaded through the
//! waiting threads' own records (`queue_next`), so a mutex is a single state
//! word no matter how many threads queue on it. The word is only written
//! with the context-switch trap held off.
//!
//! Unlocking hands ownership straight to the oldest waiter: the mutex never
//! passes through `Unlocked` while anyone is queued, so a thread that shows
//! up later cannot overtake the chain.

use crate::arch::Arch;
use crate::errors::fatal;
use crate::kernel::Scheduler;
use crate::sched::State;
use crate::sync::Mask;
use crate::thread::{ThreadId, ThreadStatus};
use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};
use portable_atomic::{AtomicU32, Ordering};

/// State of a [`RawMutex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexState {
    Unlocked,
    LockedNoWaiters,
    /// Locked; the id is the oldest waiter, the rest follow via `queue_next`
    LockedWithWaiters(ThreadId),
}

const UNLOCKED: u32 = 0;
const LOCKED_NO_WAITERS: u32 = 1;
const FIRST_WAITER: u32 = 2;

impl MutexState {
    fn decode(word: u32) -> Self {
        match word {
            UNLOCKED => MutexState::Unlocked,
            LOCKED_NO_WAITERS => MutexState::LockedNoWaiters,
            head => {
                MutexState::LockedWithWaiters(ThreadId::from_index((head - FIRST_WAITER) as usize))
            }
        }
    }

    fn encode(self) -> u32 {
        match self {
            MutexState::Unlocked => UNLOCKED,
            MutexState::LockedNoWaiters => LOCKED_NO_WAITERS,
            MutexState::LockedWithWaiters(head) => head.index() as u32 + FIRST_WAITER,
        }
    }
}

/// Mutex state machine without attached data.
pub struct RawMutex {
    word: AtomicU32,
}

impl RawMutex {
    pub const fn new() -> Self {
        Self {
            word: AtomicU32::new(UNLOCKED),
        }
    }

    /// Reset to `Unlocked`. Only meaningful on a mutex nobody holds.
    pub fn init<A: Arch, const N: usize>(&self, scheduler: &Scheduler<A, N>) {
        let _sched = scheduler.lock_state(Mask::Switch);
        self.store(MutexState::Unlocked);
    }

    pub fn state<A: Arch, const N: usize>(&self, scheduler: &Scheduler<A, N>) -> MutexState {
        let _sched = scheduler.lock_state(Mask::Switch);
        self.load()
    }

    fn load(&self) -> MutexState {
        MutexState::decode(self.word.load(Ordering::Acquire))
    }

    fn store(&self, state: MutexState) {
        self.word.store(state.encode(), Ordering::Release);
    }

    /// Acquire the mutex.
    ///
    /// Returns `true` once the caller owns it. With `wait == false` a held
    /// mutex returns `false` immediately and the caller is left alone.
    /// With `wait == true` the caller joins the wait chain, leaves the Run
    /// Queue and pends a switch; the trap is taken as soon as the switch
    /// priority is restored, and the call returns after the unlocking thread
    /// handed ownership over.
    pub fn lock<A: Arch, const N: usize>(&self, scheduler: &Scheduler<A, N>, wait: bool) -> bool {
        let blocked = {
            let mut sched = scheduler.lock_state(Mask::Switch);
            let current = sched.current;
            match self.load() {
                MutexState::Unlocked => {
                    self.store(MutexState::LockedNoWaiters);
                    return true;
                }
                _ if !wait => return false,
                MutexState::LockedNoWaiters => self.store(MutexState::LockedWithWaiters(current)),
                MutexState::LockedWithWaiters(head) => sched.append_waiter(head, current),
            }
            sched.record_mut(current).queue_next = None;
            sched.run_remove(current);
            sched.record_mut(current).status = ThreadStatus::Blocked;
            scheduler.arch().pend_switch();
            current
        };
        log::trace!("thread {} waiting for mutex", blocked);
        true
    }

    /// Release the mutex, waking the oldest waiter if there is one.
    ///
    /// The woken thread owns the mutex from here on and is queued to run
    /// just before the caller comes round again.
    pub fn unlock<A: Arch, const N: usize>(&self, scheduler: &Scheduler<A, N>) {
        let mut sched = scheduler.lock_state(Mask::Switch);
        match self.load() {
            MutexState::Unlocked => fatal("unlock of unlocked mutex"),
            MutexState::LockedNoWaiters => self.store(MutexState::Unlocked),
            MutexState::LockedWithWaiters(head) => {
                let record = sched.record_mut(head);
                let next = record.queue_next.take();
                record.status = ThreadStatus::Runnable;
                self.store(match next {
                    Some(next) => MutexState::LockedWithWaiters(next),
                    None => MutexState::LockedNoWaiters,
                });
                sched.run_insert_behind_current(head);
            }
        }
    }
}

impl Default for RawMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RawMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // a single word load needs no masking
        f.debug_struct("RawMutex").field("state", &self.load()).finish()
    }
}

impl<const N: usize> State<N> {
    /// Link `id` in at the tail of the wait chain starting at `head`.
    pub(crate) fn append_waiter(&mut self, head: ThreadId, id: ThreadId) {
        let mut tail = head;
        while let Some(next) = self.record(tail).queue_next {
            tail = next;
        }
        self.record_mut(tail).queue_next = Some(id);
    }
}

/// A mutex protecting a value of type `T`.
///
/// ```ignore
/// static COUNTER: Mutex<u32> = Mutex::new(0);
///
/// *COUNTER.lock(&SCHED) += 1;
/// ```
pub struct Mutex<T> {
    raw: RawMutex,
    data: UnsafeCell<T>,
}

// Safety: access to `data` is serialized by `raw`.
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            raw: RawMutex::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Block until the mutex is ours.
    pub fn lock<'a, A: Arch, const N: usize>(
        &'a self,
        scheduler: &'a Scheduler<A, N>,
    ) -> MutexGuard<'a, T, A, N> {
        self.raw.lock(scheduler, true);
        MutexGuard { mutex: self, scheduler }
    }

    /// Take the mutex only if nobody holds it.
    pub fn try_lock<'a, A: Arch, const N: usize>(
        &'a self,
        scheduler: &'a Scheduler<A, N>,
    ) -> Option<MutexGuard<'a, T, A, N>> {
        self.raw
            .lock(scheduler, false)
            .then(|| MutexGuard { mutex: self, scheduler })
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    pub fn raw(&self) -> &RawMutex {
        &self.raw
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Access to a [`Mutex`]'s value. Unlocks on drop.
#[must_use = "the mutex is unlocked as soon as the guard is dropped"]
pub struct MutexGuard<'a, T, A: Arch, const N: usize> {
    mutex: &'a Mutex<T>,
    scheduler: &'a Scheduler<A, N>,
}

impl<T, A: Arch, const N: usize> Deref for MutexGuard<'_, T, A, N> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the guard proves ownership of the mutex.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T, A: Arch, const N: usize> DerefMut for MutexGuard<'_, T, A, N> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: the guard proves ownership of the mutex.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T, A: Arch, const N: usize> Drop for MutexGuard<'_, T, A, N> {
    fn drop(&mut self) {
        self.mutex.raw.unlock(self.scheduler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::{idle, leaked_stack, started};
    use std::vec::Vec;

    fn run_order<A: Arch, const N: usize>(sched: &Scheduler<A, N>) -> Vec<usize> {
        let state = sched.lock_state(Mask::Switch);
        state.run_order().map(ThreadId::index).collect()
    }

    #[test]
    fn uncontended_round_trip() {
        let sched = started::<4>();
        let mutex = RawMutex::new();
        mutex.init(sched);

        assert!(mutex.lock(sched, true));
        assert_eq!(mutex.state(sched), MutexState::LockedNoWaiters);
        mutex.unlock(sched);
        assert_eq!(mutex.state(sched), MutexState::Unlocked);
        assert_eq!(sched.arch().pend_count(), 0);
        assert!(!sched.arch().switch_blocked());
    }

    #[test]
    fn state_word_is_only_touched_with_the_switch_held_off() {
        let sched = started::<4>();
        let mutex = RawMutex::new();
        mutex.lock(sched, true);

        let raises = sched.arch().switch_raises();
        mutex.init(sched);
        assert_eq!(sched.arch().switch_raises(), raises + 1);
        assert_eq!(mutex.state(sched), MutexState::Unlocked);
        assert_eq!(sched.arch().switch_raises(), raises + 2);
        assert!(!sched.arch().switch_blocked());
    }

    #[test]
    fn state_word_round_trips_every_waiter_slot() {
        for index in [0, 1, 7, u16::MAX as usize - 1] {
            let head = ThreadId::from_index(index);
            let state = MutexState::LockedWithWaiters(head);
            assert_eq!(MutexState::decode(state.encode()), state);
        }
        assert_eq!(MutexState::decode(UNLOCKED), MutexState::Unlocked);
        assert_eq!(MutexState::decode(LOCKED_NO_WAITERS), MutexState::LockedNoWaiters);
    }

    #[test]
    fn debug_reads_the_word_without_masking() {
        let sched = started::<4>();
        let mutex = RawMutex::new();
        mutex.lock(sched, true);
        let raises = sched.arch().switch_raises();
        let shown = std::format!("{:?}", mutex);
        assert_eq!(shown, "RawMutex { state: LockedNoWaiters }");
        assert_eq!(sched.arch().switch_raises(), raises);
    }

    #[test]
    fn non_waiting_lock_leaves_caller_runnable() {
        let sched = started::<4>();
        let b = sched.create_thread(leaked_stack(128), idle, 0).expect("b");
        let mutex = RawMutex::new();
        assert!(mutex.lock(sched, true));

        sched.select_next(0x100);
        assert_eq!(sched.current_id(), b);
        assert!(!mutex.lock(sched, false));

        assert_eq!(mutex.state(sched), MutexState::LockedNoWaiters);
        assert_eq!(sched.stats(), (2, 2, 0));
        assert_eq!(run_order(sched), [1, 0]);
        assert_eq!(sched.arch().pend_count(), 0);
    }

    #[test]
    fn waiters_are_served_in_arrival_order() {
        let sched = started::<4>();
        let b = sched.create_thread(leaked_stack(128), idle, 0).expect("b");
        let c = sched.create_thread(leaked_stack(128), idle, 0).expect("c");
        let mutex = RawMutex::new();
        assert!(mutex.lock(sched, true));

        // b then c queue up behind main
        sched.select_next(0x100);
        assert!(mutex.lock(sched, true));
        assert!(sched.arch().take_pending_switch());
        sched.select_next(0x200);
        assert_eq!(sched.current_id(), c);
        assert!(mutex.lock(sched, true));
        sched.select_next(0x300);

        assert_eq!(sched.current_id(), ThreadId::from_index(0));
        assert_eq!(mutex.state(sched), MutexState::LockedWithWaiters(b));
        assert_eq!(sched.stats(), (3, 1, 2));

        mutex.unlock(sched);
        assert_eq!(mutex.state(sched), MutexState::LockedWithWaiters(c));
        assert_eq!(run_order(sched), [0, 1]);

        mutex.unlock(sched);
        assert_eq!(mutex.state(sched), MutexState::LockedNoWaiters);
        assert_eq!(run_order(sched), [0, 1, 2]);

        mutex.unlock(sched);
        assert_eq!(mutex.state(sched), MutexState::Unlocked);
    }

    #[test]
    fn woken_waiter_has_no_chain_link() {
        let sched = started::<4>();
        let b = sched.create_thread(leaked_stack(128), idle, 0).expect("b");
        let c = sched.create_thread(leaked_stack(128), idle, 0).expect("c");
        let mutex = RawMutex::new();
        mutex.lock(sched, true);
        sched.select_next(0x100);
        mutex.lock(sched, true);
        sched.select_next(0x200);
        mutex.lock(sched, true);
        sched.select_next(0x300);

        mutex.unlock(sched);
        let state = sched.lock_state(Mask::Switch);
        assert_eq!(state.record(b).queue_next, None);
        assert_eq!(state.record(b).status, ThreadStatus::Runnable);
        assert_eq!(state.record(c).status, ThreadStatus::Blocked);
    }

    #[test]
    #[should_panic(expected = "unlock of unlocked mutex")]
    fn unlocking_twice_is_fatal() {
        let sched = started::<4>();
        let mutex = RawMutex::new();
        mutex.lock(sched, true);
        mutex.unlock(sched);
        mutex.unlock(sched);
    }

    #[test]
    #[should_panic(expected = "deadlock")]
    fn waiting_as_the_only_thread_is_fatal() {
        let sched = started::<4>();
        let mutex = RawMutex::new();
        mutex.lock(sched, true);
        mutex.lock(sched, true);
    }

    #[test]
    fn guard_unlocks_on_drop() {
        let sched = started::<4>();
        let mutex = Mutex::new(41u32);
        {
            let mut guard = mutex.lock(sched);
            *guard += 1;
            assert!(mutex.try_lock(sched).is_none());
        }
        assert_eq!(mutex.raw().state(sched), MutexState::Unlocked);
        assert_eq!(*mutex.try_lock(sched).expect("free again"), 42);
        assert_eq!(mutex.into_inner(), 42);
    }
}
