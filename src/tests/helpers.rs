//! Test helper utilities and common functionality.

use crate::arch::HostArch;
use crate::kernel::Scheduler;
use crate::mem::Stack;
use crate::sync::Mask;
use crate::thread::{ThreadId, ThreadStatus};
use std::boxed::Box;
use std::vec;
use std::vec::Vec;

/// Stack length given to the main thread by [`started`].
pub(crate) const MAIN_STACK_WORDS: usize = 64;

/// Zeroed stack region that lives for the rest of the test run.
pub(crate) fn leaked_stack(words: usize) -> Stack {
    let region: &'static mut [usize] = Box::leak(vec![0usize; words].into_boxed_slice());
    Stack::from_static(region)
}

/// Uninitialized scheduler with a `'static` lifetime, as `create_thread` needs.
pub(crate) fn leaked_scheduler<const N: usize>() -> &'static Scheduler<HostArch, N> {
    Box::leak(Box::new(Scheduler::new(HostArch::new())))
}

/// Scheduler that has adopted the test as its main thread.
pub(crate) fn started<const N: usize>() -> &'static Scheduler<HostArch, N> {
    let sched = leaked_scheduler::<N>();
    sched.init(leaked_stack(MAIN_STACK_WORDS)).expect("fresh scheduler");
    sched
}

/// Entry function for threads whose body never runs on the host.
pub(crate) fn idle(_: usize) {}

/// Play the trap until `target` is current. Each outgoing thread is given
/// a recognizable fake stack pointer.
pub(crate) fn switch_to<const N: usize>(sched: &Scheduler<HostArch, N>, target: ThreadId) {
    for _ in 0..N {
        if sched.current_id() == target {
            return;
        }
        let outgoing = sched.current_id();
        sched.select_next(fake_sp(outgoing));
    }
    assert_eq!(sched.current_id(), target, "thread is not in the run queue");
}

/// Stack pointer [`switch_to`] saves for `id`.
pub(crate) fn fake_sp(id: ThreadId) -> usize {
    0x2000_0000 + id.index() * 0x100
}

/// Run Queue members in scheduling order, starting at the current thread.
pub(crate) fn run_order<const N: usize>(sched: &Scheduler<HostArch, N>) -> Vec<ThreadId> {
    let state = sched.lock_state(Mask::Switch);
    state.run_order().take(N + 1).collect()
}

/// Check every structural invariant of the two lists.
///
/// Must not be called while an exited thread is still current.
pub(crate) fn assert_lists_consistent<const N: usize>(sched: &Scheduler<HostArch, N>) {
    let state = sched.lock_state(Mask::Switch);
    let ring: Vec<ThreadId> = state.run_order().take(N + 1).collect();
    assert!(ring.len() <= N, "run queue does not close");

    let current = state.record(state.current);
    assert_eq!(current.status, ThreadStatus::Runnable, "current thread must be runnable");

    for &id in &ring {
        let record = state.record(id);
        assert_eq!(record.status, ThreadStatus::Runnable, "thread {} queued but not runnable", id);
        assert_eq!(state.record(record.run_next).run_prev, id, "links of {} are not inverse", id);
        assert_eq!(record.queue_next, None, "thread {} both runnable and waiting", id);
    }

    let (total, runnable, _blocked) = state.counts();
    assert_eq!(ring.len(), runnable);

    let all: Vec<ThreadId> = state.all_threads().map(|(id, _)| id).take(N + 1).collect();
    assert_eq!(all.len(), total, "all-threads list misses a live thread");
    assert!(all.iter().all(|&id| state.record(id).is_live()));
}
