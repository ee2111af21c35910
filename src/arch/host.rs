//! Simulated architecture for running the scheduler on a development host.
//!
//! No context switch ever happens here. Masking is tracked as plain state and
//! every pended switch or idle request is counted, so tests can drive
//! [`Scheduler::select_next`](crate::kernel::Scheduler::select_next) by hand
//! and observe what the real trap would have been asked to do.

use super::Arch;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};

/// Masking snapshot for [`HostArch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostIrqState {
    all_masked: bool,
    switch_masked: bool,
}

/// Host-side [`Arch`] implementation.
#[derive(Debug, Default)]
pub struct HostArch {
    all_masked: AtomicBool,
    switch_masked: AtomicBool,
    pending: AtomicBool,
    pend_count: AtomicUsize,
    idle_count: AtomicUsize,
    switch_raises: AtomicUsize,
}

impl HostArch {
    pub const fn new() -> Self {
        Self {
            all_masked: AtomicBool::new(false),
            switch_masked: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            pend_count: AtomicUsize::new(0),
            idle_count: AtomicUsize::new(0),
            switch_raises: AtomicUsize::new(0),
        }
    }

    fn snapshot(&self) -> HostIrqState {
        HostIrqState {
            all_masked: self.all_masked.load(Ordering::Acquire),
            switch_masked: self.switch_masked.load(Ordering::Acquire),
        }
    }

    /// Whether the context-switch trap is currently blocked.
    pub fn switch_blocked(&self) -> bool {
        self.all_masked.load(Ordering::Acquire) || self.switch_masked.load(Ordering::Acquire)
    }

    /// Consume the pending-switch request, as taking the trap would.
    pub fn take_pending_switch(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Total number of switch requests since creation.
    pub fn pend_count(&self) -> usize {
        self.pend_count.load(Ordering::Acquire)
    }

    /// Total number of wait-for-interrupt requests since creation.
    pub fn idle_count(&self) -> usize {
        self.idle_count.load(Ordering::Acquire)
    }

    /// Total number of times the switch priority was raised since creation.
    pub fn switch_raises(&self) -> usize {
        self.switch_raises.load(Ordering::Acquire)
    }
}

impl Arch for HostArch {
    type IrqState = HostIrqState;

    fn disable_all(&self) -> HostIrqState {
        let prev = self.snapshot();
        self.all_masked.store(true, Ordering::Release);
        prev
    }

    fn enable_all(&self, state: HostIrqState) {
        self.all_masked.store(state.all_masked, Ordering::Release);
    }

    fn raise_to_switch_priority(&self) -> HostIrqState {
        let prev = self.snapshot();
        self.switch_masked.store(true, Ordering::Release);
        self.switch_raises.fetch_add(1, Ordering::AcqRel);
        prev
    }

    fn restore_priority(&self, state: HostIrqState) {
        self.switch_masked.store(state.switch_masked, Ordering::Release);
    }

    fn pend_switch(&self) {
        self.pending.store(true, Ordering::Release);
        self.pend_count.fetch_add(1, Ordering::AcqRel);
    }

    fn wait_for_interrupt(&self) {
        self.idle_count.fetch_add(1, Ordering::AcqRel);
    }
}
