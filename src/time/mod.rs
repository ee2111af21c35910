//! Tick accounting and time slices.

use crate::config::TIMESLICE_QUANTUM;
use portable_atomic::{AtomicU32, Ordering};

/// Per-thread countdown consumed by the periodic tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlice {
    remaining: u32,
}

impl TimeSlice {
    pub const fn new() -> Self {
        Self { remaining: TIMESLICE_QUANTUM }
    }

    /// Grant a fresh quantum.
    pub fn reset(&mut self) {
        self.remaining = TIMESLICE_QUANTUM;
    }

    /// Consume one tick. Returns `true` once the slice is used up; an
    /// exhausted slice stays at zero until [`TimeSlice::reset`].
    pub fn tick(&mut self) -> bool {
        if self.remaining == 0 {
            true
        } else {
            self.remaining -= 1;
            false
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

impl Default for TimeSlice {
    fn default() -> Self {
        Self::new()
    }
}

/// Tick counter, incremented from the tick interrupt. Wraps at `u32::MAX`.
pub struct TickCounter {
    ticks: AtomicU32,
}

impl TickCounter {
    pub const fn new() -> Self {
        Self { ticks: AtomicU32::new(0) }
    }

    /// Increment the tick counter (called from the tick interrupt).
    pub fn increment(&self) {
        self.ticks.fetch_add(1, Ordering::AcqRel);
    }

    /// Ticks since the counter was created.
    pub fn ticks(&self) -> u32 {
        self.ticks.load(Ordering::Acquire)
    }
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new()
    }
}
