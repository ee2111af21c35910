//! Compile-time scheduler configuration.
//!
//! Build-level switches are Cargo features (`full-fpu`, `halt-on-panic`);
//! the arena size is the `N` parameter of
//! [`Scheduler`](crate::kernel::Scheduler). Everything else is fixed here.

/// Ticks granted to a thread each time it becomes current.
pub const TIMESLICE_QUANTUM: u32 = 4;

/// BASEPRI value that holds off the context-switch trap.
///
/// PendSV runs at the lowest priority, which on a part with four
/// implemented priority bits encodes as `0xF0`.
pub const SWITCH_PRIORITY: u8 = 0xF0;

/// Arena slot of the thread that calls [`Scheduler::init`](crate::kernel::Scheduler::init).
pub const MAIN_THREAD_SLOT: usize = 0;
