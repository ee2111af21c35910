//! Synchronization primitives built on the scheduler's Run Queue.

pub mod critical;
pub mod mutex;

pub use critical::{CriticalSection, Mask};
pub use mutex::{Mutex, MutexGuard, MutexState, RawMutex};
