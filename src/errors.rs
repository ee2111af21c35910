//! Error handling for the threading system.
//!
//! Recoverable failures are reported through [`ThreadError`]. Broken
//! scheduler invariants (removing the last runnable thread, a terminated
//! thread that keeps running) are not recoverable and go to [`fatal`].

#![allow(clippy::uninlined_format_args)]

use core::fmt;

/// Result type for threading operations.
pub type ThreadResult<T> = Result<T, ThreadError>;

/// Error type for all fallible threading operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadError {
    /// Thread creation errors
    Spawn(SpawnError),
    /// Scheduler lifecycle errors
    Schedule(ScheduleError),
    /// Stack memory errors
    Memory(MemoryError),
}

/// Errors that can occur during thread creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// Scheduler has not been initialized
    NotInitialized,
    /// Every arena slot is occupied
    TooManyThreads,
    /// Stack region (in words) cannot hold the initial frame
    InvalidStackSize(usize),
}

/// Errors related to the scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    /// `init` was called twice
    AlreadyInitialized,
}

/// Stack memory errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// Every slot of the stack pool is in use
    PoolExhausted,
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadError::Spawn(e) => write!(f, "Thread spawn error: {}", e),
            ThreadError::Schedule(e) => write!(f, "Scheduling error: {}", e),
            ThreadError::Memory(e) => write!(f, "Memory error: {}", e),
        }
    }
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::NotInitialized => write!(f, "Scheduler not initialized"),
            SpawnError::TooManyThreads => write!(f, "Maximum number of threads reached"),
            SpawnError::InvalidStackSize(words) => {
                write!(f, "Stack of {} words cannot hold the initial frame", words)
            }
        }
    }
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::AlreadyInitialized => write!(f, "Scheduler already initialized"),
        }
    }
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::PoolExhausted => write!(f, "Stack pool exhausted"),
        }
    }
}

impl From<SpawnError> for ThreadError {
    fn from(error: SpawnError) -> Self {
        ThreadError::Spawn(error)
    }
}

impl From<ScheduleError> for ThreadError {
    fn from(error: ScheduleError) -> Self {
        ThreadError::Schedule(error)
    }
}

impl From<MemoryError> for ThreadError {
    fn from(error: MemoryError) -> Self {
        ThreadError::Memory(error)
    }
}

/// Report a broken scheduler contract and never return.
///
/// On the target the panic handler masks interrupts and halts the core.
#[cold]
#[track_caller]
pub fn fatal(message: &'static str) -> ! {
    log::error!("fatal: {}", message);
    panic!("{}", message)
}
