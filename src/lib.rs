#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

//! Cooperative round-robin threads for Cortex-M microcontrollers.
//!
//! Threads are switched by the PendSV trap rather than by inline calls, so
//! from a thread's point of view a switch may happen wherever the switch
//! priority is not masked. Every change to scheduler state happens either
//! inside a [`CriticalSection`](sync::CriticalSection) or in the trap
//! itself; there is no other locking.
//!
//! # Features
//!
//! - `full-fpu`: reserve s16-s31 in every thread's initial frame (default)
//! - `halt-on-panic`: provide a bare-metal panic handler that masks
//!   interrupts and sleeps forever (default)
//!
//! # Quick Start
//!
//! ```ignore
//! use pendsv_threads::arch::cortex_m::CortexM;
//! use pendsv_threads::{bind_switch_handler, Mutex, Scheduler, Stack, StackPool};
//!
//! static SCHED: Scheduler<CortexM, 8> = Scheduler::new(CortexM);
//! static STACKS: StackPool<4, 512> = StackPool::new();
//! static SHARED: Mutex<u32> = Mutex::new(0);
//!
//! bind_switch_handler!(SCHED);
//!
//! fn worker(step: usize) {
//!     loop {
//!         *SHARED.lock(&SCHED) += step as u32;
//!         SCHED.yield_now();
//!     }
//! }
//!
//! fn main() -> ! {
//!     SCHED.init(Stack::main_from_linker()).expect("scheduler already up");
//!     for step in 1..=2 {
//!         let stack = STACKS.allocate().expect("stack pool exhausted");
//!         SCHED.create_thread(stack, worker, step).expect("arena full");
//!     }
//!     loop {
//!         SCHED.yield_now();
//!     }
//! }
//!
//! #[no_mangle]
//! extern "C" fn SysTick() {
//!     SCHED.tick();
//! }
//! ```
//!
//! # Architecture
//!
//! - `sched`: thread arena, circular Run Queue and All-Threads list
//! - [`kernel`]: the [`Scheduler`] context object and the trap entry point
//! - [`sync`]: critical sections and the FIFO hand-off mutex
//! - [`arch`]: interrupt masking per target plus the initial stack frame

pub mod arch;
pub mod config;
pub mod errors;
pub mod kernel;
pub mod mem;
pub(crate) mod sched;
pub mod sync;
pub mod thread;
pub mod time;

#[cfg(test)]
extern crate std;

#[cfg(test)]
mod tests;

#[cfg(all(target_os = "none", not(test), feature = "halt-on-panic"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    #[cfg(target_arch = "arm")]
    cortex_m::interrupt::disable();
    loop {
        #[cfg(target_arch = "arm")]
        cortex_m::asm::wfi();
        #[cfg(not(target_arch = "arm"))]
        core::hint::spin_loop();
    }
}

// ============================================================================
// Public API
// ============================================================================

pub use arch::{Arch, DefaultArch};

pub use kernel::{Scheduler, ThreadEntry};

pub use thread::{RootRegion, ThreadId, ThreadInfo, ThreadStatus};

pub use sync::{CriticalSection, Mask, Mutex, MutexGuard, MutexState, RawMutex};

pub use mem::{Stack, StackPool};

pub use errors::{MemoryError, ScheduleError, SpawnError, ThreadError, ThreadResult};
