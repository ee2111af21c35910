//! The scheduler context object.
//!
//! [`Scheduler`] owns the thread arena, the Run Queue, the All-Threads list
//! and the `current` pointer. Thread code reaches it through `&self`
//! methods that mask the context-switch trap for the duration of every
//! mutation; the trap itself only ever calls [`Scheduler::select_next`].
//!
//! ```ignore
//! use pendsv_threads::{bind_switch_handler, arch::cortex_m::CortexM, Scheduler, Stack, StackPool};
//!
//! static SCHED: Scheduler<CortexM, 8> = Scheduler::new(CortexM);
//! static STACKS: StackPool<4, 1024> = StackPool::new();
//!
//! bind_switch_handler!(SCHED);
//!
//! fn blink(pin: usize) { /* thread work */ }
//!
//! fn main() {
//!     SCHED.init(Stack::main_from_linker()).expect("init once");
//!     SCHED.create_thread(STACKS.allocate().unwrap(), blink, 5).unwrap();
//!     loop { SCHED.yield_now(); }
//! }
//! ```

use crate::arch::frame::{self, StartContext};
use crate::arch::Arch;
use crate::config::MAIN_THREAD_SLOT;
use crate::errors::{fatal, ScheduleError, SpawnError, ThreadResult};
use crate::mem::Stack;
use crate::sched::State;
use crate::sync::{CriticalSection, Mask};
use crate::thread::{RootRegion, ThreadId, ThreadInfo, ThreadRecord, ThreadStatus};
use crate::time::TickCounter;
use core::fmt;
use core::ops::{Deref, DerefMut};
use portable_atomic::{AtomicBool, Ordering};

/// Thread entry function. Returning from it terminates the thread.
pub type ThreadEntry = fn(usize);

/// `thread_start(arg, entry, scheduler)`, resumed into by the first switch.
type StartRoutine = extern "C" fn(usize, usize, usize) -> !;
type ReturnTrap = extern "C" fn() -> !;

/// Round-robin scheduler over an arena of `N` thread slots.
pub struct Scheduler<A: Arch, const N: usize> {
    arch: A,
    state: spin::Mutex<State<N>>,
    initialized: AtomicBool,
    /// More than one thread exists
    enabled: AtomicBool,
    ticks: TickCounter,
}

/// Scheduler state borrowed under a critical section.
///
/// Field order matters: the state lock is released before the masking is
/// lifted, so the trap never finds the state locked.
pub(crate) struct StateGuard<'a, A: Arch, const N: usize> {
    state: spin::MutexGuard<'a, State<N>>,
    _cs: CriticalSection<'a, A>,
}

impl<A: Arch, const N: usize> Deref for StateGuard<'_, A, N> {
    type Target = State<N>;

    fn deref(&self) -> &State<N> {
        &self.state
    }
}

impl<A: Arch, const N: usize> DerefMut for StateGuard<'_, A, N> {
    fn deref_mut(&mut self) -> &mut State<N> {
        &mut self.state
    }
}

impl<A: Arch, const N: usize> Scheduler<A, N> {
    /// Create an uninitialized scheduler.
    pub const fn new(arch: A) -> Self {
        assert!(N > MAIN_THREAD_SLOT, "arena needs a slot for the main thread");
        assert!(N < u16::MAX as usize, "arena too large for thread ids");
        Self {
            arch,
            state: spin::Mutex::new(State::new()),
            initialized: AtomicBool::new(false),
            enabled: AtomicBool::new(false),
            ticks: TickCounter::new(),
        }
    }

    pub fn arch(&self) -> &A {
        &self.arch
    }

    pub(crate) fn lock_state(&self, mask: Mask) -> StateGuard<'_, A, N> {
        let cs = CriticalSection::enter(&self.arch, mask);
        StateGuard {
            state: self.state.lock(),
            _cs: cs,
        }
    }

    /// Adopt the calling context as the main thread.
    ///
    /// `main_stack` is the region the caller is already running on; on the
    /// target that is [`Stack::main_from_linker`].
    pub fn init(&self, main_stack: Stack) -> ThreadResult<()> {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ScheduleError::AlreadyInitialized.into());
        }

        let (base, words) = (main_stack.base(), main_stack.words());
        {
            let mut state = self.lock_state(Mask::All);
            let main = ThreadId::from_index(MAIN_THREAD_SLOT);
            // saved_sp is filled in when the main thread first switches out
            state.record_mut(main).occupy(main, main_stack, 0, 0);
            state.all_head = Some(main);
            state.current = main;
            self.enabled.store(false, Ordering::Release);
        }

        log::info!("scheduler up: {} slots, main stack {:#x} ({} words)", N, base, words);
        Ok(())
    }

    /// Collapse back to a single thread: the one calling this.
    ///
    /// Every other thread is dropped from both lists and its slot (and stack
    /// handle) released. Nothing is switched to; the records are simply
    /// forgotten.
    pub fn deinit(&self) {
        if !self.is_initialized() {
            return;
        }
        let survivor = {
            let mut state = self.lock_state(Mask::All);
            let current = state.current;
            for (index, record) in state.records.iter_mut().enumerate() {
                if index != current.index() {
                    record.vacate();
                }
            }
            let record = state.record_mut(current);
            record.status = ThreadStatus::Runnable;
            record.all_next = None;
            record.run_prev = current;
            record.run_next = current;
            record.queue_next = None;
            state.all_head = Some(current);
            self.enabled.store(false, Ordering::Release);
            current
        };
        log::info!("scheduler collapsed to thread {}", survivor);
    }

    /// Create a thread running `entry(arg)` on `stack`.
    ///
    /// The thread is queued immediately behind the caller, so it runs after
    /// every other runnable thread and before the caller comes round again.
    pub fn create_thread(
        &'static self,
        stack: Stack,
        entry: ThreadEntry,
        arg: usize,
    ) -> ThreadResult<ThreadId>
    where
        A: 'static,
    {
        if !self.is_initialized() {
            return Err(SpawnError::NotInitialized.into());
        }

        let start = StartContext {
            routine: thread_start::<A, N> as StartRoutine as usize,
            return_trap: thread_return_trap as ReturnTrap as usize,
            args: [arg, entry as usize, self as *const Self as usize],
        };
        let words = stack.words();
        // Safety: the handle grants exclusive ownership of the region and no
        // thread runs on it yet.
        let saved_sp = unsafe { frame::prime_stack(&stack, &start) }
            .ok_or(SpawnError::InvalidStackSize(words))?;

        let id = {
            let mut state = self.lock_state(Mask::All);
            let id = state.vacant_slot().ok_or(SpawnError::TooManyThreads)?;
            self.enabled.store(true, Ordering::Release);
            state.record_mut(id).occupy(id, stack, saved_sp, arg);
            state.all_push(id);
            state.run_insert_behind_current(id);
            id
        };

        log::debug!("thread {} created, sp={:#x} ({} words)", id, saved_sp, words);
        Ok(id)
    }

    /// End the calling thread. Invoked automatically when its entry returns.
    pub fn terminate_current(&self) -> ! {
        self.retire_current();
        fatal("could not terminate")
    }

    /// Take the current thread off both lists, mark it for reclamation and
    /// pend the switch away from it.
    ///
    /// On the target the pended trap is taken as soon as interrupts come
    /// back on, so this only returns where no trap exists.
    pub(crate) fn retire_current(&self) {
        log::debug!("thread {} terminating", self.current_id());
        let mut state = self.lock_state(Mask::All);
        let id = state.current;
        state.run_remove(id);
        state.all_unlink(id);

        let record = state.record_mut(id);
        record.status = ThreadStatus::Exited;
        record.all_next = None;
        record.queue_next = None;
        record.arg_root = 0;

        if state.all_is_singleton() {
            self.enabled.store(false, Ordering::Release);
        }
        self.arch.pend_switch();
    }

    /// Round-robin step, called by the context-switch trap only.
    ///
    /// Saves the outgoing stack pointer, advances to the next Run Queue
    /// member, grants it a fresh timeslice and returns the stack pointer to
    /// restore. An exited outgoing thread has its slot reclaimed here.
    pub fn select_next(&self, saved_sp: usize) -> usize {
        if !self.initialized.load(Ordering::Acquire) {
            return saved_sp;
        }
        let Some(mut state) = self.state.try_lock() else {
            // thread code never holds the state without masking the trap
            self.arch.pend_switch();
            return saved_sp;
        };

        let outgoing = state.current;
        let next = {
            let record = state.record_mut(outgoing);
            record.saved_sp = saved_sp;
            let next = record.run_next;
            if record.status == ThreadStatus::Exited {
                record.vacate();
            }
            next
        };

        state.current = next;
        let record = state.record_mut(next);
        record.timeslice.reset();
        record.saved_sp
    }

    /// Give up the CPU if anyone else can use it, otherwise idle until the
    /// next interrupt.
    pub fn yield_now(&self) {
        if !self.is_initialized() {
            return;
        }
        let alone = {
            let state = self.lock_state(Mask::Switch);
            state.is_sole_runnable(state.current)
        };
        if alone {
            self.arch.wait_for_interrupt();
        } else {
            self.arch.pend_switch();
        }
    }

    /// Periodic tick hook.
    ///
    /// Counts down the current thread's timeslice and pends a switch once it
    /// is used up and another thread is runnable. The tick interrupt may
    /// preempt thread code that holds the state; that tick is skipped.
    pub fn tick(&self) {
        self.ticks.increment();
        if !self.enabled.load(Ordering::Acquire) {
            return;
        }
        let Some(mut state) = self.state.try_lock() else {
            return;
        };
        let current = state.current;
        let expired = state.record_mut(current).timeslice.tick();
        if expired && !state.is_sole_runnable(current) {
            self.arch.pend_switch();
        }
    }

    /// Ticks seen by [`Scheduler::tick`].
    pub fn ticks(&self) -> u32 {
        self.ticks.ticks()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Whether more than one thread exists.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn current_id(&self) -> ThreadId {
        self.lock_state(Mask::Switch).current
    }

    /// Set the current thread's local slot.
    pub fn set_local(&self, value: usize) {
        self.lock_state(Mask::Switch).current_record_mut().local = value;
    }

    /// The current thread's local slot.
    pub fn local(&self) -> usize {
        let state = self.lock_state(Mask::Switch);
        state.record(state.current).local
    }

    /// (total, runnable, blocked) thread counts.
    pub fn stats(&self) -> (usize, usize, usize) {
        self.lock_state(Mask::Switch).counts()
    }

    /// Every live thread, most recently created first.
    ///
    /// The state is locked for each step only, so the loop body may call
    /// back into the scheduler. Threads created or terminated while the walk
    /// is under way may be missed. Call from thread context only.
    pub fn threads(&self) -> Threads<'_, A, N> {
        Threads {
            scheduler: self,
            next: self.lock_state(Mask::Switch).all_head,
        }
    }

    /// Root regions for a conservative collector, one per live thread.
    ///
    /// Walks the All-Threads list step by step like [`Scheduler::threads`].
    pub fn gc_roots(&self) -> GcRoots<'_, A, N> {
        GcRoots {
            scheduler: self,
            next: self.lock_state(Mask::Switch).all_head,
        }
    }

    /// Visit the thread under `cursor` and advance it. Ends the walk if that
    /// thread terminated since the previous step.
    fn walk_step<R>(
        &self,
        cursor: &mut Option<ThreadId>,
        visit: impl FnOnce(ThreadId, &ThreadRecord, ThreadId) -> R,
    ) -> Option<R> {
        let id = (*cursor)?;
        let state = self.lock_state(Mask::Switch);
        let record = state.record(id);
        if !record.is_live() {
            *cursor = None;
            return None;
        }
        *cursor = record.all_next;
        Some(visit(id, record, state.current))
    }

    /// Human-readable thread table.
    pub fn dump(&self) -> Dump<'_, A, N> {
        Dump { scheduler: self }
    }

    /// Emit [`Scheduler::dump`] at info level.
    pub fn log_dump(&self) {
        log::info!("{}", self.dump());
    }
}

/// Start routine every thread's initial frame resumes into.
extern "C" fn thread_start<A: Arch, const N: usize>(
    arg: usize,
    entry: usize,
    scheduler: usize,
) -> ! {
    run_thread::<A, N>(arg, entry, scheduler)
}

/// Run the entry function, then terminate the thread.
fn run_thread<A: Arch, const N: usize>(arg: usize, entry: usize, scheduler: usize) -> ! {
    // Safety: create_thread stored a `ThreadEntry` and a `&'static Scheduler<A, N>`.
    let entry = unsafe { core::mem::transmute::<usize, ThreadEntry>(entry) };
    let scheduler = unsafe { &*(scheduler as *const Scheduler<A, N>) };
    entry(arg);
    scheduler.terminate_current()
}

/// Return address of the start routine, which never returns.
extern "C" fn thread_return_trap() -> ! {
    fatal("thread start routine returned")
}

/// Iterator returned by [`Scheduler::threads`].
pub struct Threads<'a, A: Arch, const N: usize> {
    scheduler: &'a Scheduler<A, N>,
    next: Option<ThreadId>,
}

impl<A: Arch, const N: usize> Iterator for Threads<'_, A, N> {
    type Item = ThreadInfo;

    fn next(&mut self) -> Option<ThreadInfo> {
        self.scheduler.walk_step(&mut self.next, |id, record, _| {
            let (stack_base, stack_len) = record
                .stack
                .as_ref()
                .map_or((0, 0), |stack| (stack.base(), stack.words()));
            ThreadInfo {
                id,
                stack_base,
                stack_len,
                runnable: record.status == ThreadStatus::Runnable,
            }
        })
    }
}

/// Iterator returned by [`Scheduler::gc_roots`].
pub struct GcRoots<'a, A: Arch, const N: usize> {
    scheduler: &'a Scheduler<A, N>,
    next: Option<ThreadId>,
}

impl<A: Arch, const N: usize> Iterator for GcRoots<'_, A, N> {
    type Item = RootRegion;

    fn next(&mut self) -> Option<RootRegion> {
        self.scheduler.walk_step(&mut self.next, |id, record, current| {
            let scan = match &record.stack {
                Some(stack) if id != current => {
                    Some(record.saved_sp.max(stack.base())..stack.top())
                }
                _ => None,
            };
            RootRegion {
                thread: id,
                scan,
                arg: record.arg_root,
            }
        })
    }
}

/// Display adapter returned by [`Scheduler::dump`].
pub struct Dump<'a, A: Arch, const N: usize> {
    scheduler: &'a Scheduler<A, N>,
}

impl<A: Arch, const N: usize> fmt::Display for Dump<'_, A, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.scheduler.is_enabled() {
            return writeln!(f, "THREAD: only main thread");
        }
        writeln!(f, "THREAD:")?;
        for info in self.scheduler.threads() {
            write!(f, "    id={} sp={:#x} sz={}", info.id, info.stack_base, info.stack_len)?;
            if info.runnable {
                write!(f, " (runable)")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Export the `thread_select_next` symbol for an assembly PendSV handler.
///
/// The handler pushes the software-saved registers, calls
/// `thread_select_next(sp)` and restores from the returned stack pointer.
#[macro_export]
macro_rules! bind_switch_handler {
    ($scheduler:expr) => {
        #[no_mangle]
        pub extern "C" fn thread_select_next(saved_sp: usize) -> usize {
            ($scheduler).select_next(saved_sp)
        }
    };
}
