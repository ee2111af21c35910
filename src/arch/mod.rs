//! Architecture abstraction layer for interrupt masking and switch triggering.
//!
//! The scheduler never touches CPU registers itself. It relies on an [`Arch`]
//! implementation to mask interrupts around list mutations, to pend the
//! context-switch trap and to idle the core. The trap handler that actually
//! saves and restores registers lives outside this crate and only calls
//! [`Scheduler::select_next`](crate::kernel::Scheduler::select_next).

pub mod frame;
pub mod host;

#[cfg(target_arch = "arm")]
pub mod cortex_m;

pub use frame::{InitialFrame, FRAME_WORDS};
pub use host::HostArch;

/// Architecture abstraction trait.
///
/// Two masking levels are exposed. `disable_all` masks every maskable
/// interrupt and is used for thread creation, termination and teardown.
/// `raise_to_switch_priority` only blocks the context-switch trap (and
/// anything of equal or lower urgency) so other interrupt sources keep
/// running while a mutex changes hands.
///
/// Both pairs must nest: restoring a state returned by an inner call must
/// leave the outer masking in place.
pub trait Arch {
    /// Opaque masking state returned by the raise/disable calls.
    type IrqState: Copy;

    /// Mask all interrupts, returning the previous state.
    fn disable_all(&self) -> Self::IrqState;

    /// Restore the interrupt state returned by [`Arch::disable_all`].
    fn enable_all(&self, state: Self::IrqState);

    /// Raise the execution priority so the context-switch trap cannot fire.
    fn raise_to_switch_priority(&self) -> Self::IrqState;

    /// Restore the priority returned by [`Arch::raise_to_switch_priority`].
    fn restore_priority(&self, state: Self::IrqState);

    /// Request the context-switch trap. It is taken as soon as the current
    /// masking allows.
    fn pend_switch(&self);

    /// Enter a low-power wait until the next interrupt.
    fn wait_for_interrupt(&self);
}

#[cfg(target_arch = "arm")]
pub use self::cortex_m::CortexM as DefaultArch;

#[cfg(not(target_arch = "arm"))]
pub use HostArch as DefaultArch;
