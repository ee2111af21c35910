//! ARMv7-M implementation of [`Arch`].
//!
//! PRIMASK provides the "disable all" level and BASEPRI the "switch
//! priority" level. The context switch itself is PendSV, configured by the
//! board at the lowest priority so that raising BASEPRI to
//! [`SWITCH_PRIORITY`](crate::config::SWITCH_PRIORITY) holds it off while
//! every other interrupt keeps running.

use super::Arch;
use crate::config::SWITCH_PRIORITY;
use cortex_m::peripheral::SCB;
use cortex_m::register::{basepri, basepri_max, primask};

/// Cortex-M3/M4/M7 architecture handle (zero-sized).
#[derive(Debug, Clone, Copy, Default)]
pub struct CortexM;

impl Arch for CortexM {
    /// PRIMASK "was active" flag or the previous BASEPRI value.
    type IrqState = u8;

    #[inline]
    fn disable_all(&self) -> u8 {
        let was_enabled = primask::read().is_active();
        cortex_m::interrupt::disable();
        was_enabled as u8
    }

    #[inline]
    fn enable_all(&self, state: u8) {
        if state != 0 {
            // Safety: only re-enables interrupts that were enabled when the
            // matching disable_all ran.
            unsafe { cortex_m::interrupt::enable() };
        }
        cortex_m::asm::isb();
    }

    #[inline]
    fn raise_to_switch_priority(&self) -> u8 {
        let prev = basepri::read();
        // only ever raises the masking level
        basepri_max::write(SWITCH_PRIORITY);
        prev
    }

    #[inline]
    fn restore_priority(&self, state: u8) {
        // Safety: restores the level saved by raise_to_switch_priority.
        unsafe { basepri::write(state) };
        // a PendSV pended under the mask is taken before the next instruction
        cortex_m::asm::isb();
    }

    #[inline]
    fn pend_switch(&self) {
        SCB::set_pendsv();
    }

    #[inline]
    fn wait_for_interrupt(&self) {
        cortex_m::asm::wfi();
    }
}
