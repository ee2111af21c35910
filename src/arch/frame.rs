//! Initial execution context for a thread that has never run.
//!
//! The trap handler restores a thread by popping the software-saved block
//! (FPU callee-saved registers, r4-r11, EXC_RETURN) and then performing an
//! exception return, which pops the hardware-stacked frame. Writing the same
//! image onto a fresh stack makes the first switch "return" into the start
//! routine. This module is the one place that writes raw words onto a stack.

use crate::mem::Stack;
use core::mem::size_of;

/// xPSR with only the Thumb bit set.
pub const XPSR_THUMB: usize = 0x0100_0000;

/// EXC_RETURN: back to thread mode, main stack, basic (non-FP) frame.
pub const EXC_RETURN_THREAD_MSP: usize = 0xFFFF_FFF9;

/// Words occupied by an [`InitialFrame`].
pub const FRAME_WORDS: usize = size_of::<InitialFrame>() / size_of::<usize>();

/// Register image written at the top of a new thread's stack.
///
/// Fields are ordered from the saved stack pointer upward, so the layout
/// matches what the trap handler pops.
#[repr(C)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialFrame {
    /// s16-s31, reserved because every thread may use the FPU.
    #[cfg(feature = "full-fpu")]
    pub fpu_callee: [usize; 16],
    /// r4-r11
    pub callee: [usize; 8],
    pub exc_return: usize,
    pub r0: usize,
    pub r1: usize,
    pub r2: usize,
    pub r3: usize,
    pub r12: usize,
    pub lr: usize,
    pub pc: usize,
    pub xpsr: usize,
}

/// What the first switch into a thread should run.
#[derive(Debug, Clone, Copy)]
pub struct StartContext {
    /// Address of the start routine. Bit 0 is cleared when stored.
    pub routine: usize,
    /// Where the start routine would return to.
    pub return_trap: usize,
    /// First three argument registers (r0-r2).
    pub args: [usize; 3],
}

impl InitialFrame {
    pub fn new(start: &StartContext) -> Self {
        Self {
            #[cfg(feature = "full-fpu")]
            fpu_callee: [0; 16],
            callee: [0; 8],
            exc_return: EXC_RETURN_THREAD_MSP,
            r0: start.args[0],
            r1: start.args[1],
            r2: start.args[2],
            r3: 0,
            r12: 0,
            lr: start.return_trap,
            // pc must have bit 0 clear, even for Thumb code
            pc: start.routine & !1,
            xpsr: XPSR_THUMB,
        }
    }
}

/// Address the frame would start at for `stack`, or `None` if it does not fit.
///
/// The top of the stack is rounded down to 8 bytes (AAPCS stack alignment).
pub fn frame_address(stack: &Stack) -> Option<usize> {
    let top = stack.top() & !7;
    let frame = top.checked_sub(size_of::<InitialFrame>())?;
    if frame < stack.base() {
        None
    } else {
        Some(frame)
    }
}

/// Write the initial frame onto `stack` and return the saved stack pointer.
///
/// Returns `None` when the region is too small to hold the frame.
///
/// # Safety
///
/// `stack` must describe writable memory owned exclusively by the thread
/// being created, and no code may be executing on it.
pub unsafe fn prime_stack(stack: &Stack, start: &StartContext) -> Option<usize> {
    let sp = frame_address(stack)?;
    // Safety: `sp..top` lies inside the caller-owned region and is word aligned.
    unsafe { core::ptr::write(sp as *mut InitialFrame, InitialFrame::new(start)) };
    Some(sp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::leaked_stack;

    fn start() -> StartContext {
        StartContext {
            routine: 0x0800_1235,
            return_trap: 0x0800_2001,
            args: [0xA5A5, 0x0800_3001, 0x2000_0000],
        }
    }

    #[test]
    fn frame_sits_at_top_of_stack() {
        let stack = leaked_stack(64);
        let sp = unsafe { prime_stack(&stack, &start()) }.expect("fits");
        assert_eq!(sp + FRAME_WORDS * size_of::<usize>(), stack.top() & !7);
        assert_eq!(sp % size_of::<usize>(), 0);
    }

    #[test]
    fn frame_contents_match_layout() {
        let stack = leaked_stack(64);
        let sp = unsafe { prime_stack(&stack, &start()) }.expect("fits");
        let frame = unsafe { &*(sp as *const InitialFrame) };

        assert_eq!(frame.xpsr, XPSR_THUMB);
        assert_eq!(frame.pc, 0x0800_1234, "thumb bit must be cleared in pc");
        assert_eq!(frame.lr, 0x0800_2001);
        assert_eq!(frame.r0, 0xA5A5);
        assert_eq!(frame.r1, 0x0800_3001);
        assert_eq!(frame.r2, 0x2000_0000);
        assert_eq!((frame.r3, frame.r12), (0, 0));
        assert_eq!(frame.exc_return, EXC_RETURN_THREAD_MSP);
        assert_eq!(frame.callee, [0; 8]);
    }

    #[cfg(feature = "full-fpu")]
    #[test]
    fn fpu_block_is_reserved() {
        assert_eq!(FRAME_WORDS, 16 + 8 + 1 + 8);
    }

    #[test]
    fn too_small_stack_is_rejected() {
        let stack = leaked_stack(FRAME_WORDS - 1);
        assert!(unsafe { prime_stack(&stack, &start()) }.is_none());
    }
}
