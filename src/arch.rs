//! Architecture glue: the naked fault-vector trampolines and MSP/PSP stack
//! selection required before any ordinary call can run (spec §4.1, §9).
//!
//! Grounded in the shape of `vexide_startup::abort_handler`'s
//! `fault_exception_vector!` naked trampolines, and on the `tst lr, #4` / `itte eq` /
//! `mrs` MSP-vs-PSP selection Tock's `arch::cortex_m::hard_fault_handler_arm_v7m`
//! performs entirely in its naked asm before branching to a non-naked continuation,
//! passing the recovered stack pointer on as an argument rather than recovering it
//! from inside the continuation — the continuation is an ordinary `extern "C"` fn
//! with its own prologue, and by the time it runs, R7 and the bank of MSP/PSP no
//! longer necessarily reflect the interrupted context (spec §4.1: stack selection
//! "must happen before any ordinary-function call that would itself push a frame").

#![cfg(not(test))]

use core::arch::naked_asm;

use crate::context::{capture, DebugInfoCell, SavedRegisters};
use crate::unwind::unwind;

/// The process-wide fault snapshot. Exactly one instance exists; see
/// [`DebugInfoCell`] for the reentrancy argument.
static DEBUG_INFO: DebugInfoCell = DebugInfoCell::new();

/// Shared continuation run by all four naked trampolines once the active stack
/// pointer and the interrupted code's R7 have already been recovered into `r0`/`r1`
/// by the trampoline's own asm — before either could be disturbed by this
/// function's own prologue.
///
/// Captures the fault context, drives the unwinder, and then spins forever — this
/// core does not recover from faults (spec §1 Non-goals, §7).
extern "C" fn fault_continuation(exception_frame: *const SavedRegisters, frame_pointer: u32) -> ! {
    unsafe {
        let debug_info = DEBUG_INFO.get_mut();
        let seed = capture(debug_info, exception_frame, frame_pointer);

        unwind(&mut debug_info.call_stack, seed);
    }

    loop {
        core::hint::spin_loop();
    }
}

/// Expands to a `#[unsafe(naked)]` extern "C" fault handler with the given symbol
/// name. The trampoline itself — not the continuation it branches to — selects MSP
/// vs PSP from bit 2 of `lr` (the EXC_RETURN value) into `r0` and copies R7 into
/// `r1`, mirroring Tock's `itte eq` / `mrseq` / `mrsne` sequence, before tail-calling
/// [`fault_continuation`] with both as arguments per the AAPCS (`r0`, `r1`).
macro_rules! fault_exception_vector {
    ($name:ident) => {
        #[unsafe(naked)]
        pub unsafe extern "C" fn $name() {
            naked_asm!(
                "tst lr, #4",
                "ite eq",
                "mrseq r0, msp",
                "mrsne r0, psp",
                "mov r1, r7",
                "b {continuation}",
                continuation = sym fault_continuation,
            )
        }
    };
}

fault_exception_vector!(hard_fault_handler);
fault_exception_vector!(mem_manage_fault_handler);
fault_exception_vector!(bus_fault_handler);
fault_exception_vector!(usage_fault_handler);
