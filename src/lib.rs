//! A Failure Detection, Identification and Recovery (FDIR) core for ARMv7-M
//! (Cortex-M) targets.
//!
//! On a hard fault, memory-management fault, bus fault, or usage fault, this crate
//! captures the processor's register context and reconstructs the call chain that
//! led to the fault by interpreting the toolchain-emitted EHABI unwind tables
//! (`.ARM.exidx` / `.ARM.extab`), without executing any frame's code.
//!
//! The crate does not recover from the fault, symbolise addresses, or support
//! personality routines beyond the EHABI compact-model indices 0–2. The triggering
//! handler spins once unwinding completes; acting on the captured [`context::DebugInfo`]
//! is the responsibility of the surrounding firmware.
//!
//! ```text
//! init_fdir()                     // once, at startup
//!   -> fault occurs
//!     -> arch's naked trampoline recovers EXC_RETURN
//!       -> context::capture(..)   // snapshot registers, seed the unwind
//!       -> unwind::unwind(..)     // walk .ARM.exidx / .ARM.extab
//!       -> handler spins
//! ```

#![cfg_attr(not(test), no_std)]

/// Naked fault-vector trampolines and MSP/PSP stack selection.
#[cfg(not(test))]
mod arch;
/// Register-frame capture and the process-wide `DebugInfo` singleton.
pub mod context;
/// The EHABI compact-model unwind-descriptor decoder.
pub mod descriptor;
/// Reading and searching the `.ARM.exidx` index table.
pub mod exidx;
/// CFSR/HFSR decoding and FDIR initialisation.
pub mod fault_status;
/// Raw little-endian word and prel31 accessors.
pub mod memory;
/// The bounded unwind loop.
pub mod unwind;

pub use context::{capture, ActiveStack, DebugInfo, DebugInfoCell, SavedRegisters};
pub use exidx::ExidxEntry;
pub use fault_status::init_fdir;
#[cfg(not(test))]
pub use unwind::unwind;
pub use unwind::{Call, CallStack, StopReason, CALL_STACK_MAX_SIZE};
