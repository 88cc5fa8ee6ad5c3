//! Context capture: snapshotting the hardware exception frame and seeding the
//! unwind from an active fault handler.

use crate::fault_status::{
    read_cfsr, read_hfsr, BusFaultStatus, HardFaultStatus, MemManageFaultStatus, UsageFaultStatus,
};
use crate::unwind::{Call, CallStack};

/// The hardware-pushed exception frame, exactly as ARMv7-M stacks it on exception
/// entry: R0–R3, R12, LR, the return PC, and xPSR, packed and little-endian.
///
/// This type borrows its storage from the interrupted stack; it is never copied or
/// constructed by value outside of tests.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SavedRegisters {
    /// Argument/result register 0.
    pub r0: u32,
    /// Argument/result register 1.
    pub r1: u32,
    /// Argument/result register 2.
    pub r2: u32,
    /// Argument/result register 3.
    pub r3: u32,
    /// IP / scratch register.
    pub r12: u32,
    /// Link register: the pre-fault return address.
    pub lr: u32,
    /// Program counter at the point of fault.
    pub pc: u32,
    /// Saved program status register.
    pub xpsr: u32,
}

/// Which stack pointer was active in the code that took the fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveStack {
    /// Main stack pointer.
    Msp,
    /// Process stack pointer.
    Psp,
}

impl ActiveStack {
    /// Decodes bit 2 of an exception-return value (the value EXC_RETURN/LR holds
    /// on exception entry): clear selects MSP, set selects PSP.
    #[must_use]
    pub const fn from_exc_return(exc_return: u32) -> Self {
        if exc_return & 0b100 == 0 {
            Self::Msp
        } else {
            Self::Psp
        }
    }
}

/// The aggregate snapshot handed to the recovery policy once a fault has been
/// captured and unwound: the hardware frame, the fault-status words, and the
/// reconstructed call stack.
///
/// Exactly one instance exists process-wide (see [`DebugInfoCell`]): written only
/// from within a fault handler, read only once that handler has finished unwinding.
pub struct DebugInfo {
    /// Points at the hardware-pushed exception frame on the interrupted stack.
    /// `None` until a fault has been captured.
    registers: Option<*const SavedRegisters>,
    /// Configurable Fault Status Register, read at capture time.
    pub cfsr: u32,
    /// Hard Fault Status Register, read at capture time.
    pub hfsr: u32,
    /// The reconstructed call stack, populated by a subsequent call to
    /// [`crate::unwind::unwind`].
    pub call_stack: CallStack,
}

impl DebugInfo {
    /// An empty snapshot, suitable for zero-initialising static storage.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            registers: None,
            cfsr: 0,
            hfsr: 0,
            call_stack: CallStack::new(),
        }
    }

    /// The hardware exception frame captured for the current fault, if any.
    ///
    /// # Safety
    ///
    /// The returned reference is only valid while the fault handler that captured
    /// it is still on the stack; do not retain it past that activation.
    #[must_use]
    pub unsafe fn registers(&self) -> Option<&SavedRegisters> {
        self.registers.map(|ptr| unsafe { &*ptr })
    }
}

impl Default for DebugInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders the same fields Tock's `cortexm::print_cortexm_state` prints for a fault
/// report — CFSR sub-field names, HFSR flags, the register dump, and the call stack —
/// onto whatever `core::fmt::Write` sink the caller has to hand (e.g. a UART), in the
/// shape of `vexide-core`'s `Backtrace: Display` impl.
impl core::fmt::Display for DebugInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "CFSR: 0x{:08x}", self.cfsr)?;
        writeln!(
            f,
            "  MemManage:  {}",
            MemManageFaultStatus::from_cfsr(self.cfsr)
        )?;
        writeln!(f, "  BusFault:   {}", BusFaultStatus::from_cfsr(self.cfsr))?;
        writeln!(
            f,
            "  UsageFault: {}",
            UsageFaultStatus::from_cfsr(self.cfsr)
        )?;
        writeln!(
            f,
            "HFSR: 0x{:08x} ({})",
            self.hfsr,
            HardFaultStatus::from_bits_truncate(self.hfsr)
        )?;

        // SAFETY: `fmt` is only meaningfully called while the report this `DebugInfo`
        // belongs to is still live, the same window `registers()`'s contract requires.
        match unsafe { self.registers() } {
            Some(regs) => {
                writeln!(f, "r0:  0x{:08x}", regs.r0)?;
                writeln!(f, "r1:  0x{:08x}", regs.r1)?;
                writeln!(f, "r2:  0x{:08x}", regs.r2)?;
                writeln!(f, "r3:  0x{:08x}", regs.r3)?;
                writeln!(f, "r12: 0x{:08x}", regs.r12)?;
                writeln!(f, "lr:  0x{:08x}", regs.lr)?;
                writeln!(f, "pc:  0x{:08x}", regs.pc)?;
                writeln!(f, "xpsr: 0x{:08x}", regs.xpsr)?;
            }
            None => writeln!(f, "(no register frame captured)")?,
        }

        write!(f, "{}", self.call_stack)
    }
}

/// Reads the fault-status registers, publishes the hardware exception frame, and
/// seeds the unwind from the interrupted context's frame pointer and return
/// address.
///
/// `exception_frame` must point at the hardware-pushed frame for the fault
/// currently being handled (the MSP- or PSP-selected stack pointer, per §4.1), and
/// `frame_pointer` at R7's value at fault entry. Both are recovered by the naked
/// trampoline in [`crate::arch`] before this function — or any other ordinary call
/// that would itself push a frame — ever runs, so this function itself never reads
/// MSP/PSP or R7.
///
/// # Safety
///
/// Must be called from within the fault-exception handler that took the fault,
/// before any call that would itself push a stack frame, and before any further
/// fault of the same or higher priority can occur. `exception_frame` must point at
/// a valid, hardware-populated exception frame.
pub unsafe fn capture(
    debug_info: &mut DebugInfo,
    exception_frame: *const SavedRegisters,
    frame_pointer: u32,
) -> Call {
    debug_info.registers = Some(exception_frame);
    debug_info.cfsr = unsafe { read_cfsr() };
    debug_info.hfsr = unsafe { read_hfsr() };

    let lr = unsafe { (*exception_frame).lr };

    Call {
        lr,
        fp: frame_pointer,
    }
}

/// A process-wide, statically allocated holder for the single [`DebugInfo`]
/// instance (spec §5, §9): written only inside fault handlers, read only once a
/// fault has finished unwinding. No locking is required because this device class
/// cannot re-enter a fault handler while one is already active — a fault during a
/// fault escalates to an unrecoverable lockup rather than reentering this cell.
pub struct DebugInfoCell {
    inner: core::cell::UnsafeCell<DebugInfo>,
}

// SAFETY: access is serialised by the hardware's fault-priority model (§5), not by
// this type; see the non-reentrancy argument above.
unsafe impl Sync for DebugInfoCell {}

impl DebugInfoCell {
    /// A cell holding an empty [`DebugInfo`], suitable for `static` initialisation.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: core::cell::UnsafeCell::new(DebugInfo::new()),
        }
    }

    /// Obtains exclusive access to the held [`DebugInfo`].
    ///
    /// # Safety
    ///
    /// The caller must ensure no other reference (shared or exclusive) to the held
    /// value is alive concurrently. Per §5 this holds as long as callers only reach
    /// this from a fault handler (never re-entered) or from recovery code that runs
    /// strictly after the handler returns.
    #[must_use]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self) -> &mut DebugInfo {
        unsafe { &mut *self.inner.get() }
    }
}

impl Default for DebugInfoCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_stack_decodes_msp_when_bit_clear() {
        assert_eq!(ActiveStack::from_exc_return(0xFFFF_FFF9), ActiveStack::Msp);
    }

    #[test]
    fn active_stack_decodes_psp_when_bit_set() {
        assert_eq!(ActiveStack::from_exc_return(0xFFFF_FFFD), ActiveStack::Psp);
    }

    #[test]
    fn capture_publishes_frame_and_seeds_call() {
        let frame = SavedRegisters {
            r0: 0,
            r1: 0,
            r2: 0,
            r3: 0,
            r12: 0,
            lr: 0x1234_5679,
            pc: 0x1094,
            xpsr: 0x6100_0000,
        };

        let mut debug_info = DebugInfo::new();
        let seed = unsafe { capture(&mut debug_info, &frame, 0x2000_FFF0) };

        assert_eq!(seed.lr, 0x1234_5679);
        assert_eq!(seed.fp, 0x2000_FFF0);
        assert_eq!(
            unsafe { debug_info.registers() }.unwrap().pc,
            0x1094
        );
    }

    #[test]
    fn debug_info_display_renders_fault_status_names() {
        // Set the fault-status fields directly rather than through `capture`, which
        // would read the real CFSR/HFSR hardware addresses — not present on a host
        // test run.
        let mut debug_info = DebugInfo::new();
        debug_info.cfsr = 1 << 25; // DIVBYZERO
        debug_info.hfsr = 1 << 30; // FORCED

        let rendered = format!("{debug_info}");
        assert!(rendered.contains("DIVBYZERO"));
        assert!(rendered.contains("FORCED"));
        assert!(rendered.contains("call stack:"));
        assert!(rendered.contains("(no register frame captured)"));
    }

    #[test]
    fn debug_info_display_renders_none_for_empty_fault_status() {
        let debug_info = DebugInfo::new();
        let rendered = format!("{debug_info}");
        assert!(rendered.contains("none"));
        assert!(rendered.contains("(no register frame captured)"));
    }

    #[test]
    fn debug_info_cell_round_trips_through_unsafe_cell() {
        let cell = DebugInfoCell::new();
        unsafe {
            cell.get_mut().cfsr = 0xDEAD_BEEF;
        }
        assert_eq!(unsafe { cell.get_mut().cfsr }, 0xDEAD_BEEF);
    }
}
