//! Fault-status register layout and FDIR initialisation (spec §4.7).
//!
//! Bit names follow the ARMv7-M Architecture Reference Manual's CFSR/HFSR
//! definitions, decoded the way Tock's `cortexm::print_cortexm_state` decodes the
//! same bits for the same purpose: turning a fault-status word into something a
//! human (or this crate's `Display` impls) can read.

use bitflags::bitflags;

/// Configurable Fault Status Register address.
pub const CFSR_ADDR: usize = 0xE000_ED28;
/// Hard Fault Status Register address.
pub const HFSR_ADDR: usize = 0xE000_ED2C;
/// System Handler Control and State Register address.
pub const SHCSR_ADDR: usize = 0xE000_ED24;
/// Configuration and Control Register address.
pub const CCR_ADDR: usize = 0xE000_ED14;

bitflags! {
    /// Memory Management Fault Status Register bits (CFSR bits 7–0).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemManageFaultStatus: u32 {
        /// Instruction access violation.
        const IACCVIOL   = 1 << 0;
        /// Data access violation.
        const DACCVIOL   = 1 << 1;
        /// A derived MemManage fault occurred during exception unstacking.
        const MUNSTKERR  = 1 << 3;
        /// A derived MemManage fault occurred during exception stacking.
        const MSTKERR    = 1 << 4;
        /// A MemManage fault occurred during floating-point lazy state preservation.
        const MLSPERR    = 1 << 5;
        /// `MMFAR` holds a valid fault address.
        const MMARVALID  = 1 << 7;
    }

    /// Bus Fault Status Register bits (CFSR bits 15–8).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BusFaultStatus: u32 {
        /// Bus error on an instruction fetch.
        const IBUSERR    = 1 << 8;
        /// Precise data bus error.
        const PRECISERR  = 1 << 9;
        /// Imprecise data bus error.
        const IMPRECISERR = 1 << 10;
        /// A derived bus fault occurred during exception unstacking.
        const UNSTKERR   = 1 << 11;
        /// A derived bus fault occurred during exception stacking.
        const STKERR     = 1 << 12;
        /// A bus fault occurred during floating-point lazy state preservation.
        const LSPERR     = 1 << 13;
        /// `BFAR` holds a valid fault address.
        const BFARVALID  = 1 << 15;
    }

    /// Usage Fault Status Register bits (CFSR bits 31–16).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UsageFaultStatus: u32 {
        /// Execution of an undefined instruction.
        const UNDEFINSTR = 1 << 16;
        /// Execution of an instruction with invalid EPSR.T/EPSR.IT state.
        const INVSTATE   = 1 << 17;
        /// Attempted load of an invalid value into the PC via EXC_RETURN or `bx`/`pop`.
        const INVPC      = 1 << 18;
        /// Attempted coprocessor access.
        const NOCP       = 1 << 19;
        /// Unaligned access trapped by the `CCR.UNALIGN_TRP` bit.
        const UNALIGNED  = 1 << 24;
        /// Divide-by-zero trapped by the `CCR.DIV_0_TRP` bit.
        const DIVBYZERO  = 1 << 25;
    }

    /// Hard Fault Status Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HardFaultStatus: u32 {
        /// Fault was due to a vector table read error.
        const VECTTBL   = 1 << 1;
        /// A configurable fault was escalated to a hard fault because it could not
        /// be handled at its own priority, or because fault handling was disabled.
        const FORCED    = 1 << 30;
        /// Fault occurred because of a debug event while debug was not enabled.
        const DEBUGEVT  = 1 << 31;
    }
}

/// Writes a bitflags value as its set flag names joined by `" | "`, or `"none"` if
/// empty — the same "name each bit that's actually set" shape as Tock's
/// `print_cortexm_state`, generalised over `bitflags`' own name iterator instead of an
/// `if`-ladder per bit.
fn write_flag_names<T>(
    f: &mut core::fmt::Formatter<'_>,
    names: impl Iterator<Item = (&'static str, T)>,
) -> core::fmt::Result {
    let mut wrote = false;
    for (name, _) in names {
        if wrote {
            f.write_str(" | ")?;
        }
        f.write_str(name)?;
        wrote = true;
    }
    if !wrote {
        f.write_str("none")?;
    }
    Ok(())
}

impl core::fmt::Display for MemManageFaultStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write_flag_names(f, self.iter_names())
    }
}

impl core::fmt::Display for BusFaultStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write_flag_names(f, self.iter_names())
    }
}

impl core::fmt::Display for UsageFaultStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write_flag_names(f, self.iter_names())
    }
}

impl core::fmt::Display for HardFaultStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write_flag_names(f, self.iter_names())
    }
}

impl MemManageFaultStatus {
    /// Extracts the MemManage sub-field of a full CFSR word.
    #[must_use]
    pub const fn from_cfsr(cfsr: u32) -> Self {
        Self::from_bits_truncate(cfsr & 0xFF)
    }
}

impl BusFaultStatus {
    /// Extracts the BusFault sub-field of a full CFSR word.
    #[must_use]
    pub const fn from_cfsr(cfsr: u32) -> Self {
        Self::from_bits_truncate(cfsr & 0xFF00)
    }
}

impl UsageFaultStatus {
    /// Extracts the UsageFault sub-field of a full CFSR word.
    #[must_use]
    pub const fn from_cfsr(cfsr: u32) -> Self {
        Self::from_bits_truncate(cfsr & 0xFFFF_0000)
    }
}

bitflags! {
    /// The System Handler Control and State Register bits this crate touches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Shcsr: u32 {
        const MEMFAULTENA = 1 << 16;
        const BUSFAULTENA = 1 << 17;
        const USGFAULTENA = 1 << 18;
    }

    /// The Configuration and Control Register bits this crate touches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Ccr: u32 {
        const UNALIGN_TRP = 1 << 3;
        const DIV_0_TRP   = 1 << 4;
    }
}

/// Reads the Configurable Fault Status Register.
///
/// # Safety
///
/// Must run on an ARMv7-M core; the address is architecturally fixed.
#[must_use]
pub unsafe fn read_cfsr() -> u32 {
    unsafe { crate::memory::read_word_le(CFSR_ADDR, 0) }
}

/// Reads the Hard Fault Status Register.
///
/// # Safety
///
/// Must run on an ARMv7-M core; the address is architecturally fixed.
#[must_use]
pub unsafe fn read_hfsr() -> u32 {
    unsafe { crate::memory::read_word_le(HFSR_ADDR, 0) }
}

/// Configures the System Handler Control and State Register to enable the
/// MemManage, BusFault, and UsageFault exceptions, and the Configuration and
/// Control Register to trap divide-by-zero and unaligned accesses (spec §4.7).
///
/// Any CFSR bits left set by a previous fault are write-one-to-clear before the
/// fault classes are (re-)enabled, so a stale bit from an earlier pass can never be
/// mistaken for the cause of the next one.
///
/// # Safety
///
/// Must run with privileged access to the System Control Space, before any fault
/// this crate is meant to catch can occur.
pub unsafe fn init_fdir() {
    unsafe {
        let stale_cfsr = crate::memory::read_word_le(CFSR_ADDR, 0);
        if stale_cfsr != 0 {
            write_word(CFSR_ADDR, stale_cfsr);
        }

        let shcsr = crate::memory::read_word_le(SHCSR_ADDR, 0);
        let shcsr = shcsr
            | Shcsr::MEMFAULTENA.bits()
            | Shcsr::BUSFAULTENA.bits()
            | Shcsr::USGFAULTENA.bits();
        write_word(SHCSR_ADDR, shcsr);

        let ccr = crate::memory::read_word_le(CCR_ADDR, 0);
        let ccr = ccr | Ccr::DIV_0_TRP.bits() | Ccr::UNALIGN_TRP.bits();
        write_word(CCR_ADDR, ccr);
    }
}

/// Writes a little-endian 32-bit word to a memory-mapped register.
///
/// # Safety
///
/// `addr` must be a valid, aligned, writable memory-mapped register address.
unsafe fn write_word(addr: usize, value: u32) {
    let ptr = addr as *mut u32;
    unsafe { ptr.write_volatile(value) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_manage_sub_field_extracts_low_byte() {
        let cfsr = 0xFFFF_0003; // IACCVIOL | DACCVIOL in low byte, usage fault bits above
        let mm = MemManageFaultStatus::from_cfsr(cfsr);
        assert!(mm.contains(MemManageFaultStatus::IACCVIOL));
        assert!(mm.contains(MemManageFaultStatus::DACCVIOL));
    }

    #[test]
    fn usage_fault_sub_field_extracts_high_half() {
        let cfsr = 1 << 25; // DIVBYZERO
        let uf = UsageFaultStatus::from_cfsr(cfsr);
        assert!(uf.contains(UsageFaultStatus::DIVBYZERO));
        assert!(!uf.contains(UsageFaultStatus::UNDEFINSTR));
    }

    #[test]
    fn bus_fault_sub_field_extracts_middle_byte() {
        let cfsr = 1 << 9; // PRECISERR
        let bf = BusFaultStatus::from_cfsr(cfsr);
        assert!(bf.contains(BusFaultStatus::PRECISERR));
    }

    #[test]
    fn hard_fault_status_decodes_forced_bit() {
        let hfsr = HardFaultStatus::from_bits_truncate(1 << 30);
        assert!(hfsr.contains(HardFaultStatus::FORCED));
        assert!(!hfsr.contains(HardFaultStatus::VECTTBL));
    }
}
