//! Reading and searching the `.ARM.exidx` index table.

use crate::memory::{decode_prel31, read_word_le};

/// The EHABI `EXIDX_CANTUNWIND` sentinel value for an entry's second word.
pub const CANTUNWIND: u32 = 0x1;

/// One decoded 8-byte row of `.ARM.exidx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExidxEntry {
    /// The raw first word, a prel31 offset to the function's entry point.
    pub exidx_fn: u32,
    /// The raw second word: `CANTUNWIND`, an inline compact descriptor, or a prel31
    /// offset into `.ARM.extab`.
    pub exidx_entry: u32,
    /// `exidx_fn` decoded to an absolute, word-aligned code address.
    pub decoded_fn: u32,
    /// `exidx_entry` decoded: either kept verbatim (`CANTUNWIND` or inline compact),
    /// or resolved to an absolute `.ARM.extab` address.
    pub decoded_entry: u32,
}

impl ExidxEntry {
    /// Returns whether this entry marks its function as impossible to unwind.
    #[must_use]
    pub const fn is_cantunwind(&self) -> bool {
        self.exidx_entry == CANTUNWIND
    }

    /// Returns whether the unwind descriptor is inlined directly in `exidx_entry`
    /// (the Arm-defined compact model), as opposed to living out-of-line in
    /// `.ARM.extab`.
    #[must_use]
    pub const fn is_inline(&self) -> bool {
        self.exidx_entry & 0x8000_0000 != 0
    }
}

/// Reads and decodes the 8-byte exidx entry at `section_base + byte_offset`.
///
/// # Safety
///
/// The 8 bytes at `section_base + byte_offset` must lie within a valid, linked
/// `.ARM.exidx` section.
#[must_use]
pub unsafe fn read_exidx_entry(section_base: usize, byte_offset: usize) -> ExidxEntry {
    let exidx_fn = unsafe { read_word_le(section_base, byte_offset) };
    let exidx_entry = unsafe { read_word_le(section_base, byte_offset + 4) };

    let fn_location = (section_base + byte_offset) as u32;
    let decoded_fn = decode_prel31(exidx_fn, fn_location);

    let decoded_entry = if exidx_entry == CANTUNWIND || exidx_entry & 0x8000_0000 != 0 {
        exidx_entry
    } else {
        let entry_location = (section_base + byte_offset + 4) as u32;
        decode_prel31(exidx_entry, entry_location)
    };

    ExidxEntry {
        exidx_fn,
        exidx_entry,
        decoded_fn,
        decoded_entry,
    }
}

/// A view over a linked `.ARM.exidx` section, addressable as a sorted array of
/// 8-byte records keyed on each entry's decoded function address.
#[derive(Debug, Clone, Copy)]
pub struct ExidxTable {
    base: usize,
    len: usize,
}

impl ExidxTable {
    /// Builds a table view from the linker-provided section boundaries.
    ///
    /// `start` and `end` are typically `__exidx_start` and `__exidx_end`.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self {
            base: start,
            len: (end - start) / 8,
        }
    }

    /// Number of 8-byte entries in the table.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns whether the table has no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads and decodes the entry at index `i`.
    ///
    /// # Safety
    ///
    /// `i` must be `< self.len()`, and the table's section bounds must still be
    /// valid for reads.
    #[must_use]
    unsafe fn entry(&self, i: usize) -> ExidxEntry {
        unsafe { read_exidx_entry(self.base, i * 8) }
    }

    /// Binary search for the entry with the greatest `decoded_fn <= return_address`.
    ///
    /// Entries are assumed sorted ascending by `decoded_fn`, as EHABI requires. If
    /// `return_address` precedes the first entry, the first entry is returned (the
    /// caller's subsequent decode will behave as a degenerate `CANTUNWIND`).
    ///
    /// # Safety
    ///
    /// The table's section bounds must be valid for reads, and the table must not be
    /// empty.
    #[must_use]
    pub unsafe fn find_entry_for_address(&self, return_address: u32) -> ExidxEntry {
        debug_assert!(!self.is_empty());

        let mut lo = 0usize;
        let mut hi = self.len;

        // Standard upper-bound binary search, then step back one to get the
        // greatest entry whose decoded_fn <= return_address.
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let mid_fn = unsafe { self.entry(mid) }.decoded_fn;

            if mid_fn <= return_address {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        let index = lo.saturating_sub(1);
        unsafe { self.entry(index) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a synthetic exidx table with `n` functions, each `stride` bytes apart
    /// starting at `base_addr`, all pointing to the same second-word value.
    ///
    /// Offsets are computed relative to the buffer's real (post-allocation) address,
    /// since prel31 is PC-relative to wherever the word actually lives.
    fn synthetic_table(base_addr: u32, n: usize, stride: u32, second_word: u32) -> (Vec<u8>, u32) {
        let mut bytes = vec![0u8; n * 8];
        let section_addr = bytes.as_ptr() as u32;

        for i in 0..n {
            let fn_addr = base_addr + i as u32 * stride;
            let entry_addr = section_addr + (i * 8) as u32;
            // prel31 offset such that decode_prel31(word, entry_addr) == fn_addr
            let offset = fn_addr.wrapping_sub(entry_addr) & 0x7FFF_FFFF;
            bytes[i * 8..i * 8 + 4].copy_from_slice(&offset.to_le_bytes());
            bytes[i * 8 + 4..i * 8 + 8].copy_from_slice(&second_word.to_le_bytes());
        }

        (bytes, section_addr)
    }

    #[test]
    fn read_exidx_entry_decodes_cantunwind() {
        let (bytes, _addr) = synthetic_table(0x1000, 1, 0x40, CANTUNWIND);
        let entry = unsafe { read_exidx_entry(bytes.as_ptr() as usize, 0) };
        assert_eq!(entry.decoded_fn, 0x1000);
        assert!(entry.is_cantunwind());
    }

    #[test]
    fn read_exidx_entry_decodes_inline_compact() {
        let inline_word = 0x8000_0000 | (0x01 << 16); // SU16 personality, arbitrary bits
        let (bytes, _addr) = synthetic_table(0x2000, 1, 0x40, inline_word);
        let entry = unsafe { read_exidx_entry(bytes.as_ptr() as usize, 0) };
        assert!(entry.is_inline());
        assert_eq!(entry.decoded_entry, inline_word);
    }

    #[test]
    fn read_exidx_entry_decodes_out_of_line_pointer() {
        // Build a table whose second word is a prel31 pointer into a following
        // "extab" region placed right after the exidx bytes in the same buffer.
        let mut bytes = vec![0u8; 8];
        let exidx_base = bytes.as_ptr() as usize;

        // First word: prel31 to function at exidx_base-relative address (arbitrary).
        let fn_location = exidx_base as u32;
        let fn_addr = 0x3000u32;
        let fn_offset = fn_addr.wrapping_sub(fn_location) & 0x7FFF_FFFF;
        bytes[0..4].copy_from_slice(&fn_offset.to_le_bytes());

        // Second word: prel31 pointer to an extab word we'll place right after.
        let entry_location = (exidx_base + 4) as u32;
        let extab_addr = entry_location + 100; // arbitrary, doesn't need to be valid for this test
        let entry_offset = extab_addr.wrapping_sub(entry_location) & 0x7FFF_FFFF;
        bytes[4..8].copy_from_slice(&entry_offset.to_le_bytes());

        let entry = unsafe { read_exidx_entry(exidx_base, 0) };
        assert!(!entry.is_cantunwind());
        assert!(!entry.is_inline());
        assert_eq!(entry.decoded_entry, extab_addr);
    }

    #[test]
    fn find_entry_for_address_returns_greatest_le() {
        let (bytes, _) = synthetic_table(0x1000, 4, 0x40, CANTUNWIND);
        let table = ExidxTable::new(bytes.as_ptr() as usize, bytes.as_ptr() as usize + bytes.len());

        assert_eq!(table.len(), 4);

        let target = 0x1000 + 0x40 + 0x10; // inside the second function
        let entry = unsafe { table.find_entry_for_address(target) };
        assert_eq!(entry.decoded_fn, 0x1000 + 0x40);
    }

    #[test]
    fn find_entry_for_address_before_first_entry() {
        let (bytes, _) = synthetic_table(0x1000, 4, 0x40, CANTUNWIND);
        let table = ExidxTable::new(bytes.as_ptr() as usize, bytes.as_ptr() as usize + bytes.len());

        let entry = unsafe { table.find_entry_for_address(0x0010) };
        assert_eq!(entry.decoded_fn, 0x1000);
    }

    #[test]
    fn find_entry_for_address_on_boundaries() {
        let (bytes, _) = synthetic_table(0x1000, 4, 0x40, CANTUNWIND);
        let table = ExidxTable::new(bytes.as_ptr() as usize, bytes.as_ptr() as usize + bytes.len());

        for i in 0..4u32 {
            let addr = 0x1000 + i * 0x40;
            let entry = unsafe { table.find_entry_for_address(addr) };
            assert_eq!(entry.decoded_fn, addr);

            let entry = unsafe { table.find_entry_for_address(addr + 0x3F) };
            assert_eq!(entry.decoded_fn, addr);
        }
    }

    #[test]
    fn find_entry_for_address_past_last_entry() {
        let (bytes, _) = synthetic_table(0x1000, 4, 0x40, CANTUNWIND);
        let table = ExidxTable::new(bytes.as_ptr() as usize, bytes.as_ptr() as usize + bytes.len());

        let entry = unsafe { table.find_entry_for_address(0xFFFF_FFFF) };
        assert_eq!(entry.decoded_fn, 0x1000 + 3 * 0x40);
    }
}
