//! Fixed-width sub-field packing inside a machine word.
//!
//! Packed words (material flags, mesh type/material ids, GC index attributes)
//! are kept as raw integers so reserved and unknown bits round-trip bit-exact;
//! these helpers implement the accessors.

/// A mask of `width` bits starting at `shift`.
#[must_use]
pub const fn mask(shift: u32, width: u32) -> u32 {
    ((1u32 << width) - 1) << shift
}

/// Extract the `width`-bit field at `shift` from `word`.
#[must_use]
pub const fn extract(word: u32, shift: u32, width: u32) -> u32 {
    (word >> shift) & ((1u32 << width) - 1)
}

/// Return `word` with the `width`-bit field at `shift` replaced by `value`.
///
/// Bits of `value` outside the field width are discarded.
#[must_use]
pub const fn insert(word: u32, shift: u32, width: u32, value: u32) -> u32 {
    (word & !mask(shift, width)) | ((value << shift) & mask(shift, width))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask() {
        assert_eq!(mask(0, 7), 0x7F);
        assert_eq!(mask(13, 2), 0x6000);
        assert_eq!(mask(29, 3), 0xE000_0000);
    }

    #[test]
    fn test_extract() {
        let word = 0b1011_0110_0101u32;
        assert_eq!(extract(word, 0, 4), 0b0101);
        assert_eq!(extract(word, 4, 4), 0b0110);
        assert_eq!(extract(word, 8, 4), 0b1011);
    }

    #[test]
    fn test_insert_preserves_other_bits() {
        let word = 0xFFFF_FFFFu32;
        assert_eq!(insert(word, 8, 8, 0), 0xFFFF_00FF);
        assert_eq!(insert(0, 14, 2, 3), 0xC000);
    }

    #[test]
    fn test_insert_truncates_value() {
        assert_eq!(insert(0, 0, 4, 0xFF), 0xF);
    }

    #[test]
    fn test_roundtrip() {
        let word = insert(insert(0, 0, 14, 0x1234), 14, 2, 2);
        assert_eq!(extract(word, 0, 14), 0x1234);
        assert_eq!(extract(word, 14, 2), 2);
    }
}
