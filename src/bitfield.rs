use bitvec::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{AsmError, Result};

/// One field of an instruction word: a value and the number of bits it occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub value: u32,
    pub width: u8,
}

/// The three segments (opcode, mid, low) of a submodule instruction, MSB first.
pub type SubWord = [Segment; 3];

impl Segment {
    /// Builds a segment, rejecting values that do not fit in `width` bits.
    pub fn new(value: u32, width: u8) -> Result<Self> {
        if width > 32 || (width < 32 && u64::from(value) > max_value(width)) {
            return Err(AsmError::FieldOverflow { value: u64::from(value), width });
        }
        Ok(Self { value, width })
    }

    pub fn bin(&self) -> String {
        format!("{:0w$b}", self.value, w = self.width as usize)
    }
}

/// Checks that `value` fits in a `width`-bit field and returns it unchanged.
pub fn fit(value: u32, width: u8) -> Result<u32> {
    Segment::new(value, width).map(|s| s.value)
}

/// Largest unsigned value representable in `width` bits.
pub fn max_value(width: u8) -> u64 {
    if width >= 64 { u64::MAX } else { (1u64 << width) - 1 }
}

pub fn total_width(segs: &[Segment]) -> u32 {
    segs.iter().map(|s| u32::from(s.width)).sum()
}

/// Packs the segments MSB-first into a single word.
pub fn pack(segs: &[Segment]) -> u64 {
    segs.iter()
        .fold(0u64, |word, s| (word << s.width) | u64::from(s.value))
}

/// Inverse of [`pack`]: splits `word` into fields of the given widths, MSB-first.
pub fn unpack(word: u64, widths: &[u8]) -> Vec<u32> {
    let bits = word.view_bits::<Lsb0>();
    let mut hi: usize = widths.iter().map(|&w| w as usize).sum();
    widths
        .iter()
        .map(|&w| {
            let lo = hi - w as usize;
            let v = if w == 0 { 0 } else { bits[lo..hi].load_le::<u32>() };
            hi = lo;
            v
        })
        .collect()
}

/// Big-endian binary text of the segments with `sep` between fields.
pub fn to_bin_string(segs: &[Segment], sep: &str) -> String {
    segs.iter().map(Segment::bin).collect::<Vec<_>>().join(sep)
}

/// `0x`-prefixed upper-case hex, zero padded to `ceil(width / 4)` digits.
pub fn to_hex_string(word: u64, width: u32) -> String {
    let digits = width.div_ceil(4) as usize;
    format!("0x{word:0digits$X}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(value: u32, width: u8) -> Segment {
        Segment::new(value, width).unwrap()
    }

    #[test]
    fn pack_then_unpack_recovers_fields() {
        let segs = [seg(2, 2), seg(5, 4), seg(0x3FF, 10), seg(0xBEEF, 16)];
        let word = pack(&segs);
        assert_eq!(total_width(&segs), 32);
        assert_eq!(unpack(word, &[2, 4, 10, 16]), vec![2, 5, 0x3FF, 0xBEEF]);
    }

    #[test]
    fn pack_is_msb_first() {
        let word = pack(&[seg(1, 4), seg(0, 10), seg(1, 16)]);
        assert_eq!(word, (1 << 26) | 1);
    }

    #[test]
    fn bin_string_keeps_leading_zeros_and_separator() {
        let segs = [seg(1, 2), seg(3, 4), seg(0, 3)];
        assert_eq!(to_bin_string(&segs, "_"), "01_0011_000");
        assert_eq!(to_bin_string(&segs, ""), "010011000");
    }

    #[test]
    fn hex_is_padded_to_word_width() {
        assert_eq!(to_hex_string(0x1F, 32), "0x0000001F");
        assert_eq!(to_hex_string(0x1F, 30), "0x0000001F");
        assert_eq!(to_hex_string(0xABC, 10), "0xABC");
    }

    #[test]
    fn oversized_value_is_rejected() {
        assert!(Segment::new(16, 4).is_err());
        assert!(Segment::new(15, 4).is_ok());
        assert!(Segment::new(u32::MAX, 32).is_ok());
    }
}
