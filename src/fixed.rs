use num_traits::ToPrimitive;

use crate::error::{AsmError, Result};

/// Converts a number to its fixed-point register value with `frac_width`
/// fractional bits. The scaled value is truncated toward zero, not rounded,
/// and must fit a signed `reg_width`-bit register.
pub fn to_fixed<T: ToPrimitive>(value: T, frac_width: u32, reg_width: u32) -> Result<i32> {
    let v = value.to_f64().ok_or_else(|| AsmError::FixedPoint { value: "<unrepresentable>".into(), width: reg_width })?;
    let scaled = (v * (1u64 << frac_width) as f64).trunc();
    let min = -(1i64 << (reg_width - 1));
    let max = (1i64 << (reg_width - 1)) - 1;
    if !scaled.is_finite() || scaled < min as f64 || scaled > max as f64 {
        return Err(AsmError::FixedPoint { value: v.to_string(), width: reg_width });
    }
    Ok(scaled as i32)
}

/// Converts a slice element-wise with [`to_fixed`].
pub fn to_fixed_vec<T: ToPrimitive + Copy>(values: &[T], frac_width: u32, reg_width: u32) -> Result<Vec<i32>> {
    values.iter().map(|&v| to_fixed(v, frac_width, reg_width)).collect()
}

/// Inverse scaling, used when inspecting simulated register contents.
pub fn from_fixed(value: i32, frac_width: u32) -> f64 {
    f64::from(value) / (1u64 << frac_width) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_instead_of_rounding() {
        assert_eq!(to_fixed(1.999, 8, 16).unwrap(), 0x1FF);
        assert_eq!(to_fixed(-1.999, 8, 16).unwrap(), -0x1FF);
        assert_eq!(to_fixed(0.5, 0, 16).unwrap(), 0);
    }

    #[test]
    fn integers_pass_through_unscaled() {
        assert_eq!(to_fixed(42u8, 0, 16).unwrap(), 42);
        assert_eq!(to_fixed(-3i64, 4, 16).unwrap(), -48);
    }

    #[test]
    fn range_is_signed_register_width() {
        assert_eq!(to_fixed(32767, 0, 16).unwrap(), 32767);
        assert_eq!(to_fixed(-32768, 0, 16).unwrap(), -32768);
        assert!(to_fixed(32768, 0, 16).is_err());
        assert!(to_fixed(128.0, 8, 16).is_err());
        assert!(to_fixed(f64::NAN, 0, 16).is_err());
        assert!(to_fixed(f64::INFINITY, 0, 16).is_err());
    }

    #[test]
    fn from_fixed_undoes_scaling() {
        assert_eq!(from_fixed(384, 8), 1.5);
        assert_eq!(to_fixed_vec(&[1.0, -0.25], 2, 16).unwrap(), vec![4, -1]);
    }
}
