//! Integer model
//!
//! Engine integers are sign-magnitude with a 128-bit magnitude, so both the
//! full `i128` and the full `u128` range are representable. Arithmetic that
//! leaves that range fails with an overflow error instead of wrapping.
//! Division and remainder round toward negative infinity.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{EngineError, EngineResult};

/// Engine integer value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntValue {
    negative: bool,
    magnitude: u128,
}

fn overflow() -> EngineError {
    EngineError::Overflow("integer result out of range".to_string())
}

impl IntValue {
    /// Zero
    pub const ZERO: IntValue = IntValue {
        negative: false,
        magnitude: 0,
    };

    /// Build from sign and magnitude; zero is never negative
    pub fn from_parts(negative: bool, magnitude: u128) -> Self {
        Self {
            negative: negative && magnitude != 0,
            magnitude,
        }
    }

    /// Whether the value is below zero
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Whether the value is zero
    pub fn is_zero(&self) -> bool {
        self.magnitude == 0
    }

    /// Absolute value as `u128`
    pub fn magnitude(&self) -> u128 {
        self.magnitude
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    /// Convert to `i64`
    pub fn to_i64(&self) -> Option<i64> {
        self.to_i128().and_then(|value| i64::try_from(value).ok())
    }

    /// Convert to `u64`
    pub fn to_u64(&self) -> Option<u64> {
        self.to_u128().and_then(|value| u64::try_from(value).ok())
    }

    /// Convert to `i128`
    pub fn to_i128(&self) -> Option<i128> {
        if self.negative {
            // i128::MIN has a magnitude one past i128::MAX.
            if self.magnitude == i128::MIN.unsigned_abs() {
                Some(i128::MIN)
            } else {
                i128::try_from(self.magnitude).ok().map(|value| -value)
            }
        } else {
            i128::try_from(self.magnitude).ok()
        }
    }

    /// Convert to `u128`
    pub fn to_u128(&self) -> Option<u128> {
        if self.negative {
            None
        } else {
            Some(self.magnitude)
        }
    }

    /// Nearest `f64`
    pub fn to_f64(&self) -> f64 {
        let value = self.magnitude as f64;
        if self.negative {
            -value
        } else {
            value
        }
    }

    /// Exact conversion from an integral, finite float
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value.fract() != 0.0 {
            return None;
        }
        let magnitude = value.abs();
        if magnitude >= u128::MAX as f64 {
            return None;
        }
        Some(Self::from_parts(value < 0.0, magnitude as u128))
    }

    // ========================================================================
    // Arithmetic
    // ========================================================================

    /// `-self`
    pub fn neg(self) -> Self {
        Self::from_parts(!self.negative, self.magnitude)
    }

    /// `abs(self)`
    pub fn abs(self) -> Self {
        Self::from_parts(false, self.magnitude)
    }

    /// `self + rhs`
    pub fn add(self, rhs: Self) -> EngineResult<Self> {
        if self.negative == rhs.negative {
            let magnitude = self.magnitude.checked_add(rhs.magnitude).ok_or_else(overflow)?;
            return Ok(Self::from_parts(self.negative, magnitude));
        }
        // Opposite signs: the larger magnitude wins.
        if self.magnitude >= rhs.magnitude {
            Ok(Self::from_parts(self.negative, self.magnitude - rhs.magnitude))
        } else {
            Ok(Self::from_parts(rhs.negative, rhs.magnitude - self.magnitude))
        }
    }

    /// `self - rhs`
    pub fn sub(self, rhs: Self) -> EngineResult<Self> {
        self.add(rhs.neg())
    }

    /// `self * rhs`
    pub fn mul(self, rhs: Self) -> EngineResult<Self> {
        let magnitude = self.magnitude.checked_mul(rhs.magnitude).ok_or_else(overflow)?;
        Ok(Self::from_parts(self.negative != rhs.negative, magnitude))
    }

    /// Floor division and remainder, the remainder taking the divisor's sign
    pub fn div_mod(self, rhs: Self) -> EngineResult<(Self, Self)> {
        if rhs.is_zero() {
            return Err(EngineError::ZeroDivision("integer division or modulo by zero"));
        }

        let quotient = self.magnitude / rhs.magnitude;
        let remainder = self.magnitude % rhs.magnitude;

        if self.negative == rhs.negative || remainder == 0 {
            return Ok((
                Self::from_parts(self.negative != rhs.negative, quotient),
                Self::from_parts(rhs.negative, remainder),
            ));
        }

        let quotient = quotient.checked_add(1).ok_or_else(overflow)?;
        Ok((
            Self::from_parts(true, quotient),
            Self::from_parts(rhs.negative, rhs.magnitude - remainder),
        ))
    }

    /// `self // rhs`
    pub fn floor_div(self, rhs: Self) -> EngineResult<Self> {
        self.div_mod(rhs).map(|(quotient, _)| quotient)
    }

    /// `self % rhs`
    pub fn rem(self, rhs: Self) -> EngineResult<Self> {
        self.div_mod(rhs).map(|(_, remainder)| remainder)
    }

    fn as_bits(self) -> EngineResult<i128> {
        self.to_i128().ok_or_else(overflow)
    }

    /// Two's complement bitwise operation
    pub fn bitwise(self, rhs: Self, op: fn(i128, i128) -> i128) -> EngineResult<Self> {
        Ok(Self::from(op(self.as_bits()?, rhs.as_bits()?)))
    }

    /// `~self`
    pub fn invert(self) -> EngineResult<Self> {
        // ~x == -(x + 1)
        self.add(Self::from(1u8)).map(Self::neg)
    }

    fn shift_count(count: Self) -> EngineResult<u32> {
        if count.negative {
            return Err(EngineError::Value("negative shift count".to_string()));
        }
        Ok(u32::try_from(count.magnitude).unwrap_or(u32::MAX))
    }

    /// `self << count`
    pub fn shl(self, count: Self) -> EngineResult<Self> {
        let count = Self::shift_count(count)?;
        if self.is_zero() {
            return Ok(self);
        }
        if count >= 128 || self.magnitude.leading_zeros() < count {
            return Err(overflow());
        }
        Ok(Self::from_parts(self.negative, self.magnitude << count))
    }

    /// `self >> count`, rounding toward negative infinity
    pub fn shr(self, count: Self) -> EngineResult<Self> {
        let count = Self::shift_count(count)?;
        if !self.negative {
            return Ok(Self::from_parts(false, self.magnitude.checked_shr(count).unwrap_or(0)));
        }
        let bits = self.as_bits()?;
        Ok(Self::from(bits >> count.min(127)))
    }
}

macro_rules! int_value_from {
    ($($ty:ty),*) => {$(
        impl From<$ty> for IntValue {
            fn from(value: $ty) -> Self {
                #[allow(unused_comparisons)]
                let negative = value < 0;
                IntValue::from_parts(negative, (value as i128).unsigned_abs())
            }
        }
    )*};
}

int_value_from!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, usize);

impl From<u128> for IntValue {
    fn from(value: u128) -> Self {
        IntValue::from_parts(false, value)
    }
}

impl From<bool> for IntValue {
    fn from(value: bool) -> Self {
        IntValue::from_parts(false, value as u128)
    }
}

impl Ord for IntValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => self.magnitude.cmp(&other.magnitude),
            (true, true) => other.magnitude.cmp(&self.magnitude),
        }
    }
}

impl PartialOrd for IntValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for IntValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-{}", self.magnitude)
        } else {
            write!(f, "{}", self.magnitude)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(value: i128) -> IntValue {
        IntValue::from(value)
    }

    #[test]
    fn test_extreme_values() {
        assert_eq!(IntValue::from(i128::MIN).to_i128(), Some(i128::MIN));
        assert_eq!(IntValue::from(u128::MAX).to_u128(), Some(u128::MAX));
        assert_eq!(IntValue::from(u128::MAX).to_i128(), None);
        assert_eq!(IntValue::from(-1i64).to_u64(), None);
        assert_eq!(IntValue::from(u64::MAX).to_i64(), None);
    }

    #[test]
    fn test_zero_is_not_negative() {
        assert_eq!(int(5).sub(int(5)).unwrap(), IntValue::ZERO);
        assert!(!IntValue::ZERO.neg().is_negative());
    }

    #[test]
    fn test_add_mixed_signs() {
        assert_eq!(int(-7).add(int(3)).unwrap(), int(-4));
        assert_eq!(int(7).add(int(-10)).unwrap(), int(-3));
        assert!(IntValue::from(u128::MAX).add(int(1)).is_err());
    }

    #[test]
    fn test_floor_division() {
        assert_eq!(int(7).div_mod(int(2)).unwrap(), (int(3), int(1)));
        assert_eq!(int(-7).div_mod(int(2)).unwrap(), (int(-4), int(1)));
        assert_eq!(int(7).div_mod(int(-2)).unwrap(), (int(-4), int(-1)));
        assert_eq!(int(-7).div_mod(int(-2)).unwrap(), (int(3), int(-1)));
        assert!(matches!(int(1).rem(int(0)), Err(EngineError::ZeroDivision(_))));
    }

    #[test]
    fn test_shifts() {
        assert_eq!(int(1).shl(int(10)).unwrap(), int(1024));
        assert_eq!(int(-5).shr(int(1)).unwrap(), int(-3));
        assert_eq!(int(5).shr(int(200)).unwrap(), IntValue::ZERO);
        assert!(int(1).shl(int(128)).is_err());
        assert!(matches!(int(1).shl(int(-1)), Err(EngineError::Value(_))));
    }

    #[test]
    fn test_invert_and_bitwise() {
        assert_eq!(int(5).invert().unwrap(), int(-6));
        assert_eq!(int(-1).invert().unwrap(), IntValue::ZERO);
        assert_eq!(int(12).bitwise(int(10), |a, b| a & b).unwrap(), int(8));
        assert_eq!(int(-1).bitwise(int(255), |a, b| a & b).unwrap(), int(255));
    }

    #[test]
    fn test_ordering_and_display() {
        assert!(int(-3) < int(-2));
        assert!(int(-1) < IntValue::ZERO);
        assert_eq!(int(-42).to_string(), "-42");
        assert_eq!(IntValue::from(u128::MAX).to_string(), u128::MAX.to_string());
    }

    #[test]
    fn test_from_f64() {
        assert_eq!(IntValue::from_f64(4.0), Some(int(4)));
        assert_eq!(IntValue::from_f64(-2.0), Some(int(-2)));
        assert_eq!(IntValue::from_f64(4.5), None);
        assert_eq!(IntValue::from_f64(f64::NAN), None);
    }
}
