//! Rounded division for the signed integers used in bound computations.
//!
//! Call these through the trait (`<i64 as NumExt>::div_floor(a, b)`); the inherent methods of the
//! same name on the primitive types are unstable.

use num::Integer;

pub(crate) trait NumExt: Sized {
    /// Division rounding towards positive infinity.
    fn div_ceil(self, other: Self) -> Self;

    /// Division rounding towards negative infinity, which differs from the truncating `/` for
    /// negative quotients.
    fn div_floor(self, other: Self) -> Self;
}

impl NumExt for i32 {
    fn div_ceil(self, other: Self) -> Self {
        let (quotient, remainder) = self.div_mod_floor(&other);
        if remainder == 0 {
            quotient
        } else {
            quotient + 1
        }
    }

    fn div_floor(self, other: Self) -> Self {
        Integer::div_floor(&self, &other)
    }
}

impl NumExt for i64 {
    fn div_ceil(self, other: Self) -> Self {
        let (quotient, remainder) = self.div_mod_floor(&other);
        if remainder == 0 {
            quotient
        } else {
            quotient + 1
        }
    }

    fn div_floor(self, other: Self) -> Self {
        Integer::div_floor(&self, &other)
    }
}

/// Converts a bound computed in 64-bit arithmetic back to the domain range; values beyond the
/// range are saturated, which turns them into either no-ops or empty domains.
pub(crate) fn clamp_to_i32(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}
