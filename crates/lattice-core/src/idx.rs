//! Integer type used for all coordinates and extents

use num_traits::{NumCast, PrimInt};
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Coordinate/extent element type.
///
/// Every primitive integer qualifies. One launch uses a single `Idx` type for its
/// work division, task, accelerator and vectors.
pub trait Idx: PrimInt + Hash + Debug + Display + Default + Send + Sync + 'static {
    /// Converts to `usize`, clamping negatives to zero and overflow to `usize::MAX`.
    fn as_usize(self) -> usize {
        if self < Self::zero() {
            0
        } else {
            self.to_usize().unwrap_or(usize::MAX)
        }
    }

    /// Converts from `usize`, saturating at `Self::max_value()`.
    fn from_usize_saturating(value: usize) -> Self {
        <Self as NumCast>::from(value).unwrap_or_else(Self::max_value)
    }

    /// Saturating numeric conversion between index types.
    fn cast_to<J: Idx>(self) -> J {
        if self < Self::zero() {
            <J as NumCast>::from(self).unwrap_or_else(J::min_value)
        } else {
            <J as NumCast>::from(self).unwrap_or_else(J::max_value)
        }
    }
}

impl<T> Idx for T where T: PrimInt + Hash + Debug + Display + Default + Send + Sync + 'static {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_usize_clamps() {
        assert_eq!((-3i32).as_usize(), 0);
        assert_eq!(17u16.as_usize(), 17);
        assert_eq!(u64::MAX.as_usize(), usize::MAX);
    }

    #[test]
    fn test_from_usize_saturates() {
        assert_eq!(u8::from_usize_saturating(300), u8::MAX);
        assert_eq!(u32::from_usize_saturating(12), 12);
    }

    #[test]
    fn test_cast_to_saturates_both_ways() {
        assert_eq!(1000u32.cast_to::<u8>(), u8::MAX);
        assert_eq!((-5i64).cast_to::<u32>(), 0);
        assert_eq!((-5i64).cast_to::<i8>(), -5);
    }
}
