//! Math and bit intrinsics forwarded to the host implementation

use num_traits::{Float, PrimInt};

/// Evaluate a binary `f64` routine at the precision of `T`.
fn via_f64<T: Float>(f: impl FnOnce(f64, f64) -> f64, x: T, y: T) -> T {
    match (x.to_f64(), y.to_f64()) {
        (Some(x), Some(y)) => T::from(f(x, y)).unwrap_or_else(T::nan),
        _ => T::nan(),
    }
}

/// Floating point math capability.
///
/// Methods forward to [`num_traits::Float`], or to `libm` where `Float` has
/// no counterpart. Device backends override where the native library differs.
pub trait Math {
    fn abs<T: Float>(&self, x: T) -> T {
        x.abs()
    }

    fn sqrt<T: Float>(&self, x: T) -> T {
        x.sqrt()
    }

    fn rsqrt<T: Float>(&self, x: T) -> T {
        x.sqrt().recip()
    }

    fn cbrt<T: Float>(&self, x: T) -> T {
        x.cbrt()
    }

    fn exp<T: Float>(&self, x: T) -> T {
        x.exp()
    }

    fn log<T: Float>(&self, x: T) -> T {
        x.ln()
    }

    fn pow<T: Float>(&self, base: T, exp: T) -> T {
        base.powf(exp)
    }

    fn sin<T: Float>(&self, x: T) -> T {
        x.sin()
    }

    fn cos<T: Float>(&self, x: T) -> T {
        x.cos()
    }

    fn tan<T: Float>(&self, x: T) -> T {
        x.tan()
    }

    fn asin<T: Float>(&self, x: T) -> T {
        x.asin()
    }

    fn acos<T: Float>(&self, x: T) -> T {
        x.acos()
    }

    fn atan<T: Float>(&self, x: T) -> T {
        x.atan()
    }

    /// Gauss error function
    fn erf<T: Float>(&self, x: T) -> T {
        via_f64(|x, _| libm::erf(x), x, T::zero())
    }

    fn sincos<T: Float>(&self, x: T) -> (T, T) {
        x.sin_cos()
    }

    fn atan2<T: Float>(&self, y: T, x: T) -> T {
        y.atan2(x)
    }

    fn floor<T: Float>(&self, x: T) -> T {
        x.floor()
    }

    fn ceil<T: Float>(&self, x: T) -> T {
        x.ceil()
    }

    fn round<T: Float>(&self, x: T) -> T {
        x.round()
    }

    fn trunc<T: Float>(&self, x: T) -> T {
        x.trunc()
    }

    /// Truncated remainder; the result has the sign of `x`.
    fn fmod<T: Float>(&self, x: T, y: T) -> T {
        x % y
    }

    /// IEEE remainder: `x - n * y` with `n` the quotient rounded to nearest,
    /// ties to even.
    fn remainder<T: Float>(&self, x: T, y: T) -> T {
        via_f64(libm::remainder, x, y)
    }

    fn min<T: Float>(&self, a: T, b: T) -> T {
        a.min(b)
    }

    fn max<T: Float>(&self, a: T, b: T) -> T {
        a.max(b)
    }
}

/// Bit intrinsic capability
pub trait Intrinsic {
    /// Number of set bits
    fn popcount<T: PrimInt>(&self, value: T) -> u32 {
        value.count_ones()
    }

    /// 1-based position of the least significant set bit, 0 when `value == 0`
    fn ffs<T: PrimInt>(&self, value: T) -> u32 {
        if value.is_zero() {
            0
        } else {
            value.trailing_zeros() + 1
        }
    }
}

/// Host standard library math and intrinsics
#[derive(Clone, Copy, Debug, Default)]
pub struct MathStd;

impl Math for MathStd {}

impl Intrinsic for MathStd {}
