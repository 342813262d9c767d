//! Fixed-size, compile-time dimensioned index and extent vectors
//!
//! Component `D - 1` is the fastest-varying ("x") coordinate. Linearization is
//! row-major with the last component innermost, matching the pitch layout used by
//! buffers and accessors.
//!
//! # Example
//!
//! ```rust
//! use lattice_core::Vector;
//!
//! let extent = Vector::new([2u32, 3, 4]);
//! assert_eq!(extent.prod(), 24);
//! assert_eq!(extent.reverse(), Vector::new([4, 3, 2]));
//!
//! let idx = Vector::new([1u32, 2, 3]);
//! let linear = idx.linearize(&extent);
//! assert_eq!(linear, 23);
//! assert_eq!(Vector::from_linear(linear, &extent), idx);
//! ```

use crate::idx::Idx;
use std::fmt;
use std::ops::{Add, Index, IndexMut, Mul, Sub};

/// Dimension-generic vector of `D` index components.
///
/// Always fully constructed; there is no implicit zero or default value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Vector<I, const D: usize>([I; D]);

/// Vector used as a size along each dimension
pub type Extent<I, const D: usize> = Vector<I, D>;

/// Vector used as a position within an extent
pub type Position<I, const D: usize> = Vector<I, D>;

struct DimCheck<const D: usize>;

impl<const D: usize> DimCheck<D> {
    const VALID: () = assert!(D >= 1 && D <= 3, "lattice vectors have 1, 2 or 3 dimensions");
}

struct SubDimCheck<const N: usize, const D: usize>;

impl<const N: usize, const D: usize> SubDimCheck<N, D> {
    const VALID: () = assert!(N <= D, "sub-vector cannot be longer than its source");
}

impl<I: Idx, const D: usize> Vector<I, D> {
    /// Number of components
    pub const DIM: usize = D;

    /// Create a vector from its components
    pub fn new(values: [I; D]) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = DimCheck::<D>::VALID;
        Self(values)
    }

    /// Vector with every component set to `value`
    pub fn all(value: I) -> Self {
        Self::new([value; D])
    }

    /// Vector of zeros
    pub fn zeros() -> Self {
        Self::all(I::zero())
    }

    /// Vector of ones
    pub fn ones() -> Self {
        Self::all(I::one())
    }

    /// Build a vector by evaluating `f` for each component index
    pub fn from_fn(f: impl FnMut(usize) -> I) -> Self {
        Self::new(std::array::from_fn(f))
    }

    pub fn as_array(&self) -> &[I; D] {
        &self.0
    }

    pub fn into_array(self) -> [I; D] {
        self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = I> + '_ {
        self.0.iter().copied()
    }

    /// Product of all components
    pub fn prod(&self) -> I {
        self.0.iter().fold(I::one(), |acc, &v| acc * v)
    }

    /// Sum of all components
    pub fn sum(&self) -> I {
        self.0.iter().fold(I::zero(), |acc, &v| acc + v)
    }

    /// Smallest component
    pub fn min(&self) -> I {
        self.0.iter().fold(self.0[0], |acc, &v| acc.min(v))
    }

    /// Largest component
    pub fn max(&self) -> I {
        self.0.iter().fold(self.0[0], |acc, &v| acc.max(v))
    }

    /// Index of the first smallest component
    pub fn min_elem(&self) -> usize {
        (1..D).fold(0, |best, i| if self.0[i] < self.0[best] { i } else { best })
    }

    /// Index of the first largest component
    pub fn max_elem(&self) -> usize {
        (1..D).fold(0, |best, i| if self.0[i] > self.0[best] { i } else { best })
    }

    /// Select components by index.
    ///
    /// # Panics
    ///
    /// Panics if any entry of `indices` is `>= D`.
    pub fn sub_vec<const N: usize>(&self, indices: [usize; N]) -> Vector<I, N> {
        Vector::new(indices.map(|i| self.0[i]))
    }

    /// The leading `N` components
    pub fn sub_vec_begin<const N: usize>(&self) -> Vector<I, N> {
        #[allow(clippy::let_unit_value)]
        let () = SubDimCheck::<N, D>::VALID;
        Vector::from_fn(|i| self.0[i])
    }

    /// The trailing `N` components
    pub fn sub_vec_end<const N: usize>(&self) -> Vector<I, N> {
        #[allow(clippy::let_unit_value)]
        let () = SubDimCheck::<N, D>::VALID;
        Vector::from_fn(|i| self.0[D - N + i])
    }

    /// Components in reverse order
    pub fn reverse(&self) -> Self {
        let mut values = self.0;
        values.reverse();
        Self(values)
    }

    /// Saturating element-wise conversion to another index type
    pub fn cast<J: Idx>(&self) -> Vector<J, D> {
        Vector::new(self.0.map(|v| v.cast_to::<J>()))
    }

    pub fn map<J: Idx>(&self, f: impl FnMut(I) -> J) -> Vector<J, D> {
        Vector::new(self.0.map(f))
    }

    pub fn zip_with(&self, other: &Self, mut f: impl FnMut(I, I) -> I) -> Self {
        Self::from_fn(|i| f(self.0[i], other.0[i]))
    }

    /// True when every component is strictly positive
    pub fn is_positive(&self) -> bool {
        self.0.iter().all(|&v| v > I::zero())
    }

    /// True when every component is strictly below the matching component of `extent`
    pub fn is_within(&self, extent: &Self) -> bool {
        self.0.iter().zip(extent.0.iter()).all(|(&v, &e)| v >= I::zero() && v < e)
    }

    /// Row-major linear offset of this position inside `extent`
    pub fn linearize(&self, extent: &Self) -> I {
        (0..D).fold(I::zero(), |acc, k| acc * extent.0[k] + self.0[k])
    }

    /// Inverse of [`Vector::linearize`]
    pub fn from_linear(linear: I, extent: &Self) -> Self {
        let mut values = [I::zero(); D];
        let mut rest = linear;
        for k in (0..D).rev() {
            let e = extent.0[k];
            if e > I::zero() {
                values[k] = rest % e;
                rest = rest / e;
            }
        }
        Self::new(values)
    }

    /// Every position inside `extent` in row-major order
    pub fn ndrange(extent: Self) -> impl Iterator<Item = Self> {
        let count = if extent.is_positive() { extent.prod().as_usize() } else { 0 };
        (0..count).map(move |linear| Self::from_linear(I::from_usize_saturating(linear), &extent))
    }
}

impl<I: Idx> From<I> for Vector<I, 1> {
    fn from(value: I) -> Self {
        Self::new([value])
    }
}

impl<I: Idx, const D: usize> From<[I; D]> for Vector<I, D> {
    fn from(values: [I; D]) -> Self {
        Self::new(values)
    }
}

impl<I, const D: usize> Index<usize> for Vector<I, D> {
    type Output = I;

    fn index(&self, index: usize) -> &I {
        &self.0[index]
    }
}

impl<I, const D: usize> IndexMut<usize> for Vector<I, D> {
    fn index_mut(&mut self, index: usize) -> &mut I {
        &mut self.0[index]
    }
}

macro_rules! impl_elementwise {
    ($trait:ident, $method:ident, $op:tt) => {
        impl<I: Idx, const D: usize> $trait for Vector<I, D> {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self {
                Self::from_fn(|i| self.0[i] $op rhs.0[i])
            }
        }
    };
}

impl_elementwise!(Add, add, +);
impl_elementwise!(Sub, sub, -);
impl_elementwise!(Mul, mul, *);

impl<I: fmt::Debug, const D: usize> fmt::Debug for Vector<I, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tuple = f.debug_tuple("Vector");
        for v in &self.0 {
            tuple.field(v);
        }
        tuple.finish()
    }
}

impl<I: fmt::Display, const D: usize> fmt::Display for Vector<I, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_factories() {
        assert_eq!(Vector::<u32, 3>::zeros(), Vector::new([0, 0, 0]));
        assert_eq!(Vector::<u32, 2>::ones(), Vector::new([1, 1]));
        assert_eq!(Vector::<i64, 1>::all(9), Vector::from(9i64));
    }

    #[test]
    fn test_reductions() {
        let v = Vector::new([4u32, 1, 7]);
        assert_eq!(v.prod(), 28);
        assert_eq!(v.sum(), 12);
        assert_eq!(v.min(), 1);
        assert_eq!(v.max(), 7);
        assert_eq!(v.min_elem(), 1);
        assert_eq!(v.max_elem(), 2);
    }

    #[test]
    fn test_arg_extrema_pick_first_occurrence() {
        let v = Vector::new([3u8, 3, 3]);
        assert_eq!(v.min_elem(), 0);
        assert_eq!(v.max_elem(), 0);
    }

    #[test]
    fn test_sub_vectors() {
        let v = Vector::new([10u32, 20, 30]);
        assert_eq!(v.sub_vec([2, 0]), Vector::new([30, 10]));
        assert_eq!(v.sub_vec_begin::<2>(), Vector::new([10, 20]));
        assert_eq!(v.sub_vec_end::<1>(), Vector::new([30]));
    }

    #[test]
    #[should_panic]
    fn test_sub_vec_rejects_bad_index() {
        let v = Vector::new([1u32, 2]);
        let _ = v.sub_vec([2]);
    }

    #[test]
    fn test_elementwise_ops() {
        let a = Vector::new([1u32, 2]);
        let b = Vector::new([3u32, 4]);
        assert_eq!(a + b, Vector::new([4, 6]));
        assert_eq!(a * b, Vector::new([3, 8]));
        assert_eq!(b - a, Vector::new([2, 2]));
    }

    #[test]
    fn test_cast_saturates() {
        let v = Vector::new([300u32, 5]);
        assert_eq!(v.cast::<u8>(), Vector::new([255u8, 5]));
    }

    #[test]
    fn test_display_and_debug() {
        let v = Vector::new([1u32, 2, 3]);
        assert_eq!(v.to_string(), "(1, 2, 3)");
        assert_eq!(format!("{v:?}"), "Vector(1, 2, 3)");
    }

    #[test]
    fn test_ndrange_order() {
        let all: Vec<_> = Vector::ndrange(Vector::new([2u32, 2])).collect();
        assert_eq!(
            all,
            vec![
                Vector::new([0, 0]),
                Vector::new([0, 1]),
                Vector::new([1, 0]),
                Vector::new([1, 1])
            ]
        );
        assert_eq!(Vector::ndrange(Vector::new([0u32, 5])).count(), 0);
    }

    proptest! {
        #[test]
        fn prop_linearize_round_trip(ez in 1u32..6, ey in 1u32..6, ex in 1u32..6, seed in 0u32..1000) {
            let extent = Vector::new([ez, ey, ex]);
            let linear = seed % extent.prod();
            let pos = Vector::from_linear(linear, &extent);
            prop_assert!(pos.is_within(&extent));
            prop_assert_eq!(pos.linearize(&extent), linear);
        }

        #[test]
        fn prop_reverse_is_involution(a in any::<u16>(), b in any::<u16>(), c in any::<u16>()) {
            let v = Vector::new([a, b, c]);
            prop_assert_eq!(v.reverse().reverse(), v);
            prop_assert_eq!(v.reverse()[0], c);
        }
    }
}
