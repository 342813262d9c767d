//! Atomic operations and hierarchy scopes
//!
//! Every operation returns the value held before the operation. Operations are
//! applied to atomic storage types (`AtomicU32`, [`AtomicF32`], ...) through an
//! accelerator's atomic capability, which picks an implementation per hierarchy
//! level:
//!
//! - [`hierarchy::Grids`]: visible to every thread of the grid
//! - [`hierarchy::Blocks`]: visible to every thread of the block
//! - [`hierarchy::Threads`]: visible to the calling thread only
//!
//! A backend that guarantees no concurrent access at some level composes
//! [`UncontendedAtomic`] there and [`NativeAtomic`] elsewhere.
//!
//! # Semantics
//!
//! | Op | New value |
//! |----|-----------|
//! | [`Add`] / [`Sub`] | `old + v` / `old - v` (integers wrap) |
//! | [`Min`] / [`Max`] | `min(old, v)` / `max(old, v)` |
//! | [`Exch`] | `v` |
//! | [`And`] / [`Or`] / [`Xor`] | bitwise |
//! | [`Inc`] | `if old >= v { 0 } else { old + 1 }` |
//! | [`Dec`] | `if old == 0 \|\| old > v { v } else { old - 1 }` |
//!
//! Compare-and-swap ([`AtomicImpl::cas`]) takes `compare` by value and returns
//! the previous value whether or not the exchange happened.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicIsize, AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Ordering usable for the load side of a read-modify-write with `order`
pub fn failure_ordering(order: Ordering) -> Ordering {
    match order {
        Ordering::Release => Ordering::Relaxed,
        Ordering::AcqRel => Ordering::Acquire,
        other => other,
    }
}

// ================================================================================================
// Atomic storage
// ================================================================================================

/// Atomic storage usable as the target of an atomic operation.
pub trait AtomicScalar: Send + Sync {
    type Value: Copy + PartialEq + PartialOrd + fmt::Debug + Send + Sync + 'static;

    fn load(&self, order: Ordering) -> Self::Value;
    fn store(&self, value: Self::Value, order: Ordering);
    fn swap(&self, value: Self::Value, order: Ordering) -> Self::Value;
    fn compare_exchange(
        &self,
        current: Self::Value,
        new: Self::Value,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Self::Value, Self::Value>;
    fn fetch_add(&self, value: Self::Value, order: Ordering) -> Self::Value;
    fn fetch_sub(&self, value: Self::Value, order: Ordering) -> Self::Value;
    fn fetch_min(&self, value: Self::Value, order: Ordering) -> Self::Value;
    fn fetch_max(&self, value: Self::Value, order: Ordering) -> Self::Value;

    fn add_value(a: Self::Value, b: Self::Value) -> Self::Value;
    fn sub_value(a: Self::Value, b: Self::Value) -> Self::Value;
}

/// Integer atomic storage: bitwise and wrapping counter operations.
pub trait AtomicInteger: AtomicScalar {
    fn fetch_and(&self, value: Self::Value, order: Ordering) -> Self::Value;
    fn fetch_or(&self, value: Self::Value, order: Ordering) -> Self::Value;
    fn fetch_xor(&self, value: Self::Value, order: Ordering) -> Self::Value;

    fn and_value(a: Self::Value, b: Self::Value) -> Self::Value;
    fn or_value(a: Self::Value, b: Self::Value) -> Self::Value;
    fn xor_value(a: Self::Value, b: Self::Value) -> Self::Value;
    fn inc_value(old: Self::Value, limit: Self::Value) -> Self::Value;
    fn dec_value(old: Self::Value, limit: Self::Value) -> Self::Value;
}

fn cas_loop<A: AtomicScalar>(target: &A, order: Ordering, f: impl Fn(A::Value) -> A::Value) -> A::Value {
    let failure = failure_ordering(order);
    let mut old = target.load(failure);
    loop {
        match target.compare_exchange(old, f(old), order, failure) {
            Ok(prev) => return prev,
            Err(actual) => old = actual,
        }
    }
}

macro_rules! impl_atomic_integer {
    ($($atomic:ident => $value:ty),* $(,)?) => {
        $(
            impl AtomicScalar for $atomic {
                type Value = $value;

                fn load(&self, order: Ordering) -> $value {
                    $atomic::load(self, order)
                }

                fn store(&self, value: $value, order: Ordering) {
                    $atomic::store(self, value, order)
                }

                fn swap(&self, value: $value, order: Ordering) -> $value {
                    $atomic::swap(self, value, order)
                }

                fn compare_exchange(
                    &self,
                    current: $value,
                    new: $value,
                    success: Ordering,
                    failure: Ordering,
                ) -> Result<$value, $value> {
                    $atomic::compare_exchange(self, current, new, success, failure)
                }

                fn fetch_add(&self, value: $value, order: Ordering) -> $value {
                    $atomic::fetch_add(self, value, order)
                }

                fn fetch_sub(&self, value: $value, order: Ordering) -> $value {
                    $atomic::fetch_sub(self, value, order)
                }

                fn fetch_min(&self, value: $value, order: Ordering) -> $value {
                    $atomic::fetch_min(self, value, order)
                }

                fn fetch_max(&self, value: $value, order: Ordering) -> $value {
                    $atomic::fetch_max(self, value, order)
                }

                fn add_value(a: $value, b: $value) -> $value {
                    a.wrapping_add(b)
                }

                fn sub_value(a: $value, b: $value) -> $value {
                    a.wrapping_sub(b)
                }
            }

            impl AtomicInteger for $atomic {
                fn fetch_and(&self, value: $value, order: Ordering) -> $value {
                    $atomic::fetch_and(self, value, order)
                }

                fn fetch_or(&self, value: $value, order: Ordering) -> $value {
                    $atomic::fetch_or(self, value, order)
                }

                fn fetch_xor(&self, value: $value, order: Ordering) -> $value {
                    $atomic::fetch_xor(self, value, order)
                }

                fn and_value(a: $value, b: $value) -> $value {
                    a & b
                }

                fn or_value(a: $value, b: $value) -> $value {
                    a | b
                }

                fn xor_value(a: $value, b: $value) -> $value {
                    a ^ b
                }

                fn inc_value(old: $value, limit: $value) -> $value {
                    if old >= limit { 0 } else { old + 1 }
                }

                fn dec_value(old: $value, limit: $value) -> $value {
                    if old == 0 || old > limit { limit } else { old.wrapping_sub(1) }
                }
            }
        )*
    };
}

impl_atomic_integer!(
    AtomicU32 => u32,
    AtomicI32 => i32,
    AtomicU64 => u64,
    AtomicI64 => i64,
    AtomicUsize => usize,
    AtomicIsize => isize,
);

macro_rules! atomic_float {
    ($(#[$meta:meta])* $name:ident, $float:ty, $bits:ident) => {
        $(#[$meta])*
        #[derive(Default)]
        pub struct $name {
            bits: $bits,
        }

        impl $name {
            pub fn new(value: $float) -> Self {
                Self { bits: $bits::new(value.to_bits()) }
            }

            pub fn into_inner(self) -> $float {
                <$float>::from_bits(self.bits.into_inner())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name))
                    .field(&<$float>::from_bits(self.bits.load(Ordering::Relaxed)))
                    .finish()
            }
        }

        impl AtomicScalar for $name {
            type Value = $float;

            fn load(&self, order: Ordering) -> $float {
                <$float>::from_bits(self.bits.load(order))
            }

            fn store(&self, value: $float, order: Ordering) {
                self.bits.store(value.to_bits(), order)
            }

            fn swap(&self, value: $float, order: Ordering) -> $float {
                <$float>::from_bits(self.bits.swap(value.to_bits(), order))
            }

            fn compare_exchange(
                &self,
                current: $float,
                new: $float,
                success: Ordering,
                failure: Ordering,
            ) -> Result<$float, $float> {
                self.bits
                    .compare_exchange(current.to_bits(), new.to_bits(), success, failure)
                    .map(<$float>::from_bits)
                    .map_err(<$float>::from_bits)
            }

            fn fetch_add(&self, value: $float, order: Ordering) -> $float {
                cas_loop(self, order, |old| old + value)
            }

            fn fetch_sub(&self, value: $float, order: Ordering) -> $float {
                cas_loop(self, order, |old| old - value)
            }

            fn fetch_min(&self, value: $float, order: Ordering) -> $float {
                cas_loop(self, order, |old| old.min(value))
            }

            fn fetch_max(&self, value: $float, order: Ordering) -> $float {
                cas_loop(self, order, |old| old.max(value))
            }

            fn add_value(a: $float, b: $float) -> $float {
                a + b
            }

            fn sub_value(a: $float, b: $float) -> $float {
                a - b
            }
        }
    };
}

atomic_float!(
    /// `f32` stored as its bit pattern in an `AtomicU32`
    AtomicF32,
    f32,
    AtomicU32
);
atomic_float!(
    /// `f64` stored as its bit pattern in an `AtomicU64`
    AtomicF64,
    f64,
    AtomicU64
);

// ================================================================================================
// Operations
// ================================================================================================

/// A read-modify-write operation on atomic storage `A`.
pub trait AtomicOp<A: AtomicScalar> {
    /// Value written back for a given previous value and operand
    fn combine(old: A::Value, operand: A::Value) -> A::Value;

    /// Apply atomically, returning the previous value
    fn fetch(target: &A, operand: A::Value, order: Ordering) -> A::Value {
        cas_loop(target, order, |old| Self::combine(old, operand))
    }
}

macro_rules! atomic_ops {
    ($($(#[$meta:meta])* $op:ident: $bound:ident, combine($old:ident, $v:ident) = $combine:expr, fetch($t:ident, $o:ident) = $fetch:expr;)*) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, Debug, Default)]
            pub struct $op;

            impl<A: $bound> AtomicOp<A> for $op {
                fn combine($old: A::Value, $v: A::Value) -> A::Value {
                    $combine
                }

                fn fetch($t: &A, $v: A::Value, $o: Ordering) -> A::Value {
                    $fetch
                }
            }
        )*
    };
}

atomic_ops! {
    /// `old + v`
    Add: AtomicScalar, combine(old, v) = A::add_value(old, v), fetch(t, o) = t.fetch_add(v, o);
    /// `old - v`
    Sub: AtomicScalar, combine(old, v) = A::sub_value(old, v), fetch(t, o) = t.fetch_sub(v, o);
    /// `min(old, v)`
    Min: AtomicScalar, combine(old, v) = if v < old { v } else { old }, fetch(t, o) = t.fetch_min(v, o);
    /// `max(old, v)`
    Max: AtomicScalar, combine(old, v) = if v > old { v } else { old }, fetch(t, o) = t.fetch_max(v, o);
    /// Exchange
    Exch: AtomicScalar, combine(_old, v) = v, fetch(t, o) = t.swap(v, o);
    /// Bitwise and
    And: AtomicInteger, combine(old, v) = A::and_value(old, v), fetch(t, o) = t.fetch_and(v, o);
    /// Bitwise or
    Or: AtomicInteger, combine(old, v) = A::or_value(old, v), fetch(t, o) = t.fetch_or(v, o);
    /// Bitwise xor
    Xor: AtomicInteger, combine(old, v) = A::xor_value(old, v), fetch(t, o) = t.fetch_xor(v, o);
}

/// Wrapping increment: `if old >= v { 0 } else { old + 1 }`
#[derive(Clone, Copy, Debug, Default)]
pub struct Inc;

impl<A: AtomicInteger> AtomicOp<A> for Inc {
    fn combine(old: A::Value, limit: A::Value) -> A::Value {
        A::inc_value(old, limit)
    }
}

/// Wrapping decrement: `if old == 0 || old > v { v } else { old - 1 }`
#[derive(Clone, Copy, Debug, Default)]
pub struct Dec;

impl<A: AtomicInteger> AtomicOp<A> for Dec {
    fn combine(old: A::Value, limit: A::Value) -> A::Value {
        A::dec_value(old, limit)
    }
}

// ================================================================================================
// Implementations and hierarchy
// ================================================================================================

/// Strategy used to carry out atomic operations at one hierarchy level.
pub trait AtomicImpl: Send + Sync + 'static {
    fn op<Op: AtomicOp<A>, A: AtomicScalar>(target: &A, operand: A::Value, order: Ordering) -> A::Value;

    fn cas<A: AtomicScalar>(target: &A, compare: A::Value, value: A::Value, order: Ordering) -> A::Value;
}

/// Hardware read-modify-write
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeAtomic;

impl AtomicImpl for NativeAtomic {
    fn op<Op: AtomicOp<A>, A: AtomicScalar>(target: &A, operand: A::Value, order: Ordering) -> A::Value {
        Op::fetch(target, operand, order)
    }

    fn cas<A: AtomicScalar>(target: &A, compare: A::Value, value: A::Value, order: Ordering) -> A::Value {
        match target.compare_exchange(compare, value, order, failure_ordering(order)) {
            Ok(prev) | Err(prev) => prev,
        }
    }
}

/// Relaxed load then store.
///
/// Only correct where the backend guarantees a single execution unit touches
/// the location at this level (one thread per block, sequential blocks).
#[derive(Clone, Copy, Debug, Default)]
pub struct UncontendedAtomic;

impl AtomicImpl for UncontendedAtomic {
    fn op<Op: AtomicOp<A>, A: AtomicScalar>(target: &A, operand: A::Value, _order: Ordering) -> A::Value {
        let old = target.load(Ordering::Relaxed);
        target.store(Op::combine(old, operand), Ordering::Relaxed);
        old
    }

    fn cas<A: AtomicScalar>(target: &A, compare: A::Value, value: A::Value, _order: Ordering) -> A::Value {
        let old = target.load(Ordering::Relaxed);
        if old == compare {
            target.store(value, Ordering::Relaxed);
        }
        old
    }
}

/// The three per-level implementations of an accelerator.
pub trait Atomics: Send + Sync + 'static {
    type Grid: AtomicImpl;
    type Block: AtomicImpl;
    type Thread: AtomicImpl;
}

/// Compose one implementation per level
pub struct AtomicHierarchy<G, B, T>(PhantomData<fn() -> (G, B, T)>);

impl<G: AtomicImpl, B: AtomicImpl, T: AtomicImpl> Atomics for AtomicHierarchy<G, B, T> {
    type Grid = G;
    type Block = B;
    type Thread = T;
}

/// Hierarchy scope tags
pub mod hierarchy {
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Grids;
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Blocks;
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Threads;
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::hierarchy::Grids {}
    impl Sealed for super::hierarchy::Blocks {}
    impl Sealed for super::hierarchy::Threads {}
}

/// A hierarchy scope: selects the level implementation and memory ordering.
pub trait Hierarchy: sealed::Sealed {
    const ORDERING: Ordering;
    type Impl<H: Atomics>: AtomicImpl;
}

impl Hierarchy for hierarchy::Grids {
    const ORDERING: Ordering = Ordering::AcqRel;
    type Impl<H: Atomics> = H::Grid;
}

impl Hierarchy for hierarchy::Blocks {
    const ORDERING: Ordering = Ordering::AcqRel;
    type Impl<H: Atomics> = H::Block;
}

impl Hierarchy for hierarchy::Threads {
    const ORDERING: Ordering = Ordering::Relaxed;
    type Impl<H: Atomics> = H::Thread;
}

/// Apply `Op` at scope `L` using the level implementations of `H`.
pub fn atomic_op<H, L, Op, A>(target: &A, operand: A::Value) -> A::Value
where
    H: Atomics,
    L: Hierarchy,
    A: AtomicScalar,
    Op: AtomicOp<A>,
{
    <L::Impl<H> as AtomicImpl>::op::<Op, A>(target, operand, L::ORDERING)
}

/// Compare-and-swap at scope `L` using the level implementations of `H`.
pub fn atomic_cas<H, L, A>(target: &A, compare: A::Value, value: A::Value) -> A::Value
where
    H: Atomics,
    L: Hierarchy,
    A: AtomicScalar,
{
    <L::Impl<H> as AtomicImpl>::cas::<A>(target, compare, value, L::ORDERING)
}
