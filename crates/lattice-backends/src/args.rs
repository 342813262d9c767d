//! Kernel arguments
//!
//! Arguments are captured by value into deferred work, so every argument is an
//! owned `Clone + Send + Sync + 'static` value. Buffer access goes through
//! [`Accessor`]s, which declare the buffer they touch; everything else
//! (scalars, vectors, shared atomics behind an `Arc`) declares nothing.

use crate::mem::{AccessMode, Accessor, Requirements};
use bytemuck::Pod;
use lattice_core::{Idx, Vector};
use std::sync::Arc;

/// One kernel argument.
pub trait KernelArg: Clone + Send + Sync + 'static {
    /// Add the buffers this argument reads or writes
    fn declare(&self, _requirements: &mut Requirements) {}
}

/// The argument list of a kernel: a single [`KernelArg`] or a tuple of up to eight.
pub trait KernelArgs: Clone + Send + Sync + 'static {
    fn declare_all(&self, requirements: &mut Requirements);

    fn requirements(&self) -> Requirements {
        let mut requirements = Requirements::new();
        self.declare_all(&mut requirements);
        requirements
    }
}

impl<A: KernelArg> KernelArgs for A {
    fn declare_all(&self, requirements: &mut Requirements) {
        self.declare(requirements);
    }
}

macro_rules! plain_args {
    ($($ty:ty),* $(,)?) => {
        $(impl KernelArg for $ty {})*
    };
}

plain_args!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, bool, char, ());

impl<I: Idx, const D: usize> KernelArg for Vector<I, D> {}

impl<T: ?Sized + Send + Sync + 'static> KernelArg for Arc<T> {}

impl<A: KernelArg, const N: usize> KernelArg for [A; N] {
    fn declare(&self, requirements: &mut Requirements) {
        for arg in self {
            arg.declare(requirements);
        }
    }
}

impl<A: KernelArg> KernelArg for Option<A> {
    fn declare(&self, requirements: &mut Requirements) {
        if let Some(arg) = self {
            arg.declare(requirements);
        }
    }
}

impl<T, I, const D: usize, M> KernelArg for Accessor<T, I, D, M>
where
    T: Pod + Send + Sync,
    I: Idx,
    M: AccessMode,
{
    fn declare(&self, requirements: &mut Requirements) {
        requirements.require(self.tracker(), M::KIND);
    }
}

macro_rules! tuple_args {
    ($($name:ident),+) => {
        impl<$($name: KernelArg),+> KernelArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn declare_all(&self, requirements: &mut Requirements) {
                let ($($name,)+) = self;
                $($name.declare(requirements);)+
            }
        }
    };
}

tuple_args!(A1);
tuple_args!(A1, A2);
tuple_args!(A1, A2, A3);
tuple_args!(A1, A2, A3, A4);
tuple_args!(A1, A2, A3, A4, A5);
tuple_args!(A1, A2, A3, A4, A5, A6);
tuple_args!(A1, A2, A3, A4, A5, A6, A7);
tuple_args!(A1, A2, A3, A4, A5, A6, A7, A8);
