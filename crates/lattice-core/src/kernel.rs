//! Kernel functions
//!
//! A kernel is a value whose `call` is generic over the accelerator, so the same
//! source runs on every backend:
//!
//! ```rust
//! use lattice_core::workdiv::{origin::Grid, unit::Threads};
//! use lattice_core::{Acc, Kernel};
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::sync::Arc;
//!
//! struct CountThreads;
//!
//! impl Kernel<u32, 1, Arc<AtomicU32>> for CountThreads {
//!     fn call<A: Acc<u32, 1>>(&self, acc: &A, counter: &Arc<AtomicU32>) {
//!         let _global = acc.idx::<Grid, Threads>()[0];
//!         counter.fetch_add(1, Ordering::Relaxed);
//!     }
//! }
//! ```

use crate::acc::Acc;
use crate::idx::Idx;
use crate::vec::Vector;

/// A kernel invocable on any accelerator of dimension `D` with index type `I`.
pub trait Kernel<I: Idx, const D: usize, Args = ()>: Send + Sync {
    /// Kernel body, run once per execution unit
    fn call<A: Acc<I, D>>(&self, acc: &A, args: &Args);

    /// Dynamic block shared memory the kernel needs.
    ///
    /// Queried once before launch; the same size applies to every block.
    fn block_shared_mem_dyn_size_bytes(
        &self,
        _block_thread_extent: &Vector<I, D>,
        _thread_elem_extent: &Vector<I, D>,
        _args: &Args,
    ) -> usize {
        0
    }
}
