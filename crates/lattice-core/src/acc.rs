//! The accelerator: per-execution-unit capability bundle handed to kernels
//!
//! Each backend defines one concrete accelerator type holding one field per
//! capability (work division, grid-block index, block-thread index, atomics,
//! block sync, shared memory, warp, math). Kernels are generic over [`Acc`], so
//! one kernel source is monomorphized for every backend; there is no dynamic
//! dispatch.
//!
//! An accelerator value is built immediately before the kernel body runs on an
//! execution unit and dropped right after. It is never reused.

use crate::atomic::{self, AtomicOp, AtomicScalar, Atomics, Hierarchy};
use crate::idx::Idx;
use crate::math::{Intrinsic, Math};
use crate::shared::{BlockSharedMem, SharedCell};
use crate::sync::{BlockSync, SyncOp};
use crate::vec::Vector;
use crate::warp::Warp;
use crate::workdiv::origin::{Block, Grid};
use crate::workdiv::unit::{Blocks, Threads};
use crate::workdiv::{Span, WorkDiv};

/// Position of the executing block within the grid
pub trait GridBlockIdx<I: Idx, const D: usize> {
    fn grid_block_idx(&self) -> Vector<I, D>;
}

/// Position of the executing thread within its block
pub trait BlockThreadIdx<I: Idx, const D: usize> {
    fn block_thread_idx(&self) -> Vector<I, D>;
}

/// Index stored by value, for backends that know it when building the accelerator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdxMembers<I, const D: usize>(pub Vector<I, D>);

impl<I: Idx, const D: usize> GridBlockIdx<I, D> for IdxMembers<I, D> {
    fn grid_block_idx(&self) -> Vector<I, D> {
        self.0
    }
}

impl<I: Idx, const D: usize> BlockThreadIdx<I, D> for IdxMembers<I, D> {
    fn block_thread_idx(&self) -> Vector<I, D> {
        self.0
    }
}

/// Capability bundle of one execution unit.
pub trait Acc<I: Idx, const D: usize>: Sized {
    type WorkDiv: WorkDiv<I, D>;
    type GridBlockIdx: GridBlockIdx<I, D>;
    type BlockThreadIdx: BlockThreadIdx<I, D>;
    type Atomics: Atomics;
    type Sync: BlockSync;
    type Shared: BlockSharedMem;
    type Warp: Warp;
    type Math: Math + Intrinsic;

    fn work_division(&self) -> &Self::WorkDiv;
    fn grid_block_idx_provider(&self) -> &Self::GridBlockIdx;
    fn block_thread_idx_provider(&self) -> &Self::BlockThreadIdx;
    fn block_sync(&self) -> &Self::Sync;
    fn shared_mem(&self) -> &Self::Shared;
    fn warp(&self) -> &Self::Warp;
    fn math(&self) -> &Self::Math;

    /// Extent selected by an (origin, unit) pair
    fn work_div<O, U>(&self) -> Vector<I, D>
    where
        (O, U): Span,
    {
        self.work_division().work_div::<O, U>()
    }

    /// Index of this execution unit selected by an (origin, unit) pair
    fn idx<O, U>(&self) -> Vector<I, D>
    where
        (O, U): IdxSpan,
    {
        <(O, U) as IdxSpan>::idx(self)
    }

    fn sync_block_threads(&self) {
        self.block_sync().sync_block_threads()
    }

    fn sync_block_threads_predicate<P: SyncOp>(&self, predicate: bool) -> i32 {
        self.block_sync().sync_block_threads_predicate::<P>(predicate)
    }

    /// Apply `Op` to `target` at hierarchy scope `L`, returning the previous value
    fn atomic_op<Op, L, A>(&self, target: &A, operand: A::Value) -> A::Value
    where
        Op: AtomicOp<A>,
        L: Hierarchy,
        A: AtomicScalar,
    {
        atomic::atomic_op::<Self::Atomics, L, Op, A>(target, operand)
    }

    /// Compare-and-swap at hierarchy scope `L`, returning the previous value
    fn atomic_cas<L, A>(&self, target: &A, compare: A::Value, value: A::Value) -> A::Value
    where
        L: Hierarchy,
        A: AtomicScalar,
    {
        atomic::atomic_cas::<Self::Atomics, L, A>(target, compare, value)
    }

    fn declare_shared_var<T: Default + Send + Sync + 'static, const ID: usize>(&self) -> &T {
        self.shared_mem().declare_shared_var::<T, ID>()
    }

    fn block_shared_mem_dyn<T: bytemuck::Pod>(&self) -> &[SharedCell<T>] {
        self.shared_mem().block_shared_mem_dyn::<T>()
    }
}

mod sealed {
    pub trait Sealed {}
}

/// (origin, unit) pairs that name an index of an execution unit.
pub trait IdxSpan: sealed::Sealed {
    fn idx<I: Idx, const D: usize, A: Acc<I, D>>(acc: &A) -> Vector<I, D>;
}

impl sealed::Sealed for (Grid, Blocks) {}
impl sealed::Sealed for (Block, Threads) {}
impl sealed::Sealed for (Grid, Threads) {}

impl IdxSpan for (Grid, Blocks) {
    fn idx<I: Idx, const D: usize, A: Acc<I, D>>(acc: &A) -> Vector<I, D> {
        acc.grid_block_idx_provider().grid_block_idx()
    }
}

impl IdxSpan for (Block, Threads) {
    fn idx<I: Idx, const D: usize, A: Acc<I, D>>(acc: &A) -> Vector<I, D> {
        acc.block_thread_idx_provider().block_thread_idx()
    }
}

impl IdxSpan for (Grid, Threads) {
    fn idx<I: Idx, const D: usize, A: Acc<I, D>>(acc: &A) -> Vector<I, D> {
        let block = acc.grid_block_idx_provider().grid_block_idx();
        let thread = acc.block_thread_idx_provider().block_thread_idx();
        block * acc.work_division().block_thread_extent() + thread
    }
}
