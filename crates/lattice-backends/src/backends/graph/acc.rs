//! Accelerator rebuilt from a work item
//!
//! Grid and block extents are read from the item on every query; the runtime
//! has no notion of elements per thread, so that extent is stored.

use super::native::NdItem;
use crate::runtime::BlockShared;
use lattice_core::{
    Acc, AtomicHierarchy, BlockSync, BlockThreadIdx, GridBlockIdx, Idx, MathStd, NativeAtomic, SyncOp,
    UncontendedAtomic, Vector, WarpSingleThread, WorkDiv,
};
use std::sync::atomic::Ordering;

/// Work division answered by the executing work item
#[derive(Clone, Copy, Debug)]
pub struct WorkDivGraph<'a, I, const D: usize> {
    item: &'a NdItem<'a, D>,
    thread_elem_extent: Vector<I, D>,
}

impl<I: Idx, const D: usize> WorkDiv<I, D> for WorkDivGraph<'_, I, D> {
    fn grid_block_extent(&self) -> Vector<I, D> {
        self.item.group_range().cast()
    }

    fn block_thread_extent(&self) -> Vector<I, D> {
        self.item.local_range().cast()
    }

    fn thread_elem_extent(&self) -> Vector<I, D> {
        self.thread_elem_extent
    }
}

/// Group and local ids of the executing work item
#[derive(Clone, Copy, Debug)]
pub struct ItemIdx<'a, const D: usize>(&'a NdItem<'a, D>);

impl<I: Idx, const D: usize> GridBlockIdx<I, D> for ItemIdx<'_, D> {
    fn grid_block_idx(&self) -> Vector<I, D> {
        self.0.group().cast()
    }
}

impl<I: Idx, const D: usize> BlockThreadIdx<I, D> for ItemIdx<'_, D> {
    fn block_thread_idx(&self) -> Vector<I, D> {
        self.0.local_id().cast()
    }
}

/// Group barrier plus a group-local counter for predicate reductions
#[derive(Clone, Copy, Debug)]
pub struct GroupSync<'a, const D: usize>(&'a NdItem<'a, D>);

impl<const D: usize> BlockSync for GroupSync<'_, D> {
    fn sync_block_threads(&self) {
        self.0.barrier();
    }

    fn sync_block_threads_predicate<P: SyncOp>(&self, predicate: bool) -> i32 {
        let counter = self.0.group_counter();
        // Readers of the previous reduction must be done before the reset.
        self.0.barrier();
        if self.0.local_linear_id() == 0 {
            counter.store(P::INIT, Ordering::Release);
        }
        self.0.barrier();
        P::apply_atomic(counter, predicate);
        self.0.barrier();
        counter.load(Ordering::Acquire)
    }
}

/// Atomics of the command-group accelerator
pub type AtomicsGraph = AtomicHierarchy<NativeAtomic, NativeAtomic, UncontendedAtomic>;

/// Accelerator of the command-group backend, one per work item.
#[derive(Debug)]
pub struct AccGraph<'a, I, const D: usize> {
    work_div: WorkDivGraph<'a, I, D>,
    idx: ItemIdx<'a, D>,
    sync: GroupSync<'a, D>,
    shared: BlockShared<'a>,
    warp: WarpSingleThread,
    math: MathStd,
}

impl<'a, I: Idx, const D: usize> AccGraph<'a, I, D> {
    pub(crate) fn new(item: &'a NdItem<'a, D>, thread_elem_extent: Vector<I, D>) -> Self {
        Self {
            work_div: WorkDivGraph {
                item,
                thread_elem_extent,
            },
            idx: ItemIdx(item),
            sync: GroupSync(item),
            shared: item.local_memory(),
            warp: WarpSingleThread,
            math: MathStd,
        }
    }
}

impl<'a, I: Idx, const D: usize> Acc<I, D> for AccGraph<'a, I, D> {
    type WorkDiv = WorkDivGraph<'a, I, D>;
    type GridBlockIdx = ItemIdx<'a, D>;
    type BlockThreadIdx = ItemIdx<'a, D>;
    type Atomics = AtomicsGraph;
    type Sync = GroupSync<'a, D>;
    type Shared = BlockShared<'a>;
    type Warp = WarpSingleThread;
    type Math = MathStd;

    fn work_division(&self) -> &Self::WorkDiv {
        &self.work_div
    }

    fn grid_block_idx_provider(&self) -> &Self::GridBlockIdx {
        &self.idx
    }

    fn block_thread_idx_provider(&self) -> &Self::BlockThreadIdx {
        &self.idx
    }

    fn block_sync(&self) -> &Self::Sync {
        &self.sync
    }

    fn shared_mem(&self) -> &Self::Shared {
        &self.shared
    }

    fn warp(&self) -> &WarpSingleThread {
        &self.warp
    }

    fn math(&self) -> &MathStd {
        &self.math
    }
}
