//! Block-level synchronization

use std::sync::atomic::{AtomicI32, Ordering};

/// Reductions for [`BlockSync::sync_block_threads_predicate`]
pub mod op {
    /// Number of threads whose predicate is true
    #[derive(Clone, Copy, Debug, Default)]
    pub struct BlockCount;
    /// 1 if every predicate is true, else 0
    #[derive(Clone, Copy, Debug, Default)]
    pub struct BlockAnd;
    /// 1 if any predicate is true, else 0
    #[derive(Clone, Copy, Debug, Default)]
    pub struct BlockOr;
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::op::BlockCount {}
    impl Sealed for super::op::BlockAnd {}
    impl Sealed for super::op::BlockOr {}
}

/// A block-wide boolean reduction.
pub trait SyncOp: sealed::Sealed + Send + Sync + 'static {
    /// Reduction identity
    const INIT: i32;

    /// Fold one predicate into a running value
    fn fold(acc: i32, predicate: bool) -> i32;

    /// Fold one predicate into a shared counter
    fn apply_atomic(counter: &AtomicI32, predicate: bool);
}

impl SyncOp for op::BlockCount {
    const INIT: i32 = 0;

    fn fold(acc: i32, predicate: bool) -> i32 {
        acc + i32::from(predicate)
    }

    fn apply_atomic(counter: &AtomicI32, predicate: bool) {
        if predicate {
            counter.fetch_add(1, Ordering::AcqRel);
        }
    }
}

impl SyncOp for op::BlockAnd {
    const INIT: i32 = 1;

    fn fold(acc: i32, predicate: bool) -> i32 {
        acc & i32::from(predicate)
    }

    fn apply_atomic(counter: &AtomicI32, predicate: bool) {
        if !predicate {
            counter.fetch_and(0, Ordering::AcqRel);
        }
    }
}

impl SyncOp for op::BlockOr {
    const INIT: i32 = 0;

    fn fold(acc: i32, predicate: bool) -> i32 {
        acc | i32::from(predicate)
    }

    fn apply_atomic(counter: &AtomicI32, predicate: bool) {
        if predicate {
            counter.fetch_or(1, Ordering::AcqRel);
        }
    }
}

/// Block synchronization capability of an accelerator.
///
/// Calling either method from only part of a block is undefined: the
/// participating threads may wait forever or observe a mixed reduction.
pub trait BlockSync {
    /// Wait until every thread of the block reaches this call
    fn sync_block_threads(&self);

    /// Barrier that also reduces one predicate per thread.
    ///
    /// Every thread of the block receives the same result.
    fn sync_block_threads_predicate<P: SyncOp>(&self, predicate: bool) -> i32;
}

/// Synchronization for blocks of exactly one thread
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockSyncNoOp;

impl BlockSync for BlockSyncNoOp {
    fn sync_block_threads(&self) {}

    fn sync_block_threads_predicate<P: SyncOp>(&self, predicate: bool) -> i32 {
        P::fold(P::INIT, predicate)
    }
}
