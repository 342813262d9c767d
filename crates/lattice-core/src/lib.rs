//! Backend-independent contracts of the lattice accelerator model
//!
//! This crate provides:
//! - **Vectors**: compile-time dimensioned indices and extents ([`Vector`])
//! - **Work division**: the grid / block / thread-element hierarchy ([`workdiv`])
//! - **Accelerator**: the capability bundle kernels receive ([`Acc`])
//! - **Atomics**: fetch-and-op semantics scoped by hierarchy level ([`atomic`])
//! - **Queues**: submission, event and device contracts ([`queue`])
//!
//! Backends live in `lattice-backends`.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │        Kernel::call<A: Acc<I, D>>(&self, acc, args)        │
//! └─────────────────────────────┬─────────────────────────────┘
//!                               │ one instance per execution unit
//!                               ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │  Acc = { work div, grid idx, block idx, atomics, sync,     │
//! │          shared memory, warp, math }                       │
//! └─────────────────────────────┬─────────────────────────────┘
//!         ┌──────────────┬──────┴───────┬──────────────┐
//!         ▼              ▼              ▼              ▼
//!   ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//!   │ CpuSerial│   │CpuThreads│   │  Graph   │   │   CUDA   │
//!   └──────────┘   └──────────┘   └──────────┘   └──────────┘
//! ```

pub mod acc;
pub mod atomic;
pub mod error;
pub mod idx;
pub mod kernel;
pub mod math;
pub mod props;
pub mod queue;
pub mod shared;
pub mod sync;
pub mod vec;
pub mod warp;
pub mod workdiv;

pub use acc::{Acc, BlockThreadIdx, GridBlockIdx, IdxMembers, IdxSpan};
pub use atomic::{
    hierarchy, Add, And, AtomicF32, AtomicF64, AtomicHierarchy, AtomicImpl, AtomicInteger, AtomicOp, AtomicScalar,
    Atomics, Dec, Exch, Hierarchy, Inc, Max, Min, NativeAtomic, Or, Sub, UncontendedAtomic, Xor,
};
pub use error::{Error, Result};
pub use idx::Idx;
pub use kernel::Kernel;
pub use math::{Intrinsic, Math, MathStd};
pub use props::{AccDevProps, AccDevPropsOverride};
pub use queue::{
    current_thread_wait_for, enqueue, Device, Enqueue, Event, Platform, Queue, RecordEvent, Wait, WaiterWaitFor,
};
pub use shared::{BlockArray, BlockSharedMem, DynSharedMem, SharedCell};
pub use sync::{op as sync_op, BlockSync, BlockSyncNoOp, SyncOp};
pub use vec::{Extent, Position, Vector};
pub use warp::{Warp, WarpSingleThread};
pub use workdiv::{is_valid_work_div, suggest_work_div, validate_work_div, WorkDiv, WorkDivMembers};
