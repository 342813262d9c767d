//! Host runtime primitives shared by the CPU and command-group backends

pub mod barrier;
pub(crate) mod block;
pub mod event;
pub mod registry;
pub mod shared_st;
pub mod worker;

pub use barrier::BlockBarrier;
pub use event::NativeEvent;
pub use registry::{QueueRegistry, Registration};
pub use shared_st::{BlockShared, BlockSharedMemSt, SHARED_VAR_SLOTS};
pub use worker::InOrderWorker;
