//! Backends of the lattice accelerator model
//!
//! This crate provides:
//! - **Host accelerators**: serial, thread-per-block-thread and block-parallel CPU execution
//! - **Command-group backend**: queues over a work-group runtime with event dependencies
//! - **CUDA**: device limits, launch translation and stream queues (feature `cuda`)
//! - **Memory**: host buffers, sub-views, accessors and copy/fill tasks
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │     Task = work division + kernel + arguments             │
//! └────────────────────────────┬─────────────────────────────┘
//!                              │ Enqueue::enqueue
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │   Queue (blocking / non-blocking)  ──records──►  Event    │
//! └────────────────────────────┬─────────────────────────────┘
//!         ┌────────────────────┼────────────────────┐
//!         ▼                    ▼                    ▼
//!   ┌───────────┐       ┌─────────────┐       ┌───────────┐
//!   │  DevCpu   │       │  DevGraph   │       │  DevCuda  │
//!   │ in-order  │       │ native queue│       │  stream   │
//!   │  worker   │       │ + rayon     │       │           │
//!   └───────────┘       └─────────────┘       └───────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use lattice_backends::mem::{mode, Accessor, Buf, TaskMemcpy};
//! use lattice_backends::{create_task_kernel, CpuSerial, DevCpu, QueueCpuBlocking};
//! use lattice_core::workdiv::{origin::Grid, unit::Threads};
//! use lattice_core::{Acc, Enqueue, Kernel, Result, Vector, WorkDivMembers};
//!
//! struct Iota;
//!
//! impl Kernel<u32, 1, Accessor<u32, u32, 1, mode::WriteOnly>> for Iota {
//!     fn call<A: Acc<u32, 1>>(&self, acc: &A, out: &Accessor<u32, u32, 1, mode::WriteOnly>) {
//!         let i = acc.idx::<Grid, Threads>()[0];
//!         // SAFETY: each thread writes only its own element.
//!         unsafe { out.set(i, i * 10) };
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let dev = DevCpu::new();
//! let queue = QueueCpuBlocking::new(&dev);
//! let device_buf = Buf::<u32, u32, 1>::zeros(8);
//! let host_buf = Buf::<u32, u32, 1>::zeros(8);
//!
//! let wd = WorkDivMembers::new(Vector::new([8u32]), Vector::ones(), Vector::ones());
//! queue.enqueue(&create_task_kernel::<CpuSerial, _, 1, _, _, _>(&wd, Iota, device_buf.access::<mode::WriteOnly>()))?;
//! queue.enqueue(&TaskMemcpy::new(&host_buf, &device_buf, 8)?)?;
//!
//! assert_eq!(host_buf.to_vec(), vec![0, 10, 20, 30, 40, 50, 60, 70]);
//! # Ok(())
//! # }
//! ```

pub mod args;
pub mod backends;
pub mod mem;
pub mod runtime;

pub use args::{KernelArg, KernelArgs};
pub use backends::cpu::{create_task_kernel, CpuAccKind, TaskCpu};
pub use backends::graph::TaskGraph;
pub use backends::{
    AccCpuBlocks, AccCpuSerial, AccCpuThreads, AccGraph, CpuBlocks, CpuSerial, CpuThreads, DevCpu, DevCuda, DevGraph,
    EventCpu, EventGraph, PlatformCpu, PlatformCuda, PlatformGraph, QueueCpuBlocking, QueueCpuNonBlocking,
    QueueGraphBlocking, QueueGraphNonBlocking, TaskHost, TaskKernelCpu, TaskKernelGraph,
};
pub use mem::{Accessor, Buf, SubView, TaskMemcpy, TaskMemset};
