//! Backend implementations
//!
//! - `cpu` - host accelerators (serial, one thread per block thread, rayon over blocks)
//! - `graph` - command-group queues over a work-group runtime with explicit dependencies
//! - `cuda` - NVIDIA GPUs through the driver API (feature `cuda`)

pub mod cpu;
pub mod cuda;
pub mod graph;

pub use cpu::{
    AccCpuBlocks, AccCpuSerial, AccCpuThreads, CpuBlocks, CpuSerial, CpuThreads, DevCpu, EventCpu, PlatformCpu,
    QueueCpuBlocking, QueueCpuNonBlocking, TaskHost, TaskKernelCpu,
};
pub use cuda::{DevCuda, PlatformCuda};
pub use graph::{
    AccGraph, DevGraph, EventGraph, PlatformGraph, QueueGraphBlocking, QueueGraphNonBlocking, TaskKernelGraph,
};
