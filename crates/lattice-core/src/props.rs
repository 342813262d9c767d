//! Accelerator device properties
//!
//! Every backend fills an [`AccDevProps`] from native queries (hardware
//! concurrency on the host, driver attributes on CUDA, fixed limits for the
//! command-group runtime). Task kernels validate their work division against it
//! before any launch.

use crate::idx::Idx;
use crate::vec::Vector;
use std::fmt;

/// Limits an accelerator imposes on a work division.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccDevProps<I, const D: usize> {
    /// Number of multiprocessors (host: hardware threads)
    pub multi_processor_count: I,
    /// Maximum grid-block extent per dimension
    pub grid_block_extent_max: Vector<I, D>,
    /// Maximum number of blocks in a grid
    pub grid_block_count_max: I,
    /// Maximum block-thread extent per dimension
    pub block_thread_extent_max: Vector<I, D>,
    /// Maximum number of threads in a block
    pub block_thread_count_max: I,
    /// Maximum thread-element extent per dimension
    pub thread_elem_extent_max: Vector<I, D>,
    /// Maximum number of elements per thread
    pub thread_elem_count_max: I,
    /// Block shared memory budget in bytes (static and dynamic)
    pub shared_mem_size_bytes: usize,
}

impl<I: Idx, const D: usize> AccDevProps<I, D> {
    /// Props with a single uniform limit in every dimension.
    pub fn uniform(multi_processor_count: usize, block_thread_count_max: usize, shared_mem_size_bytes: usize) -> Self {
        let unbounded = I::max_value();
        let threads = I::from_usize_saturating(block_thread_count_max);
        Self {
            multi_processor_count: I::from_usize_saturating(multi_processor_count),
            grid_block_extent_max: Vector::all(unbounded),
            grid_block_count_max: unbounded,
            block_thread_extent_max: Vector::all(threads),
            block_thread_count_max: threads,
            thread_elem_extent_max: Vector::all(unbounded),
            thread_elem_count_max: unbounded,
            shared_mem_size_bytes,
        }
    }

    /// Apply an override, only ever tightening limits.
    pub fn with_override(mut self, ov: &AccDevPropsOverride) -> Self {
        if let Some(max) = ov.block_thread_count_max {
            let max = I::from_usize_saturating(max).min(self.block_thread_count_max);
            self.block_thread_count_max = max;
            self.block_thread_extent_max = self.block_thread_extent_max.map(|v| v.min(max));
        }
        if let Some(bytes) = ov.shared_mem_size_bytes {
            self.shared_mem_size_bytes = self.shared_mem_size_bytes.min(bytes);
        }
        self
    }
}

impl<I: Idx, const D: usize> fmt::Display for AccDevProps<I, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mp={} grid<={}#{} block<={}#{} thread<={}#{} smem={}B",
            self.multi_processor_count,
            self.grid_block_extent_max,
            self.grid_block_count_max,
            self.block_thread_extent_max,
            self.block_thread_count_max,
            self.thread_elem_extent_max,
            self.thread_elem_count_max,
            self.shared_mem_size_bytes
        )
    }
}

/// Caller-supplied tightening of device limits.
///
/// Used to emulate smaller devices in tests or to cap host thread fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccDevPropsOverride {
    pub block_thread_count_max: Option<usize>,
    pub shared_mem_size_bytes: Option<usize>,
}

impl AccDevPropsOverride {
    pub fn block_threads(mut self, max: usize) -> Self {
        self.block_thread_count_max = Some(max);
        self
    }

    pub fn shared_mem_bytes(mut self, bytes: usize) -> Self {
        self.shared_mem_size_bytes = Some(bytes);
        self
    }

    /// True when the override changes nothing
    pub fn is_empty(&self) -> bool {
        self.block_thread_count_max.is_none() && self.shared_mem_size_bytes.is_none()
    }
}
