//! CUDA backend for NVIDIA GPUs
//!
//! Kernels on this backend are PTX modules loaded by name; the device side is
//! not a Rust [`lattice_core::Acc`]. What this layer owns is the host half of
//! a launch: device limits read from driver attributes, work-division
//! validation before any launch, translation of the three extents into a
//! launch configuration, and stream-ordered queues.
//!
//! ```text
//! DevCuda
//! ├── CudaDevice   - driver context (cudarc)
//! ├── attributes   - limits feeding AccDevProps
//! └── QueueCuda*   - one forked stream each
//! ```
//!
//! Building without the `cuda` feature keeps the type names; constructors then
//! return [`Error::Unsupported`].

#[cfg(feature = "cuda")]
mod driver;
#[cfg(feature = "cuda")]
mod queue;

#[cfg(feature = "cuda")]
pub use driver::{DevCuda, EventCuda, PlatformCuda};
#[cfg(feature = "cuda")]
pub use queue::{QueueCuda, QueueCudaBlocking, QueueCudaNonBlocking, TaskKernelCuda};

use lattice_core::{AccDevProps, Error, Idx, Result, Vector, WorkDiv};

#[cfg(feature = "cuda")]
pub(crate) const BACKEND: &str = "cuda";

/// Device limits as reported by the driver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CudaAttributes {
    pub multiprocessor_count: u32,
    pub max_threads_per_block: u32,
    /// x, y, z
    pub max_block_dim: [u32; 3],
    /// x, y, z
    pub max_grid_dim: [u32; 3],
    pub max_shared_mem_per_block: usize,
}

impl CudaAttributes {
    /// Limits in the accelerator's vector order, where component `D-1` is x.
    pub fn acc_dev_props<I: Idx, const D: usize>(&self) -> AccDevProps<I, D> {
        let along = |dims: &[u32; 3]| Vector::from_fn(|k| I::from_usize_saturating(dims[D - 1 - k] as usize));
        AccDevProps {
            multi_processor_count: I::from_usize_saturating(self.multiprocessor_count as usize),
            grid_block_extent_max: along(&self.max_grid_dim),
            grid_block_count_max: I::max_value(),
            block_thread_extent_max: along(&self.max_block_dim),
            block_thread_count_max: I::from_usize_saturating(self.max_threads_per_block as usize),
            thread_elem_extent_max: Vector::all(I::max_value()),
            thread_elem_count_max: I::max_value(),
            shared_mem_size_bytes: self.max_shared_mem_per_block,
        }
    }
}

/// Grid and block dimensions of one native launch, x first
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaunchDims {
    pub grid: (u32, u32, u32),
    pub block: (u32, u32, u32),
}

fn to_dim3<I: Idx, const D: usize>(what: &str, extent: &Vector<I, D>) -> Result<(u32, u32, u32)> {
    let mut dims = [1u32; 3];
    for (axis, dim) in dims.iter_mut().enumerate().take(D) {
        let value = extent[D - 1 - axis].as_usize();
        *dim = u32::try_from(value)
            .map_err(|_| Error::invalid_work_div(format!("{what} extent {extent} does not fit a CUDA launch")))?;
    }
    Ok((dims[0], dims[1], dims[2]))
}

/// Translate a work division into launch dimensions.
///
/// The fastest-varying component (`D-1`) becomes x. Thread elements have no
/// native counterpart and are left to the kernel.
pub fn launch_dims<I: Idx, const D: usize, W: WorkDiv<I, D> + ?Sized>(work_div: &W) -> Result<LaunchDims> {
    const { assert!(D <= 3, "CUDA launches have at most three dimensions") };
    Ok(LaunchDims {
        grid: to_dim3("grid-block", &work_div.grid_block_extent())?,
        block: to_dim3("block-thread", &work_div.block_thread_extent())?,
    })
}

#[cfg(not(feature = "cuda"))]
fn feature_disabled() -> Error {
    Error::unsupported("CUDA backend requires the `cuda` feature of lattice-backends")
}

/// Stand-in CUDA device of builds without the `cuda` feature
#[cfg(not(feature = "cuda"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevCuda {
    _private: (),
}

#[cfg(not(feature = "cuda"))]
impl DevCuda {
    pub fn new(_ordinal: usize) -> Result<Self> {
        Err(feature_disabled())
    }

    pub fn is_available() -> bool {
        false
    }
}

/// Stand-in CUDA platform of builds without the `cuda` feature
#[cfg(not(feature = "cuda"))]
#[derive(Debug, Clone)]
pub struct PlatformCuda {
    _private: (),
}

#[cfg(not(feature = "cuda"))]
impl PlatformCuda {
    pub fn new() -> Result<Self> {
        Err(feature_disabled())
    }
}
