//! Host accelerator with one OS thread per block thread
//!
//! Blocks run one at a time. For each block the launcher spawns a scoped
//! thread per block-thread index, all sharing one barrier and one shared
//! memory table, joins them, then clears the shared memory before the next
//! block. The block size is checked once against the device limits before the
//! first spawn.

use super::task::CpuAccKind;
use super::{AccCpu, DevCpu, CPU_SHARED_MEM_BYTES};
use crate::args::KernelArgs;
use crate::runtime::block::run_block_threads;
use crate::runtime::shared_st::BlockMemory;
use crate::runtime::BlockBarrier;
use lattice_core::{
    AccDevProps, AtomicHierarchy, Idx, Kernel, NativeAtomic, Result, UncontendedAtomic, Vector, WorkDiv,
    WorkDivMembers,
};

/// Default per-block thread limit
pub const CPU_THREADS_BLOCK_THREAD_MAX: usize = 1024;

/// Accelerator of [`CpuThreads`]
pub type AccCpuThreads<'a, I, const D: usize> =
    AccCpu<'a, I, D, BlockBarrier, AtomicHierarchy<NativeAtomic, NativeAtomic, UncontendedAtomic>>;

/// Tag selecting the thread-per-block-thread host accelerator
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuThreads;

impl CpuAccKind for CpuThreads {
    const NAME: &'static str = "cpu-threads";

    fn dev_props<I: Idx, const D: usize>(dev: &DevCpu) -> AccDevProps<I, D> {
        let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
        AccDevProps::uniform(cores, CPU_THREADS_BLOCK_THREAD_MAX, CPU_SHARED_MEM_BYTES)
            .with_override(dev.props_override())
    }

    fn launch<I, const D: usize, K, Args>(
        work_div: &WorkDivMembers<I, D>,
        kernel: &K,
        args: &Args,
        props: &AccDevProps<I, D>,
        dyn_shared_bytes: usize,
    ) -> Result<()>
    where
        I: Idx,
        K: Kernel<I, D, Args>,
        Args: KernelArgs,
    {
        let block_extent = work_div.block_thread_extent();
        let mut memory = BlockMemory::new(props.shared_mem_size_bytes, dyn_shared_bytes);

        for block_idx in Vector::ndrange(work_div.grid_block_extent()) {
            tracing::trace!(acc = Self::NAME, block = %block_idx, threads = %block_extent, "running block");
            let barrier = BlockBarrier::new(block_extent.prod().as_usize());
            let shared = memory.shared();
            run_block_threads(Self::NAME, block_extent, &barrier, |thread_idx| {
                let acc = AccCpuThreads::new(work_div, block_idx, thread_idx, &barrier, shared);
                kernel.call(&acc, args);
            })?;
            memory.reset();
        }
        Ok(())
    }
}
