//! Host accelerator running grid blocks in parallel on the rayon pool

use super::task::CpuAccKind;
use super::{AccCpu, DevCpu, CPU_SHARED_MEM_BYTES};
use crate::args::KernelArgs;
use crate::runtime::shared_st::BlockMemory;
use lattice_core::{
    AccDevProps, AtomicHierarchy, BlockSyncNoOp, Error, Idx, Kernel, NativeAtomic, Result, UncontendedAtomic, Vector,
    WorkDiv, WorkDivMembers,
};
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};

/// Accelerator of [`CpuBlocks`]
pub type AccCpuBlocks<'a, I, const D: usize> =
    AccCpu<'a, I, D, BlockSyncNoOp, AtomicHierarchy<NativeAtomic, UncontendedAtomic, UncontendedAtomic>>;

/// Tag selecting the parallel-blocks host accelerator
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuBlocks;

impl CpuAccKind for CpuBlocks {
    const NAME: &'static str = "cpu-blocks";

    fn dev_props<I: Idx, const D: usize>(dev: &DevCpu) -> AccDevProps<I, D> {
        AccDevProps::uniform(rayon::current_num_threads(), 1, CPU_SHARED_MEM_BYTES).with_override(dev.props_override())
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
        let grid = work_div.grid_block_extent();
        let blocks = grid.prod().as_usize();
        let sync = BlockSyncNoOp;

        (0..blocks).into_par_iter().try_for_each_init(
            || BlockMemory::new(props.shared_mem_size_bytes, dyn_shared_bytes),
            |memory, linear| {
                let block_idx = Vector::from_linear(I::from_usize_saturating(linear), &grid);
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    let acc = AccCpuBlocks::new(work_div, block_idx, Vector::zeros(), &sync, memory.shared());
                    kernel.call(&acc, args);
                }));
                memory.reset();
                outcome.map_err(|payload| Error::from_panic(&*payload))
            },
        )
    }
}
