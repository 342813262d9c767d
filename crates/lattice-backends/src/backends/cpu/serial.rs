//! Sequential host accelerator: blocks run one after another, one thread each

use super::task::CpuAccKind;
use super::{AccCpu, DevCpu, CPU_SHARED_MEM_BYTES};
use crate::args::KernelArgs;
use crate::runtime::shared_st::BlockMemory;
use lattice_core::{
    AccDevProps, AtomicHierarchy, BlockSyncNoOp, Error, Idx, Kernel, Result, UncontendedAtomic, Vector, WorkDiv,
    WorkDivMembers,
};
use std::panic::{self, AssertUnwindSafe};

/// Accelerator of [`CpuSerial`]
pub type AccCpuSerial<'a, I, const D: usize> =
    AccCpu<'a, I, D, BlockSyncNoOp, AtomicHierarchy<UncontendedAtomic, UncontendedAtomic, UncontendedAtomic>>;

/// Tag selecting the sequential host accelerator
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuSerial;

impl CpuAccKind for CpuSerial {
    const NAME: &'static str = "cpu-serial";

    fn dev_props<I: Idx, const D: usize>(dev: &DevCpu) -> AccDevProps<I, D> {
        AccDevProps::uniform(1, 1, CPU_SHARED_MEM_BYTES).with_override(dev.props_override())
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
        let sync = BlockSyncNoOp;
        let mut memory = BlockMemory::new(props.shared_mem_size_bytes, dyn_shared_bytes);
        for block_idx in Vector::ndrange(work_div.grid_block_extent()) {
            tracing::trace!(acc = Self::NAME, block = %block_idx, "running block");
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                let acc = AccCpuSerial::new(work_div, block_idx, Vector::zeros(), &sync, memory.shared());
                kernel.call(&acc, args);
            }));
            outcome.map_err(|payload| Error::from_panic(&*payload))?;
            memory.reset();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::workdiv::{origin::Grid, unit::Threads};
    use lattice_core::Acc;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct RecordOrder;

    impl Kernel<u32, 2, Arc<Mutex<Vec<Vector<u32, 2>>>>> for RecordOrder {
        fn call<A: Acc<u32, 2>>(&self, acc: &A, seen: &Arc<Mutex<Vec<Vector<u32, 2>>>>) {
            seen.lock().push(acc.idx::<Grid, Threads>());
        }
    }

    #[test]
    fn test_blocks_run_in_row_major_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let wd = WorkDivMembers::new(Vector::new([2u32, 3]), Vector::ones(), Vector::ones());
        let props = CpuSerial::dev_props::<u32, 2>(&DevCpu::new());
        CpuSerial::launch(&wd, &RecordOrder, &seen, &props, 0).unwrap();
        let expected: Vec<_> = Vector::ndrange(Vector::new([2u32, 3])).collect();
        assert_eq!(*seen.lock(), expected);
    }

    #[test]
    fn test_props_allow_one_thread() {
        let props = CpuSerial::dev_props::<usize, 1>(&DevCpu::new());
        assert_eq!(props.block_thread_count_max, 1);
        assert_eq!(props.multi_processor_count, 1);
    }
}
