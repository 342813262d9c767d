//! Tasks runnable on the host queues

use super::DevCpu;
use crate::args::KernelArgs;
use crate::mem::{TaskMemcpy, TaskMemset};
use bytemuck::Pod;
use lattice_core::{validate_work_div, AccDevProps, Idx, Kernel, Result, WorkDiv, WorkDivMembers};
use lattice_tracing::perf_span;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

/// Work a CPU queue can execute.
pub trait TaskCpu: Send + Sync {
    fn run(&self, dev: &DevCpu) -> Result<()>;
}

/// A host accelerator flavour: its limits and its block loop.
pub trait CpuAccKind: Send + Sync + 'static {
    const NAME: &'static str;

    fn dev_props<I: Idx, const D: usize>(dev: &DevCpu) -> AccDevProps<I, D>;

    /// Run every block of an already validated work division.
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
        Args: KernelArgs;
}

/// Work division, kernel and arguments bound for one host accelerator.
pub struct TaskKernelCpu<Kind, I, const D: usize, K, Args> {
    work_div: WorkDivMembers<I, D>,
    kernel: Arc<K>,
    args: Args,
    _kind: PhantomData<fn() -> Kind>,
}

/// Bind `kernel` and `args` to `work_div` for the accelerator `Kind`.
pub fn create_task_kernel<Kind, I, const D: usize, K, Args, W>(
    work_div: &W,
    kernel: K,
    args: Args,
) -> TaskKernelCpu<Kind, I, D, K, Args>
where
    Kind: CpuAccKind,
    I: Idx,
    K: Kernel<I, D, Args>,
    Args: KernelArgs,
    W: WorkDiv<I, D> + ?Sized,
{
    TaskKernelCpu {
        work_div: WorkDivMembers::from_work_div(work_div),
        kernel: Arc::new(kernel),
        args,
        _kind: PhantomData,
    }
}

impl<Kind, I, const D: usize, K, Args> TaskKernelCpu<Kind, I, D, K, Args>
where
    Kind: CpuAccKind,
    I: Idx,
    K: Kernel<I, D, Args>,
    Args: KernelArgs,
{
    pub fn work_div(&self) -> &WorkDivMembers<I, D> {
        &self.work_div
    }

    pub fn args(&self) -> &Args {
        &self.args
    }
}

impl<Kind, I, const D: usize, K, Args> TaskCpu for TaskKernelCpu<Kind, I, D, K, Args>
where
    Kind: CpuAccKind,
    I: Idx,
    K: Kernel<I, D, Args>,
    Args: KernelArgs,
{
    fn run(&self, dev: &DevCpu) -> Result<()> {
        let wd = &self.work_div;
        let dyn_shared_bytes =
            self.kernel
                .block_shared_mem_dyn_size_bytes(&wd.block_thread_extent(), &wd.thread_elem_extent(), &self.args);
        let props = Kind::dev_props::<I, D>(dev);
        validate_work_div(&props, wd, dyn_shared_bytes)?;

        let requirements = self.args.requirements();
        let _guards = requirements.acquire();

        dev.count_launch();
        tracing::debug!(acc = Kind::NAME, work_div = %wd, dyn_shared_bytes, "launching kernel");
        let _span = perf_span!("cpu_kernel", acc = Kind::NAME);
        let start = Instant::now();
        let result = Kind::launch(wd, self.kernel.as_ref(), &self.args, &props, dyn_shared_bytes);
        lattice_tracing::performance::record_launch(
            Kind::NAME,
            wd.grid_block_extent().prod().as_usize(),
            wd.block_thread_extent().prod().as_usize(),
            start.elapsed().as_micros() as u64,
        );
        result
    }
}

impl<Kind, I: Copy, const D: usize, K, Args: Clone> Clone for TaskKernelCpu<Kind, I, D, K, Args> {
    fn clone(&self) -> Self {
        Self {
            work_div: self.work_div,
            kernel: Arc::clone(&self.kernel),
            args: self.args.clone(),
            _kind: PhantomData,
        }
    }
}

impl<Kind: CpuAccKind, I: Idx, const D: usize, K, Args> fmt::Debug for TaskKernelCpu<Kind, I, D, K, Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskKernelCpu")
            .field("acc", &Kind::NAME)
            .field("work_div", &format_args!("{}", self.work_div))
            .finish()
    }
}

/// Host closure run in queue order
pub struct TaskHost<F> {
    f: Arc<F>,
}

impl<F> TaskHost<F>
where
    F: Fn() -> Result<()> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }

    pub fn call(&self) -> Result<()> {
        (self.f)()
    }
}

impl<F> Clone for TaskHost<F> {
    fn clone(&self) -> Self {
        Self { f: Arc::clone(&self.f) }
    }
}

impl<F> TaskCpu for TaskHost<F>
where
    F: Fn() -> Result<()> + Send + Sync + 'static,
{
    fn run(&self, _dev: &DevCpu) -> Result<()> {
        self.call()
    }
}

impl<T: Pod + Send + Sync, I: Idx, const D: usize> TaskCpu for TaskMemcpy<T, I, D> {
    fn run(&self, _dev: &DevCpu) -> Result<()> {
        self.execute()
    }
}

impl<T: Pod + Send + Sync, I: Idx, const D: usize> TaskCpu for TaskMemset<T, I, D> {
    fn run(&self, _dev: &DevCpu) -> Result<()> {
        self.execute()
    }
}
