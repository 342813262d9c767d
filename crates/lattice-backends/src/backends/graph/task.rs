//! Tasks expressed as command groups

use super::acc::AccGraph;
use super::native::{Handler, NdItem, NdRange};
use super::{DevGraph, EventGraph};
use crate::args::KernelArgs;
use crate::backends::cpu::TaskHost;
use crate::mem::{TaskMemcpy, TaskMemset};
use crate::runtime::NativeEvent;
use bytemuck::Pod;
use lattice_core::{validate_work_div, Idx, Kernel, Result, WorkDiv, WorkDivMembers};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Work a command-group queue can submit.
pub trait TaskGraph: Send + Sync {
    /// Events the task was told to wait for
    fn dependencies(&self) -> Vec<NativeEvent> {
        Vec::new()
    }

    /// Fill the command group of one submission
    fn build(&self, dev: &DevGraph, handler: &mut Handler) -> Result<()>;
}

/// Kernel launch for [`AccGraph`].
///
/// The dependency list is shared by clones and may be extended concurrently
/// with submissions of the task.
pub struct TaskKernelGraph<I, const D: usize, K, Args> {
    work_div: WorkDivMembers<I, D>,
    kernel: Arc<K>,
    args: Args,
    dependencies: Arc<Mutex<Vec<NativeEvent>>>,
}

impl<I, const D: usize, K, Args> TaskKernelGraph<I, D, K, Args>
where
    I: Idx,
    K: Kernel<I, D, Args> + 'static,
    Args: KernelArgs,
{
    pub fn new<W: WorkDiv<I, D> + ?Sized>(work_div: &W, kernel: K, args: Args) -> Self {
        Self {
            work_div: WorkDivMembers::from_work_div(work_div),
            kernel: Arc::new(kernel),
            args,
            dependencies: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn work_div(&self) -> &WorkDivMembers<I, D> {
        &self.work_div
    }

    /// Later submissions of this task wait for `event`.
    pub fn depends_on(&self, event: &EventGraph) {
        if let Some(native) = event.native() {
            self.dependencies.lock().push(native);
        }
    }
}

impl<I, const D: usize, K, Args> TaskGraph for TaskKernelGraph<I, D, K, Args>
where
    I: Idx,
    K: Kernel<I, D, Args> + 'static,
    Args: KernelArgs,
{
    fn dependencies(&self) -> Vec<NativeEvent> {
        let mut deps = self.dependencies.lock();
        deps.retain(|event| !event.is_complete());
        deps.clone()
    }

    fn build(&self, dev: &DevGraph, handler: &mut Handler) -> Result<()> {
        let wd = &self.work_div;
        let block = wd.block_thread_extent();
        let thread_elem = wd.thread_elem_extent();
        let dyn_shared_bytes = self.kernel.block_shared_mem_dyn_size_bytes(&block, &thread_elem, &self.args);
        validate_work_div(&dev.acc_props::<I, D>(), wd, dyn_shared_bytes)?;

        self.args.declare_all(handler.requirements_mut());
        handler.set_dyn_local_mem(dyn_shared_bytes)?;

        let local = block.map(Idx::as_usize);
        let range = NdRange::new(wd.grid_block_extent().map(Idx::as_usize) * local, local)?;
        tracing::debug!(work_div = %wd, dyn_shared_bytes, "submitting graph kernel");

        let kernel = Arc::clone(&self.kernel);
        let args = self.args.clone();
        handler.parallel_for(range, move |item: &NdItem<'_, D>| {
            let acc = AccGraph::new(item, thread_elem);
            kernel.call(&acc, &args);
        })
    }
}

impl<I: Copy, const D: usize, K, Args: Clone> Clone for TaskKernelGraph<I, D, K, Args> {
    fn clone(&self) -> Self {
        Self {
            work_div: self.work_div,
            kernel: Arc::clone(&self.kernel),
            args: self.args.clone(),
            dependencies: Arc::clone(&self.dependencies),
        }
    }
}

impl<I: Idx, const D: usize, K, Args> fmt::Debug for TaskKernelGraph<I, D, K, Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskKernelGraph")
            .field("work_div", &format_args!("{}", self.work_div))
            .field("dependencies", &self.dependencies.lock().len())
            .finish()
    }
}

impl<F> TaskGraph for TaskHost<F>
where
    F: Fn() -> Result<()> + Send + Sync + 'static,
{
    fn build(&self, _dev: &DevGraph, handler: &mut Handler) -> Result<()> {
        let task = self.clone();
        handler.host_task(move || task.call())
    }
}

impl<T: Pod + Send + Sync, I: Idx, const D: usize> TaskGraph for TaskMemcpy<T, I, D> {
    fn build(&self, _dev: &DevGraph, handler: &mut Handler) -> Result<()> {
        handler.requirements_mut().merge(&self.requirements());
        let task = self.clone();
        handler.host_task(move || task.execute_locked())
    }
}

impl<T: Pod + Send + Sync, I: Idx, const D: usize> TaskGraph for TaskMemset<T, I, D> {
    fn build(&self, _dev: &DevGraph, handler: &mut Handler) -> Result<()> {
        handler.requirements_mut().merge(&self.requirements());
        let task = self.clone();
        handler.host_task(move || task.execute_locked())
    }
}
