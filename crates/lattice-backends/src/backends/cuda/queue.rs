//! Stream-ordered queues and PTX kernel tasks

use super::driver::{driver_error, DevCuda, EventCuda};
use super::{launch_dims, BACKEND};
use cudarc::driver::{CudaFunction, CudaStream, LaunchAsync, LaunchConfig};
use lattice_core::{
    validate_work_div, Enqueue, Error, Idx, Queue, RecordEvent, Result, Wait, WaiterWaitFor, WorkDiv, WorkDivMembers,
};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Launch of a loaded PTX function over a work division.
///
/// `params` is the tuple handed to the driver; its layout must match the
/// kernel signature.
#[derive(Clone)]
pub struct TaskKernelCuda<I, const D: usize, P> {
    work_div: WorkDivMembers<I, D>,
    module: String,
    function: String,
    params: P,
    dyn_shared_bytes: usize,
}

impl<I: Idx, const D: usize, P> TaskKernelCuda<I, D, P> {
    pub fn new<W: WorkDiv<I, D> + ?Sized>(work_div: &W, module: impl Into<String>, function: impl Into<String>, params: P) -> Self {
        Self {
            work_div: WorkDivMembers::from_work_div(work_div),
            module: module.into(),
            function: function.into(),
            params,
            dyn_shared_bytes: 0,
        }
    }

    /// Dynamic shared memory requested per block
    pub fn with_dyn_shared_bytes(mut self, bytes: usize) -> Self {
        self.dyn_shared_bytes = bytes;
        self
    }

    pub fn work_div(&self) -> &WorkDivMembers<I, D> {
        &self.work_div
    }
}

impl<I: Idx, const D: usize, P> fmt::Debug for TaskKernelCuda<I, D, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskKernelCuda")
            .field("work_div", &format_args!("{}", self.work_div))
            .field("kernel", &format_args!("{}::{}", self.module, self.function))
            .field("dyn_shared_bytes", &self.dyn_shared_bytes)
            .finish()
    }
}

struct QueueCudaInner {
    dev: DevCuda,
    stream: CudaStream,
    /// Device launch sequence number of this queue's latest launch
    last_launch: AtomicU64,
}

/// A queue on its own CUDA stream; [`QueueCudaBlocking`] synchronizes after each launch.
#[derive(Clone)]
pub struct QueueCuda<const BLOCKING: bool> {
    inner: Arc<QueueCudaInner>,
}

pub type QueueCudaBlocking = QueueCuda<true>;
pub type QueueCudaNonBlocking = QueueCuda<false>;

impl<const BLOCKING: bool> QueueCuda<BLOCKING> {
    pub fn new(dev: &DevCuda) -> Result<Self> {
        let stream = dev.cuda().fork_default_stream().map_err(|e| driver_error("stream creation failed", e))?;
        Ok(Self {
            inner: Arc::new(QueueCudaInner {
                dev: dev.clone(),
                stream,
                last_launch: AtomicU64::new(0),
            }),
        })
    }

    fn launch<I: Idx, const D: usize, P>(&self, task: &TaskKernelCuda<I, D, P>) -> Result<u64>
    where
        CudaFunction: LaunchAsync<P>,
        P: Clone,
    {
        let dev = &self.inner.dev;
        validate_work_div(&dev.acc_props::<I, D>(), &task.work_div, task.dyn_shared_bytes)?;
        let dims = launch_dims(&task.work_div)?;
        let shared_mem_bytes = u32::try_from(task.dyn_shared_bytes)
            .map_err(|_| Error::backend(BACKEND, format!("{} bytes of shared memory", task.dyn_shared_bytes)))?;
        let func = dev.function(&task.module, &task.function)?;
        let cfg = LaunchConfig {
            grid_dim: dims.grid,
            block_dim: dims.block,
            shared_mem_bytes,
        };
        tracing::debug!(work_div = %task.work_div, ?dims, kernel = %task.function, "launching CUDA kernel");

        // SAFETY: the caller's parameter tuple is required to match the PTX
        // signature, and the work division was validated against device limits.
        unsafe { func.launch_on_stream(&self.inner.stream, cfg, task.params.clone()) }
            .map_err(|e| driver_error("kernel launch failed", e))?;
        let sequence = dev.count_launch();
        self.inner.last_launch.fetch_max(sequence, Ordering::AcqRel);
        Ok(sequence)
    }

    fn finish(&self) -> Result<()> {
        if BLOCKING {
            self.inner.dev.synchronize()
        } else {
            Ok(())
        }
    }
}

impl<const BLOCKING: bool> Wait for QueueCuda<BLOCKING> {
    fn wait(&self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            self.inner.dev.synchronize()
        }
    }
}

impl<const BLOCKING: bool> Queue for QueueCuda<BLOCKING> {
    type Dev = DevCuda;
    type Event = EventCuda;

    const BLOCKING: bool = BLOCKING;

    fn dev(&self) -> DevCuda {
        self.inner.dev.clone()
    }

    fn is_empty(&self) -> bool {
        self.inner.dev.is_completed(self.inner.last_launch.load(Ordering::Acquire))
    }
}

impl<I, const D: usize, P, const BLOCKING: bool> Enqueue<TaskKernelCuda<I, D, P>> for QueueCuda<BLOCKING>
where
    I: Idx,
    CudaFunction: LaunchAsync<P>,
    P: Clone,
{
    fn enqueue(&self, task: &TaskKernelCuda<I, D, P>) -> Result<()> {
        self.launch(task)?;
        self.finish()
    }
}

impl<const BLOCKING: bool> RecordEvent<EventCuda> for QueueCuda<BLOCKING> {
    fn record(&self, event: &EventCuda) -> Result<()> {
        event.set_sequence(self.inner.last_launch.load(Ordering::Acquire));
        Ok(())
    }
}

impl<const BLOCKING: bool> WaiterWaitFor<EventCuda> for QueueCuda<BLOCKING> {
    /// Blocks the host until `event` completes.
    fn wait_for(&self, event: &EventCuda) -> Result<()> {
        event.wait()
    }
}

impl WaiterWaitFor<EventCuda> for DevCuda {
    fn wait_for(&self, event: &EventCuda) -> Result<()> {
        event.wait()
    }
}

impl<const BLOCKING: bool> PartialEq for QueueCuda<BLOCKING> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<const BLOCKING: bool> fmt::Debug for QueueCuda<BLOCKING> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueCuda")
            .field("blocking", &BLOCKING)
            .field("last_launch", &self.inner.last_launch.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::{Device, Event, Vector};
    use serial_test::serial;

    const PTX: &str = r#"
.version 6.0
.target sm_50
.address_size 64

.visible .entry fill(.param .u64 out, .param .u32 n)
{
    .reg .u32 %r<6>;
    .reg .u64 %rd<4>;
    .reg .pred %p;
    ld.param.u64 %rd1, [out];
    ld.param.u32 %r1, [n];
    mov.u32 %r2, %ctaid.x;
    mov.u32 %r3, %ntid.x;
    mov.u32 %r4, %tid.x;
    mad.lo.u32 %r5, %r2, %r3, %r4;
    setp.ge.u32 %p, %r5, %r1;
    @%p ret;
    cvta.to.global.u64 %rd2, %rd1;
    mul.wide.u32 %rd3, %r5, 4;
    add.u64 %rd2, %rd2, %rd3;
    st.global.u32 [%rd2], %r5;
    ret;
}
"#;

    fn device() -> Option<DevCuda> {
        if !DevCuda::is_available() {
            eprintln!("no CUDA device, skipping");
            return None;
        }
        DevCuda::new(0).ok()
    }

    #[test]
    #[serial]
    fn test_launch_writes_global_ids() {
        let Some(dev) = device() else { return };
        dev.load_ptx(PTX, "lattice_test", &["fill"]).unwrap();
        let out = dev.alloc_zeros::<u32>(256).unwrap();
        let queue = QueueCudaBlocking::new(&dev).unwrap();
        let wd = WorkDivMembers::new(Vector::new([4u32]), Vector::new([64]), Vector::ones());
        let before = dev.native_launch_count();
        queue.enqueue(&TaskKernelCuda::new(&wd, "lattice_test", "fill", (&out, 256u32))).unwrap();
        assert!(queue.is_empty());
        assert_eq!(dev.native_launch_count(), before + 1);
        let host = dev.dtoh_copy(&out).unwrap();
        assert!(host.iter().enumerate().all(|(i, &v)| v as usize == i));
    }

    #[test]
    #[serial]
    fn test_oversized_block_never_launches() {
        let Some(dev) = device() else { return };
        dev.load_ptx(PTX, "lattice_test_reject", &["fill"]).unwrap();
        let out = dev.alloc_zeros::<u32>(4096).unwrap();
        let queue = QueueCudaNonBlocking::new(&dev).unwrap();
        let block = dev.attributes().max_threads_per_block * 2;
        let wd = WorkDivMembers::new(Vector::new([1u32]), Vector::new([block]), Vector::ones());
        let before = dev.native_launch_count();
        let err = queue
            .enqueue(&TaskKernelCuda::new(&wd, "lattice_test_reject", "fill", (&out, 4096u32)))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidWorkDiv(_)));
        assert_eq!(dev.native_launch_count(), before);
    }

    #[test]
    #[serial]
    fn test_event_completes_after_wait() {
        let Some(dev) = device() else { return };
        dev.load_ptx(PTX, "lattice_test_event", &["fill"]).unwrap();
        let out = dev.alloc_zeros::<u32>(1024).unwrap();
        let queue = QueueCudaNonBlocking::new(&dev).unwrap();
        let wd = WorkDivMembers::new(Vector::new([8u32]), Vector::new([128]), Vector::ones());
        queue.enqueue(&TaskKernelCuda::new(&wd, "lattice_test_event", "fill", (&out, 1024u32))).unwrap();
        let event = EventCuda::new(&dev);
        queue.record(&event).unwrap();
        dev.wait_for(&event).unwrap();
        assert!(event.is_complete());
        assert!(queue.is_empty());
    }
}
