//! Host queues

use super::task::TaskCpu;
use super::{CpuQueueHandle, DevCpu, EventCpu};
use crate::runtime::{InOrderWorker, Registration};
use lattice_core::{Enqueue, Error, Queue, RecordEvent, Result, Wait, WaiterWaitFor};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static QUEUE_IDS: AtomicU64 = AtomicU64::new(0);

struct BlockingInner {
    dev: DevCpu,
    exec: Mutex<()>,
    busy: AtomicBool,
    _registration: Registration<dyn CpuQueueHandle>,
}

impl BlockingInner {
    fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let _exec = self.exec.lock();
        self.busy.store(true, Ordering::Release);
        let result = f();
        self.busy.store(false, Ordering::Release);
        result
    }
}

impl CpuQueueHandle for BlockingInner {
    fn record_marker(&self) -> Result<EventCpu> {
        let event = EventCpu::new(&self.dev);
        self.run(|| {
            let ticket = event.mark_enqueued();
            event.mark_complete(ticket);
        });
        Ok(event)
    }

    fn wait_for_event(&self, event: &EventCpu) -> Result<()> {
        self.run(|| event.wait())
    }
}

/// Host queue executing each task on the calling thread before returning.
///
/// Concurrent enqueues from several threads are serialized.
#[derive(Clone)]
pub struct QueueCpuBlocking {
    inner: Arc<BlockingInner>,
}

impl QueueCpuBlocking {
    pub fn new(dev: &DevCpu) -> Self {
        let registry = Arc::clone(dev.registry());
        let inner = Arc::new_cyclic(|weak: &std::sync::Weak<BlockingInner>| {
            let weak: std::sync::Weak<dyn CpuQueueHandle> = weak.clone();
            BlockingInner {
                dev: dev.clone(),
                exec: Mutex::new(()),
                busy: AtomicBool::new(false),
                _registration: registry.register(weak),
            }
        });
        Self { inner }
    }
}

impl Wait for QueueCpuBlocking {
    fn wait(&self) -> Result<()> {
        self.inner.run(|| ());
        Ok(())
    }
}

impl Queue for QueueCpuBlocking {
    type Dev = DevCpu;
    type Event = EventCpu;

    const BLOCKING: bool = true;

    fn dev(&self) -> DevCpu {
        self.inner.dev.clone()
    }

    fn is_empty(&self) -> bool {
        !self.inner.busy.load(Ordering::Acquire)
    }
}

impl<T: TaskCpu + ?Sized> Enqueue<T> for QueueCpuBlocking {
    fn enqueue(&self, task: &T) -> Result<()> {
        self.inner.run(|| task.run(&self.inner.dev))
    }
}

impl RecordEvent<EventCpu> for QueueCpuBlocking {
    fn record(&self, event: &EventCpu) -> Result<()> {
        self.inner.run(|| {
            let ticket = event.mark_enqueued();
            event.mark_complete(ticket);
        });
        Ok(())
    }
}

impl WaiterWaitFor<EventCpu> for QueueCpuBlocking {
    fn wait_for(&self, event: &EventCpu) -> Result<()> {
        self.inner.wait_for_event(event)
    }
}

impl PartialEq for QueueCpuBlocking {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for QueueCpuBlocking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueCpuBlocking").field("empty", &self.is_empty()).finish()
    }
}

struct NonBlockingInner {
    dev: DevCpu,
    worker: InOrderWorker,
    error: Arc<Mutex<Option<Error>>>,
    _registration: Registration<dyn CpuQueueHandle>,
}

impl NonBlockingInner {
    fn submit_record(&self, event: &EventCpu) -> Result<()> {
        let ticket = event.mark_enqueued();
        let marker = event.clone();
        let submitted = self.worker.submit(Box::new(move || marker.mark_complete(ticket)));
        if submitted.is_err() {
            event.mark_complete(ticket);
        }
        submitted
    }
}

impl CpuQueueHandle for NonBlockingInner {
    fn record_marker(&self) -> Result<EventCpu> {
        let event = EventCpu::new(&self.dev);
        self.submit_record(&event)?;
        Ok(event)
    }

    fn wait_for_event(&self, event: &EventCpu) -> Result<()> {
        let ticket = event.current_ticket();
        let event = event.clone();
        self.worker.submit(Box::new(move || event.wait_ticket(ticket)))
    }
}

/// Host queue executing tasks in FIFO order on a dedicated worker thread.
///
/// The first task error is kept and returned by the next [`Wait::wait`].
#[derive(Clone)]
pub struct QueueCpuNonBlocking {
    inner: Arc<NonBlockingInner>,
}

impl QueueCpuNonBlocking {
    pub fn new(dev: &DevCpu) -> Result<Self> {
        let id = QUEUE_IDS.fetch_add(1, Ordering::Relaxed);
        let worker = InOrderWorker::spawn(format!("lattice-cpu-queue-{id}"))?;
        let registry = Arc::clone(dev.registry());
        let inner = Arc::new_cyclic(|weak: &std::sync::Weak<NonBlockingInner>| {
            let weak: std::sync::Weak<dyn CpuQueueHandle> = weak.clone();
            NonBlockingInner {
                dev: dev.clone(),
                worker,
                error: Arc::new(Mutex::new(None)),
                _registration: registry.register(weak),
            }
        });
        Ok(Self { inner })
    }
}

impl Wait for QueueCpuNonBlocking {
    fn wait(&self) -> Result<()> {
        self.inner.worker.wait_idle();
        match self.inner.error.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Queue for QueueCpuNonBlocking {
    type Dev = DevCpu;
    type Event = EventCpu;

    const BLOCKING: bool = false;

    fn dev(&self) -> DevCpu {
        self.inner.dev.clone()
    }

    fn is_empty(&self) -> bool {
        self.inner.worker.is_idle()
    }
}

impl<T: TaskCpu + Clone + 'static> Enqueue<T> for QueueCpuNonBlocking {
    fn enqueue(&self, task: &T) -> Result<()> {
        let task = task.clone();
        let dev = self.inner.dev.clone();
        let error = Arc::clone(&self.inner.error);
        self.inner.worker.submit(Box::new(move || {
            if let Err(err) = task.run(&dev) {
                tracing::error!(error = %err, "host queue task failed");
                error.lock().get_or_insert(err);
            }
        }))
    }
}

impl RecordEvent<EventCpu> for QueueCpuNonBlocking {
    fn record(&self, event: &EventCpu) -> Result<()> {
        self.inner.submit_record(event)
    }
}

impl WaiterWaitFor<EventCpu> for QueueCpuNonBlocking {
    fn wait_for(&self, event: &EventCpu) -> Result<()> {
        self.inner.wait_for_event(event)
    }
}

impl PartialEq for QueueCpuNonBlocking {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for QueueCpuNonBlocking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueCpuNonBlocking")
            .field("worker", &self.inner.worker.name())
            .field("empty", &self.is_empty())
            .finish()
    }
}
