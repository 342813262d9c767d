//! Blocking and non-blocking command-group queues

use super::native::{Handler, NativeQueue};
use super::task::TaskGraph;
use super::{DevGraph, EventGraph};
use crate::runtime::{NativeEvent, Registration};
use lattice_core::{Enqueue, Queue, RecordEvent, Result, Wait, WaiterWaitFor};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static QUEUE_IDS: AtomicU64 = AtomicU64::new(0);

#[derive(Default)]
struct QueueState {
    last_event: Option<NativeEvent>,
    dependencies: Vec<NativeEvent>,
}

pub(crate) struct QueueGraphInner {
    dev: DevGraph,
    native: NativeQueue,
    state: RwLock<QueueState>,
    _registration: Registration<QueueGraphInner>,
}

impl QueueGraphInner {
    /// Submit one command group after merging queue, device and task dependencies.
    fn submit(&self, task_dependencies: impl FnOnce() -> Vec<NativeEvent>, build: impl FnOnce(&mut Handler) -> Result<()>) -> Result<NativeEvent> {
        let mut state = self.state.write();
        // Queue-level waits stay pending until a submission carries them.
        state.dependencies.retain(|event| !event.is_complete());
        let mut dependencies = state.dependencies.clone();
        dependencies.extend(self.dev.pending_dependencies());
        dependencies.extend(task_dependencies());
        dependencies.retain(|event| !event.is_complete());

        let event = self.native.submit(|handler| {
            handler.depends_on_all(dependencies);
            build(handler)
        })?;
        state.dependencies.clear();
        state.last_event = Some(event.clone());
        Ok(event)
    }

    /// A marker completing once everything submitted before it completed
    pub(crate) fn record_marker(&self) -> Result<NativeEvent> {
        self.submit(Vec::new, |handler| handler.host_task(|| Ok(())))
    }

    fn last_event(&self) -> Option<NativeEvent> {
        self.state.read().last_event.clone()
    }
}

/// A command-group queue; [`QueueGraphBlocking`] waits for each submission.
#[derive(Clone)]
pub struct QueueGraph<const BLOCKING: bool> {
    inner: Arc<QueueGraphInner>,
}

pub type QueueGraphBlocking = QueueGraph<true>;
pub type QueueGraphNonBlocking = QueueGraph<false>;

impl<const BLOCKING: bool> QueueGraph<BLOCKING> {
    pub fn new(dev: &DevGraph) -> Result<Self> {
        let id = QUEUE_IDS.fetch_add(1, Ordering::Relaxed);
        let native = NativeQueue::new(Arc::clone(dev.context()), format!("lattice-graph-queue-{id}"))?;
        let registry = Arc::clone(dev.registry());
        let inner = Arc::new_cyclic(|weak: &Weak<QueueGraphInner>| QueueGraphInner {
            dev: dev.clone(),
            native,
            state: RwLock::new(QueueState::default()),
            _registration: registry.register(weak.clone()),
        });
        Ok(Self { inner })
    }

    /// The native event of the most recent submission
    pub fn last_event(&self) -> Option<NativeEvent> {
        self.inner.last_event()
    }

    fn finish(&self, event: NativeEvent) -> Result<()> {
        if !BLOCKING {
            return Ok(());
        }
        let result = event.wait();
        if result.is_err() {
            // Already reported to the caller; keep it out of the next wait.
            self.inner.native.take_error();
        }
        result
    }
}

impl<const BLOCKING: bool> Wait for QueueGraph<BLOCKING> {
    fn wait(&self) -> Result<()> {
        self.inner.native.wait()
    }
}

impl<const BLOCKING: bool> Queue for QueueGraph<BLOCKING> {
    type Dev = DevGraph;
    type Event = EventGraph;

    const BLOCKING: bool = BLOCKING;

    fn dev(&self) -> DevGraph {
        self.inner.dev.clone()
    }

    fn is_empty(&self) -> bool {
        self.inner.last_event().map_or(true, |event| event.is_complete())
    }
}

impl<T: TaskGraph + ?Sized, const BLOCKING: bool> Enqueue<T> for QueueGraph<BLOCKING> {
    fn enqueue(&self, task: &T) -> Result<()> {
        let dev = &self.inner.dev;
        let event = self.inner.submit(|| task.dependencies(), |handler| task.build(dev, handler))?;
        self.finish(event)
    }
}

impl<const BLOCKING: bool> RecordEvent<EventGraph> for QueueGraph<BLOCKING> {
    fn record(&self, event: &EventGraph) -> Result<()> {
        let marker = self.inner.record_marker()?;
        event.set_native(marker.clone());
        self.finish(marker)
    }
}

impl<const BLOCKING: bool> WaiterWaitFor<EventGraph> for QueueGraph<BLOCKING> {
    /// Later submissions of this queue wait for `event`.
    fn wait_for(&self, event: &EventGraph) -> Result<()> {
        if let Some(native) = event.native() {
            if !native.is_complete() {
                self.inner.state.write().dependencies.push(native);
            }
        }
        Ok(())
    }
}

impl<const BLOCKING: bool> PartialEq for QueueGraph<BLOCKING> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<const BLOCKING: bool> fmt::Debug for QueueGraph<BLOCKING> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueGraph")
            .field("blocking", &BLOCKING)
            .field("native", &self.inner.native)
            .field("empty", &self.is_empty())
            .finish()
    }
}
