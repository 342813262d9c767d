//! Command-group backend (SYCL family)
//!
//! Tasks are expressed as command groups: buffer requirements declared through
//! accessors, explicit `depends_on` events, arguments captured by value and one
//! `parallel_for` over an nd-range with global size G∘B and local size B. The
//! accelerator is rebuilt inside the device lambda for every work item.
//!
//! Queues merge, in this order, their own pending dependencies, the device's
//! and the task's. The locks guarding those lists are always taken in that
//! order.

pub mod acc;
pub mod event;
pub mod native;
pub mod queue;
pub mod task;

pub use acc::{AccGraph, AtomicsGraph, GroupSync, ItemIdx, WorkDivGraph};
pub use event::EventGraph;
pub use native::{Handler, NativeContext, NativeQueue, NdItem, NdRange, GRAPH_LOCAL_MEM_BYTES, GRAPH_MAX_WORK_GROUP_SIZE};
pub use queue::{QueueGraph, QueueGraphBlocking, QueueGraphNonBlocking};
pub use task::{TaskGraph, TaskKernelGraph};

use super::cpu::meminfo_bytes;
use crate::runtime::{NativeEvent, QueueRegistry};
use lattice_core::{
    AccDevProps, AccDevPropsOverride, Device, Error, Idx, Platform, Result, Wait, WaiterWaitFor,
};
use parking_lot::RwLock;
use queue::QueueGraphInner;
use std::fmt;
use std::sync::Arc;

struct DevGraphInner {
    index: usize,
    ctx: Arc<NativeContext>,
    props_override: AccDevPropsOverride,
    registry: Arc<QueueRegistry<QueueGraphInner>>,
    dependencies: RwLock<Vec<NativeEvent>>,
}

/// A command-group device and its native context.
///
/// Cloning shares the device; equality is identity.
#[derive(Clone)]
pub struct DevGraph {
    inner: Arc<DevGraphInner>,
}

impl DevGraph {
    pub fn new() -> Self {
        Self::with_index(0, AccDevPropsOverride::default())
    }

    pub fn with_props_override(props_override: AccDevPropsOverride) -> Self {
        Self::with_index(0, props_override)
    }

    fn with_index(index: usize, props_override: AccDevPropsOverride) -> Self {
        Self {
            inner: Arc::new(DevGraphInner {
                index,
                ctx: Arc::new(NativeContext::new(format!("lattice graph device {index}"))),
                props_override,
                registry: Arc::new(QueueRegistry::default()),
                dependencies: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn index(&self) -> usize {
        self.inner.index
    }

    pub fn context(&self) -> &Arc<NativeContext> {
        &self.inner.ctx
    }

    /// Limits of [`AccGraph`] on this device
    pub fn acc_props<I: Idx, const D: usize>(&self) -> AccDevProps<I, D> {
        let ctx = &self.inner.ctx;
        AccDevProps::uniform(ctx.compute_units(), ctx.max_work_group_size(), ctx.local_mem_bytes())
            .with_override(&self.inner.props_override)
    }

    pub(crate) fn registry(&self) -> &Arc<QueueRegistry<QueueGraphInner>> {
        &self.inner.registry
    }

    /// Device-wide dependencies still pending; completed ones are dropped.
    pub(crate) fn pending_dependencies(&self) -> Vec<NativeEvent> {
        let mut deps = self.inner.dependencies.write();
        deps.retain(|event| !event.is_complete());
        deps.clone()
    }

    pub fn queue_count(&self) -> usize {
        self.inner.registry.len()
    }
}

impl Default for DevGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for DevGraph {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for DevGraph {}

impl fmt::Debug for DevGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevGraph")
            .field("name", &self.inner.ctx.name())
            .field("queues", &self.queue_count())
            .finish()
    }
}

impl Wait for DevGraph {
    /// Waits for every queue alive at the time of the call.
    fn wait(&self) -> Result<()> {
        let queues = self.inner.registry.snapshot();
        let markers = queues.iter().map(|q| q.record_marker()).collect::<Result<Vec<_>>>()?;
        for marker in &markers {
            marker.wait()?;
        }
        Ok(())
    }
}

impl Device for DevGraph {
    fn name(&self) -> String {
        self.inner.ctx.name().to_owned()
    }

    fn memory_bytes(&self) -> usize {
        meminfo_bytes("MemTotal").unwrap_or(0)
    }

    fn free_memory_bytes(&self) -> usize {
        tracing::warn!(device = %self.inner.ctx.name(), "free memory query unsupported; reporting total memory");
        self.memory_bytes()
    }

    fn reset(&self) -> Result<()> {
        tracing::warn!(device = %self.inner.ctx.name(), "device reset unsupported; ignoring");
        Ok(())
    }

    fn native_launch_count(&self) -> u64 {
        self.inner.ctx.launch_count()
    }
}

impl WaiterWaitFor<EventGraph> for DevGraph {
    /// Every later submission on any queue of the device waits for `event`.
    fn wait_for(&self, event: &EventGraph) -> Result<()> {
        if let Some(native) = event.native() {
            if !native.is_complete() {
                self.inner.dependencies.write().push(native);
            }
        }
        Ok(())
    }
}

/// Devices of the command-group runtime
#[derive(Debug, Clone)]
pub struct PlatformGraph {
    devs: Vec<DevGraph>,
}

impl PlatformGraph {
    pub fn new() -> Self {
        Self::with_device_count(1)
    }

    pub fn with_device_count(count: usize) -> Self {
        Self {
            devs: (0..count)
                .map(|index| DevGraph::with_index(index, AccDevPropsOverride::default()))
                .collect(),
        }
    }
}

impl Default for PlatformGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for PlatformGraph {
    type Dev = DevGraph;

    fn dev_count(&self) -> usize {
        self.devs.len()
    }

    fn dev_by_idx(&self, index: usize) -> Result<DevGraph> {
        self.devs.get(index).cloned().ok_or(Error::DeviceIndexOutOfRange {
            index,
            count: self.devs.len(),
        })
    }
}
