//! Host CPU devices, queues and accelerators
//!
//! Three accelerators share one device type:
//!
//! | Accelerator | Blocks | Threads per block | Atomics (grid/block/thread) |
//! |---|---|---|---|
//! | [`AccCpuSerial`] | sequential | 1 | uncontended everywhere |
//! | [`AccCpuThreads`] | sequential | one OS thread each | native/native/uncontended |
//! | [`AccCpuBlocks`] | rayon pool | 1 | native/uncontended/uncontended |

pub mod blocks;
pub mod event;
pub mod queue;
pub mod serial;
pub mod task;
pub mod threads;

pub use blocks::{AccCpuBlocks, CpuBlocks};
pub use event::EventCpu;
pub use queue::{QueueCpuBlocking, QueueCpuNonBlocking};
pub use serial::{AccCpuSerial, CpuSerial};
pub use task::{create_task_kernel, CpuAccKind, TaskCpu, TaskHost, TaskKernelCpu};
pub use threads::{AccCpuThreads, CpuThreads};

use crate::runtime::{BlockShared, QueueRegistry};
use lattice_core::{
    Acc, AccDevPropsOverride, Atomics, BlockSync, Device, Error, Idx, IdxMembers, MathStd, Platform, Result, Wait,
    WaiterWaitFor, WarpSingleThread, WorkDivMembers,
};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Environment variable capping the block thread count of host accelerators
pub const ENV_CPU_MAX_BLOCK_THREADS: &str = "LATTICE_CPU_MAX_BLOCK_THREADS";

/// Block shared memory budget of the host accelerators
pub const CPU_SHARED_MEM_BYTES: usize = 47 * 1024;

/// What a device needs from each of its queues for device-wide operations
pub(crate) trait CpuQueueHandle: Send + Sync {
    /// Enqueue a fresh event at the current end of the queue
    fn record_marker(&self) -> Result<EventCpu>;

    /// Make later submissions of the queue wait for `event`
    fn wait_for_event(&self, event: &EventCpu) -> Result<()>;
}

struct DevCpuInner {
    name: String,
    props_override: AccDevPropsOverride,
    registry: Arc<QueueRegistry<dyn CpuQueueHandle>>,
    launches: AtomicU64,
}

/// The host CPU.
///
/// Cloning shares the device; equality is identity.
#[derive(Clone)]
pub struct DevCpu {
    inner: Arc<DevCpuInner>,
}

impl DevCpu {
    pub fn new() -> Self {
        Self::with_props_override(AccDevPropsOverride::default())
    }

    /// A device whose accelerator limits are tightened by `props_override`
    pub fn with_props_override(props_override: AccDevPropsOverride) -> Self {
        Self {
            inner: Arc::new(DevCpuInner {
                name: host_name(),
                props_override,
                registry: Arc::new(QueueRegistry::default()),
                launches: AtomicU64::new(0),
            }),
        }
    }

    pub fn props_override(&self) -> &AccDevPropsOverride {
        &self.inner.props_override
    }

    pub(crate) fn registry(&self) -> &Arc<QueueRegistry<dyn CpuQueueHandle>> {
        &self.inner.registry
    }

    pub(crate) fn count_launch(&self) {
        self.inner.launches.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of queues currently alive on this device
    pub fn queue_count(&self) -> usize {
        self.inner.registry.len()
    }
}

impl Default for DevCpu {
    fn default() -> Self {
        Self::new()
    }
}

fn host_name() -> String {
    let threads = std::thread::available_parallelism().map_or(1, |n| n.get());
    format!("host cpu ({threads} hardware threads, {})", std::env::consts::ARCH)
}

/// Value of one `/proc/meminfo` entry in bytes
pub(crate) fn meminfo_bytes(key: &str) -> Option<usize> {
    let text = std::fs::read_to_string("/proc/meminfo").ok()?;
    text.lines().find_map(|line| {
        let value = line.strip_prefix(key)?.strip_prefix(':')?;
        let kib: usize = value.trim().trim_end_matches("kB").trim().parse().ok()?;
        Some(kib * 1024)
    })
}

impl PartialEq for DevCpu {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for DevCpu {}

impl fmt::Debug for DevCpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevCpu")
            .field("name", &self.inner.name)
            .field("queues", &self.queue_count())
            .finish()
    }
}

impl Wait for DevCpu {
    /// Waits for every queue alive at the time of the call. Queues created
    /// while waiting are not waited for.
    fn wait(&self) -> Result<()> {
        let queues = self.inner.registry.snapshot();
        let markers = queues.iter().map(|q| q.record_marker()).collect::<Result<Vec<_>>>()?;
        tracing::trace!(queues = markers.len(), "waiting for host device");
        for marker in &markers {
            marker.wait()?;
        }
        lattice_tracing::perf_event!("host_device_drained", queues = markers.len());
        Ok(())
    }
}

impl Device for DevCpu {
    fn name(&self) -> String {
        self.inner.name.clone()
    }

    fn memory_bytes(&self) -> usize {
        meminfo_bytes("MemTotal").unwrap_or_else(|| {
            tracing::warn!("total host memory unavailable on this platform");
            0
        })
    }

    fn free_memory_bytes(&self) -> usize {
        meminfo_bytes("MemAvailable").unwrap_or_else(|| self.memory_bytes())
    }

    fn reset(&self) -> Result<()> {
        tracing::debug!("host device reset is a no-op");
        Ok(())
    }

    fn native_launch_count(&self) -> u64 {
        self.inner.launches.load(Ordering::Relaxed)
    }
}

impl WaiterWaitFor<EventCpu> for DevCpu {
    fn wait_for(&self, event: &EventCpu) -> Result<()> {
        for queue in self.inner.registry.snapshot() {
            queue.wait_for_event(event)?;
        }
        Ok(())
    }
}

/// The single host device
#[derive(Debug, Clone)]
pub struct PlatformCpu {
    dev: DevCpu,
}

impl PlatformCpu {
    /// Reads [`ENV_CPU_MAX_BLOCK_THREADS`] once to build the device's props override.
    pub fn new() -> Self {
        let mut props_override = AccDevPropsOverride::default();
        if let Ok(value) = std::env::var(ENV_CPU_MAX_BLOCK_THREADS) {
            match value.trim().parse::<usize>() {
                Ok(max) if max > 0 => props_override = props_override.block_threads(max),
                _ => tracing::warn!(%value, "ignoring invalid {ENV_CPU_MAX_BLOCK_THREADS}"),
            }
        }
        Self {
            dev: DevCpu::with_props_override(props_override),
        }
    }
}

impl Default for PlatformCpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for PlatformCpu {
    type Dev = DevCpu;

    fn dev_count(&self) -> usize {
        1
    }

    fn dev_by_idx(&self, index: usize) -> Result<DevCpu> {
        if index == 0 {
            Ok(self.dev.clone())
        } else {
            Err(Error::DeviceIndexOutOfRange { index, count: 1 })
        }
    }
}

/// Host accelerator; [`AccCpuSerial`], [`AccCpuThreads`] and [`AccCpuBlocks`]
/// fix its synchronization and atomics.
pub struct AccCpu<'a, I, const D: usize, S, H> {
    work_div: &'a WorkDivMembers<I, D>,
    grid_block_idx: IdxMembers<I, D>,
    block_thread_idx: IdxMembers<I, D>,
    sync: &'a S,
    shared: BlockShared<'a>,
    warp: WarpSingleThread,
    math: MathStd,
    _atomics: PhantomData<H>,
}

impl<'a, I: Idx, const D: usize, S, H> AccCpu<'a, I, D, S, H> {
    pub(crate) fn new(
        work_div: &'a WorkDivMembers<I, D>,
        grid_block_idx: lattice_core::Vector<I, D>,
        block_thread_idx: lattice_core::Vector<I, D>,
        sync: &'a S,
        shared: BlockShared<'a>,
    ) -> Self {
        Self {
            work_div,
            grid_block_idx: IdxMembers(grid_block_idx),
            block_thread_idx: IdxMembers(block_thread_idx),
            sync,
            shared,
            warp: WarpSingleThread,
            math: MathStd,
            _atomics: PhantomData,
        }
    }
}

impl<'a, I: Idx, const D: usize, S: BlockSync, H: Atomics> Acc<I, D> for AccCpu<'a, I, D, S, H> {
    type WorkDiv = WorkDivMembers<I, D>;
    type GridBlockIdx = IdxMembers<I, D>;
    type BlockThreadIdx = IdxMembers<I, D>;
    type Atomics = H;
    type Sync = S;
    type Shared = BlockShared<'a>;
    type Warp = WarpSingleThread;
    type Math = MathStd;

    fn work_division(&self) -> &Self::WorkDiv {
        self.work_div
    }

    fn grid_block_idx_provider(&self) -> &Self::GridBlockIdx {
        &self.grid_block_idx
    }

    fn block_thread_idx_provider(&self) -> &Self::BlockThreadIdx {
        &self.block_thread_idx
    }

    fn block_sync(&self) -> &S {
        self.sync
    }

    fn shared_mem(&self) -> &Self::Shared {
        &self.shared
    }

    fn warp(&self) -> &WarpSingleThread {
        &self.warp
    }

    fn math(&self) -> &MathStd {
        &self.math
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_device_identity() {
        let a = DevCpu::new();
        assert_eq!(a, a.clone());
        assert_ne!(a, DevCpu::new());
        assert!(a.name().contains("host cpu"));
    }

    #[test]
    fn test_memory_queries_are_consistent() {
        let dev = DevCpu::new();
        if cfg!(target_os = "linux") {
            assert!(dev.memory_bytes() > 0);
            assert!(dev.free_memory_bytes() <= dev.memory_bytes());
        }
        dev.reset().unwrap();
    }

    #[test]
    #[serial]
    fn test_platform_reads_thread_cap() {
        std::env::set_var(ENV_CPU_MAX_BLOCK_THREADS, "64");
        let platform = PlatformCpu::new();
        std::env::remove_var(ENV_CPU_MAX_BLOCK_THREADS);

        let dev = platform.dev_by_idx(0).unwrap();
        assert_eq!(dev.props_override().block_thread_count_max, Some(64));
        assert_eq!(platform.dev_count(), 1);
        assert_eq!(
            platform.dev_by_idx(1).unwrap_err(),
            Error::DeviceIndexOutOfRange { index: 1, count: 1 }
        );
    }

    #[test]
    #[serial]
    fn test_platform_ignores_invalid_cap() {
        std::env::set_var(ENV_CPU_MAX_BLOCK_THREADS, "many");
        let platform = PlatformCpu::new();
        std::env::remove_var(ENV_CPU_MAX_BLOCK_THREADS);
        assert!(platform.dev_by_idx(0).unwrap().props_override().is_empty());
    }
}
