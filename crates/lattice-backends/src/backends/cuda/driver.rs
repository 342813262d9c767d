//! Driver-backed device, platform and event

use super::{CudaAttributes, BACKEND};
use cudarc::driver::sys::CUdevice_attribute;
use cudarc::driver::{result, CudaDevice, CudaFunction, CudaSlice, DeviceRepr, DriverError, ValidAsZeroBits};
use cudarc::nvrtc::Ptx;
use lattice_core::{AccDevProps, Device, Error, Event, Idx, Platform, Result, Wait};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub(crate) fn driver_error(context: &str, err: DriverError) -> Error {
    Error::backend(BACKEND, format!("{context}: {err}"))
}

fn read_attributes(device: &CudaDevice) -> Result<CudaAttributes> {
    let attr = |a: CUdevice_attribute| -> Result<u32> {
        let value = device.attribute(a).map_err(|e| driver_error("attribute query failed", e))?;
        Ok(u32::try_from(value).unwrap_or(0))
    };
    Ok(CudaAttributes {
        multiprocessor_count: attr(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MULTIPROCESSOR_COUNT)?,
        max_threads_per_block: attr(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_THREADS_PER_BLOCK)?,
        max_block_dim: [
            attr(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_BLOCK_DIM_X)?,
            attr(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_BLOCK_DIM_Y)?,
            attr(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_BLOCK_DIM_Z)?,
        ],
        max_grid_dim: [
            attr(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_GRID_DIM_X)?,
            attr(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_GRID_DIM_Y)?,
            attr(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_GRID_DIM_Z)?,
        ],
        max_shared_mem_per_block: attr(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_SHARED_MEMORY_PER_BLOCK)? as usize,
    })
}

struct DevCudaInner {
    device: Arc<CudaDevice>,
    attributes: CudaAttributes,
    /// Launches issued so far
    launches: AtomicU64,
    /// Launches known to have completed
    completed: AtomicU64,
}

/// A CUDA device.
///
/// Completion is tracked on the host: every device synchronization completes
/// all launches issued before it started.
#[derive(Clone)]
pub struct DevCuda {
    inner: Arc<DevCudaInner>,
}

impl DevCuda {
    pub fn new(ordinal: usize) -> Result<Self> {
        let device = CudaDevice::new(ordinal).map_err(|e| driver_error("CUDA device initialization failed", e))?;
        let attributes = read_attributes(&device)?;
        tracing::debug!(ordinal, ?attributes, "CUDA device opened");
        Ok(Self {
            inner: Arc::new(DevCudaInner {
                device,
                attributes,
                launches: AtomicU64::new(0),
                completed: AtomicU64::new(0),
            }),
        })
    }

    pub fn is_available() -> bool {
        CudaDevice::count().map(|n| n > 0).unwrap_or(false)
    }

    pub fn attributes(&self) -> &CudaAttributes {
        &self.inner.attributes
    }

    pub fn acc_props<I: Idx, const D: usize>(&self) -> AccDevProps<I, D> {
        self.inner.attributes.acc_dev_props()
    }

    pub(crate) fn cuda(&self) -> &Arc<CudaDevice> {
        &self.inner.device
    }

    /// Compile-free load of PTX source as `module`, registering `functions`.
    pub fn load_ptx(&self, ptx_src: &str, module: &str, functions: &[&'static str]) -> Result<()> {
        self.inner
            .device
            .load_ptx(Ptx::from_src(ptx_src), module, functions)
            .map_err(|e| driver_error("PTX load failed", e))
    }

    pub(crate) fn function(&self, module: &str, name: &str) -> Result<CudaFunction> {
        self.inner
            .device
            .get_func(module, name)
            .ok_or_else(|| Error::backend(BACKEND, format!("kernel {module}::{name} is not loaded")))
    }

    pub fn htod_copy<T: DeviceRepr>(&self, data: &[T]) -> Result<CudaSlice<T>> {
        self.inner.device.htod_sync_copy(data).map_err(|e| driver_error("host to device copy failed", e))
    }

    pub fn dtoh_copy<T: DeviceRepr>(&self, data: &CudaSlice<T>) -> Result<Vec<T>> {
        self.inner.device.dtoh_sync_copy(data).map_err(|e| driver_error("device to host copy failed", e))
    }

    pub fn alloc_zeros<T: DeviceRepr + ValidAsZeroBits>(&self, len: usize) -> Result<CudaSlice<T>> {
        self.inner.device.alloc_zeros(len).map_err(|e| driver_error("device allocation failed", e))
    }

    /// Count one issued launch and return its sequence number
    pub(crate) fn count_launch(&self) -> u64 {
        self.inner.launches.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn issued(&self) -> u64 {
        self.inner.launches.load(Ordering::Acquire)
    }

    pub(crate) fn is_completed(&self, sequence: u64) -> bool {
        self.inner.completed.load(Ordering::Acquire) >= sequence
    }

    /// Block until every launch issued so far has completed.
    pub(crate) fn synchronize(&self) -> Result<()> {
        let target = self.issued();
        self.inner.device.synchronize().map_err(|e| driver_error("device synchronization failed", e))?;
        self.inner.completed.fetch_max(target, Ordering::AcqRel);
        Ok(())
    }

    fn mem_info(&self) -> Result<(usize, usize)> {
        self.inner.device.bind_to_thread().map_err(|e| driver_error("context bind failed", e))?;
        result::mem_get_info().map_err(|e| driver_error("memory query failed", e))
    }
}

impl PartialEq for DevCuda {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for DevCuda {}

impl fmt::Debug for DevCuda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevCuda")
            .field("ordinal", &self.inner.device.ordinal())
            .field("attributes", &self.inner.attributes)
            .finish()
    }
}

impl Wait for DevCuda {
    fn wait(&self) -> Result<()> {
        self.synchronize()
    }
}

impl Device for DevCuda {
    fn name(&self) -> String {
        self.inner
            .device
            .name()
            .unwrap_or_else(|_| format!("CUDA device {}", self.inner.device.ordinal()))
    }

    fn memory_bytes(&self) -> usize {
        match self.mem_info() {
            Ok((_, total)) => total,
            Err(err) => {
                tracing::warn!(error = %err, "total memory unavailable");
                0
            }
        }
    }

    fn free_memory_bytes(&self) -> usize {
        match self.mem_info() {
            Ok((free, _)) => free,
            Err(err) => {
                tracing::warn!(error = %err, "free memory unavailable");
                0
            }
        }
    }

    fn reset(&self) -> Result<()> {
        tracing::warn!("CUDA device reset is not exposed by the driver binding; synchronizing instead");
        self.synchronize()
    }

    fn native_launch_count(&self) -> u64 {
        self.issued()
    }
}

/// Enumeration of the CUDA devices visible to the driver
#[derive(Debug, Clone)]
pub struct PlatformCuda {
    count: usize,
}

impl PlatformCuda {
    pub fn new() -> Result<Self> {
        let count = CudaDevice::count().map_err(|e| driver_error("device count query failed", e))?;
        Ok(Self {
            count: usize::try_from(count).unwrap_or(0),
        })
    }
}

impl Platform for PlatformCuda {
    type Dev = DevCuda;

    fn dev_count(&self) -> usize {
        self.count
    }

    fn dev_by_idx(&self, index: usize) -> Result<DevCuda> {
        if index >= self.count {
            return Err(Error::DeviceIndexOutOfRange {
                index,
                count: self.count,
            });
        }
        DevCuda::new(index)
    }
}

/// Completion token at a CUDA queue position.
///
/// Records the launch sequence number reached when it was recorded; it is
/// complete once a device synchronization covered that launch.
#[derive(Clone)]
pub struct EventCuda {
    dev: DevCuda,
    sequence: Arc<Mutex<u64>>,
}

impl EventCuda {
    pub fn new(dev: &DevCuda) -> Self {
        Self {
            dev: dev.clone(),
            sequence: Arc::new(Mutex::new(0)),
        }
    }

    pub(crate) fn set_sequence(&self, sequence: u64) {
        *self.sequence.lock() = sequence;
    }
}

impl Wait for EventCuda {
    fn wait(&self) -> Result<()> {
        if self.is_complete() {
            Ok(())
        } else {
            self.dev.synchronize()
        }
    }
}

impl Event for EventCuda {
    type Dev = DevCuda;

    fn dev(&self) -> DevCuda {
        self.dev.clone()
    }

    fn is_complete(&self) -> bool {
        self.dev.is_completed(*self.sequence.lock())
    }
}

impl PartialEq for EventCuda {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.sequence, &other.sequence)
    }
}

impl fmt::Debug for EventCuda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCuda").field("sequence", &*self.sequence.lock()).finish()
    }
}
