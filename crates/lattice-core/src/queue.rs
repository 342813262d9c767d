//! Queue, event, device and platform contracts
//!
//! A queue is an ordered submission channel of one device. Blocking queues
//! return from [`Enqueue::enqueue`] only after the work completed; non-blocking
//! queues return once it is submitted and record it as their last event.
//! Work in one queue completes in submission order. Ordering across queues is
//! only established through events.

use crate::error::Result;

/// Anything the calling thread can block on until completion
pub trait Wait {
    fn wait(&self) -> Result<()>;
}

/// Block the calling thread until `waitable` (event, queue or device) completes.
pub fn current_thread_wait_for<W: Wait + ?Sized>(waitable: &W) -> Result<()> {
    waitable.wait()
}

/// A backend target.
pub trait Device: Clone + PartialEq + Send + Sync + Wait {
    fn name(&self) -> String;

    /// Total memory in bytes
    fn memory_bytes(&self) -> usize;

    /// Free memory in bytes; backends that cannot tell return a best-effort value
    fn free_memory_bytes(&self) -> usize;

    /// Reset the device; a no-op where unsupported
    fn reset(&self) -> Result<()>;

    /// Native kernel launches issued against this device so far
    fn native_launch_count(&self) -> u64;
}

/// Enumeration of the devices of one backend.
pub trait Platform {
    type Dev: Device;

    fn dev_count(&self) -> usize;

    /// # Errors
    ///
    /// Returns [`crate::Error::DeviceIndexOutOfRange`] when `index >= dev_count()`.
    fn dev_by_idx(&self, index: usize) -> Result<Self::Dev>;
}

/// A completion token recorded at a queue position.
///
/// Equality means "same underlying token".
pub trait Event: Clone + PartialEq + Send + Sync + Wait {
    type Dev: Device;

    fn dev(&self) -> Self::Dev;

    fn is_complete(&self) -> bool;
}

/// An ordered submission channel.
pub trait Queue: Send + Sync + Wait {
    type Dev: Device;
    type Event: Event<Dev = Self::Dev>;

    /// `true` for queues whose enqueue waits for completion
    const BLOCKING: bool;

    fn dev(&self) -> Self::Dev;

    /// `true` once everything submitted so far has completed
    fn is_empty(&self) -> bool;
}

/// Submission of a task type to a queue
pub trait Enqueue<T: ?Sized>: Queue {
    fn enqueue(&self, task: &T) -> Result<()>;
}

/// Record an event at the current end of a queue
pub trait RecordEvent<E>: Queue {
    fn record(&self, event: &E) -> Result<()>;
}

/// Make later submissions wait for an event.
///
/// Implemented by queues (affects that queue) and by devices (affects every
/// queue of the device).
pub trait WaiterWaitFor<E> {
    fn wait_for(&self, event: &E) -> Result<()>;
}

/// Enqueue `task` on `queue`
pub fn enqueue<Q, T>(queue: &Q, task: &T) -> Result<()>
where
    Q: Enqueue<T>,
    T: ?Sized,
{
    queue.enqueue(task)
}
