//! Host events

use super::DevCpu;
use lattice_core::{Event, Result, Wait};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    enqueued: u64,
    completed: u64,
}

struct EventCpuInner {
    dev: DevCpu,
    counters: Mutex<Counters>,
    cond: Condvar,
}

/// Completion token of the CPU queues.
///
/// Each enqueue hands out the next ticket; the event is complete once the
/// newest ticket has been reached. Re-enqueueing an event before its previous
/// position completes therefore makes it track only the newer position.
#[derive(Clone)]
pub struct EventCpu {
    inner: Arc<EventCpuInner>,
}

impl EventCpu {
    pub fn new(dev: &DevCpu) -> Self {
        Self {
            inner: Arc::new(EventCpuInner {
                dev: dev.clone(),
                counters: Mutex::new(Counters::default()),
                cond: Condvar::new(),
            }),
        }
    }

    pub(crate) fn mark_enqueued(&self) -> u64 {
        let mut counters = self.inner.counters.lock();
        counters.enqueued += 1;
        counters.enqueued
    }

    pub(crate) fn mark_complete(&self, ticket: u64) {
        let mut counters = self.inner.counters.lock();
        counters.completed = counters.completed.max(ticket);
        self.inner.cond.notify_all();
    }

    /// Ticket of the newest enqueued position
    pub(crate) fn current_ticket(&self) -> u64 {
        self.inner.counters.lock().enqueued
    }

    pub(crate) fn wait_ticket(&self, ticket: u64) {
        let mut counters = self.inner.counters.lock();
        while counters.completed < ticket {
            self.inner.cond.wait(&mut counters);
        }
    }
}

impl Wait for EventCpu {
    fn wait(&self) -> Result<()> {
        self.wait_ticket(self.current_ticket());
        Ok(())
    }
}

impl Event for EventCpu {
    type Dev = DevCpu;

    fn dev(&self) -> DevCpu {
        self.inner.dev.clone()
    }

    fn is_complete(&self) -> bool {
        let counters = self.inner.counters.lock();
        counters.completed >= counters.enqueued
    }
}

impl PartialEq for EventCpu {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for EventCpu {}

impl fmt::Debug for EventCpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counters = self.inner.counters.lock();
        f.debug_struct("EventCpu")
            .field("enqueued", &counters.enqueued)
            .field("completed", &counters.completed)
            .finish()
    }
}
