//! Events recorded into command-group queues

use super::DevGraph;
use crate::runtime::NativeEvent;
use lattice_core::{Event, Result, Wait};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

struct EventGraphInner {
    dev: DevGraph,
    native: Mutex<Option<NativeEvent>>,
}

/// Completion token of a command-group queue position.
///
/// An event never recorded counts as complete. Recording it again moves it to
/// the newest position.
#[derive(Clone)]
pub struct EventGraph {
    inner: Arc<EventGraphInner>,
}

impl EventGraph {
    pub fn new(dev: &DevGraph) -> Self {
        Self {
            inner: Arc::new(EventGraphInner {
                dev: dev.clone(),
                native: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn set_native(&self, native: NativeEvent) {
        *self.inner.native.lock() = Some(native);
    }

    /// The native event of the latest recording
    pub fn native(&self) -> Option<NativeEvent> {
        self.inner.native.lock().clone()
    }
}

impl Wait for EventGraph {
    fn wait(&self) -> Result<()> {
        match self.native() {
            Some(native) => native.wait(),
            None => Ok(()),
        }
    }
}

impl Event for EventGraph {
    type Dev = DevGraph;

    fn dev(&self) -> DevGraph {
        self.inner.dev.clone()
    }

    fn is_complete(&self) -> bool {
        self.native().map_or(true, |native| native.is_complete())
    }
}

impl PartialEq for EventGraph {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for EventGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventGraph").field("complete", &self.is_complete()).finish()
    }
}
