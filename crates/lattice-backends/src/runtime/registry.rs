//! Device-side registry of live queues

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Weak list of the queues created on a device.
///
/// Queues register themselves on construction and hold a [`Registration`]
/// that removes the entry when they are dropped, so the device never keeps a
/// queue alive.
pub struct QueueRegistry<Q: ?Sized> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Weak<Q>)>>,
}

impl<Q: ?Sized> Default for QueueRegistry<Q> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<Q: ?Sized> QueueRegistry<Q> {
    pub fn register(self: &Arc<Self>, queue: Weak<Q>) -> Registration<Q> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, queue));
        Registration {
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Strong references to every queue still alive
    pub fn snapshot(&self) -> Vec<Arc<Q>> {
        let mut entries = self.entries.lock();
        entries.retain(|(_, q)| q.strong_count() > 0);
        entries.iter().filter_map(|(_, q)| q.upgrade()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().iter().filter(|(_, q)| q.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unregisters its queue on drop
pub struct Registration<Q: ?Sized> {
    id: u64,
    registry: Weak<QueueRegistry<Q>>,
}

impl<Q: ?Sized> Drop for Registration<Q> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.entries.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

impl<Q: ?Sized> std::fmt::Debug for Registration<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy {
        _registration: Registration<Dummy>,
    }

    #[test]
    fn test_register_and_drop() {
        let registry = Arc::new(QueueRegistry::<Dummy>::default());
        let a = Arc::new_cyclic(|weak| Dummy {
            _registration: registry.register(weak.clone()),
        });
        let b = Arc::new_cyclic(|weak| Dummy {
            _registration: registry.register(weak.clone()),
        });
        assert_eq!(registry.snapshot().len(), 2);
        drop(a);
        assert_eq!(registry.len(), 1);
        drop(b);
        assert!(registry.is_empty());
        assert!(registry.snapshot().is_empty());
    }
}
