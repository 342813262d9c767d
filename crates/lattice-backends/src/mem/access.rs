//! Per-buffer access tracking
//!
//! Every buffer carries an [`AccessTracker`]. Tasks declare which buffers they
//! read or write through [`Requirements`]; while a task runs it holds the
//! matching read or write lock of every tracker it declared, so host copies,
//! fills and kernels touching the same buffer from different queues never
//! overlap. The command-group backend additionally chains each buffer's last
//! submitted use into the dependencies of the next command.

use crate::runtime::NativeEvent;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

#[derive(Default)]
pub struct AccessTracker {
    lock: RwLock<()>,
    last_use: Mutex<Option<NativeEvent>>,
}

impl AccessTracker {
    /// Replace the last submitted use, returning the previous one
    pub(crate) fn swap_last_use(&self, event: NativeEvent) -> Option<NativeEvent> {
        self.last_use.lock().replace(event)
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write()
    }
}

impl fmt::Debug for AccessTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTracker").field("addr", &(self as *const Self)).finish()
    }
}

/// Buffers a task reads or writes.
#[derive(Clone, Debug, Default)]
pub struct Requirements {
    entries: Vec<(Arc<AccessTracker>, AccessKind)>,
}

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an access; declaring a buffer twice keeps the stronger kind.
    pub fn require(&mut self, tracker: &Arc<AccessTracker>, kind: AccessKind) {
        match self.entries.iter_mut().find(|(t, _)| Arc::ptr_eq(t, tracker)) {
            Some(entry) => {
                if kind == AccessKind::Write {
                    entry.1 = AccessKind::Write;
                }
            }
            None => self.entries.push((Arc::clone(tracker), kind)),
        }
    }

    pub fn merge(&mut self, other: &Requirements) {
        for (tracker, kind) in &other.entries {
            self.require(tracker, *kind);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn kind_of(&self, tracker: &Arc<AccessTracker>) -> Option<AccessKind> {
        self.entries.iter().find(|(t, _)| Arc::ptr_eq(t, tracker)).map(|(_, k)| *k)
    }

    pub(crate) fn trackers(&self) -> impl Iterator<Item = &Arc<AccessTracker>> {
        self.entries.iter().map(|(t, _)| t)
    }

    /// Lock every declared buffer, always in address order.
    pub(crate) fn acquire(&self) -> AccessGuards<'_> {
        let mut ordered: Vec<&(Arc<AccessTracker>, AccessKind)> = self.entries.iter().collect();
        ordered.sort_by_key(|(t, _)| Arc::as_ptr(t) as usize);
        let guards = ordered
            .into_iter()
            .map(|(t, kind)| match kind {
                AccessKind::Read => AccessGuard::Read { _guard: t.read() },
                AccessKind::Write => AccessGuard::Write { _guard: t.write() },
            })
            .collect();
        AccessGuards { _guards: guards }
    }
}

enum AccessGuard<'a> {
    Read { _guard: RwLockReadGuard<'a, ()> },
    Write { _guard: RwLockWriteGuard<'a, ()> },
}

/// Held for the duration of a task; releases every buffer lock on drop
pub(crate) struct AccessGuards<'a> {
    _guards: Vec<AccessGuard<'a>>,
}

#[cfg(test)]
impl AccessGuards<'_> {
    fn len(&self) -> usize {
        self._guards.len()
    }
}
