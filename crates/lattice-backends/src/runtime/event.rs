//! Completion token of the command-group runtime

use lattice_core::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Status {
    Pending,
    Complete,
    Failed(Error),
}

#[derive(Debug)]
struct State {
    status: Mutex<Status>,
    cond: Condvar,
}

/// Completion of one submitted command group.
///
/// A failed command stores its error; waiting on the event, or on any command
/// that depends on it, reports that error.
#[derive(Debug, Clone)]
pub struct NativeEvent(Arc<State>);

impl NativeEvent {
    pub fn pending() -> Self {
        Self(Arc::new(State {
            status: Mutex::new(Status::Pending),
            cond: Condvar::new(),
        }))
    }

    /// An event that is already complete
    pub fn completed() -> Self {
        let event = Self::pending();
        event.finish(Ok(()));
        event
    }

    pub(crate) fn finish(&self, result: Result<()>) {
        let mut status = self.0.status.lock();
        *status = match result {
            Ok(()) => Status::Complete,
            Err(err) => Status::Failed(err),
        };
        self.0.cond.notify_all();
    }

    pub fn is_complete(&self) -> bool {
        !matches!(*self.0.status.lock(), Status::Pending)
    }

    pub fn wait(&self) -> Result<()> {
        let mut status = self.0.status.lock();
        while matches!(*status, Status::Pending) {
            self.0.cond.wait(&mut status);
        }
        match &*status {
            Status::Failed(err) => Err(err.clone()),
            _ => Ok(()),
        }
    }
}

impl PartialEq for NativeEvent {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for NativeEvent {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_returns_after_finish() {
        let event = NativeEvent::pending();
        assert!(!event.is_complete());
        let remote = event.clone();
        let handle = std::thread::spawn(move || remote.wait());
        event.finish(Ok(()));
        assert!(handle.join().unwrap().is_ok());
        assert!(event.is_complete());
    }

    #[test]
    fn test_failure_is_reported() {
        let event = NativeEvent::pending();
        event.finish(Err(Error::KernelPanicked("x".into())));
        assert!(event.is_complete());
        assert_eq!(event.wait(), Err(Error::KernelPanicked("x".into())));
    }

    #[test]
    fn test_identity_equality() {
        let a = NativeEvent::completed();
        assert_eq!(a, a.clone());
        assert_ne!(a, NativeEvent::completed());
    }
}
