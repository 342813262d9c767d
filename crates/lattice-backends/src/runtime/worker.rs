//! Dedicated in-order worker thread backing non-blocking queues

use lattice_core::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Default)]
struct Progress {
    submitted: u64,
    finished: u64,
}

#[derive(Debug, Default)]
struct Shared {
    progress: Mutex<Progress>,
    idle: Condvar,
}

/// Runs submitted jobs one at a time, in submission order.
///
/// Dropping the worker lets queued jobs finish, then joins the thread.
pub struct InOrderWorker {
    name: String,
    sender: Mutex<Option<Sender<Job>>>,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl InOrderWorker {
    pub fn spawn(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Job>();
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);
        let thread_name = name.clone();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                for job in receiver {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                        let err = Error::from_panic(&*payload);
                        tracing::error!(worker = %thread_name, error = %err, "queue job panicked");
                    }
                    let mut progress = worker_shared.progress.lock();
                    progress.finished += 1;
                    if progress.finished == progress.submitted {
                        worker_shared.idle.notify_all();
                    }
                }
            })
            .map_err(|err| Error::backend("host", format!("failed to spawn queue worker {name}: {err}")))?;

        tracing::trace!(worker = %name, "queue worker started");
        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            shared,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn submit(&self, job: Job) -> Result<()> {
        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or(Error::QueueClosed)?;
        self.shared.progress.lock().submitted += 1;
        sender.send(job).map_err(|_| {
            let mut progress = self.shared.progress.lock();
            progress.submitted -= 1;
            Error::QueueClosed
        })
    }

    pub fn is_idle(&self) -> bool {
        let progress = self.shared.progress.lock();
        progress.finished == progress.submitted
    }

    /// Block until every job submitted so far has run
    pub fn wait_idle(&self) {
        let mut progress = self.shared.progress.lock();
        while progress.finished != progress.submitted {
            self.shared.idle.wait(&mut progress);
        }
    }
}

impl std::fmt::Debug for InOrderWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InOrderWorker").field("name", &self.name).field("idle", &self.is_idle()).finish()
    }
}

impl Drop for InOrderWorker {
    fn drop(&mut self) {
        self.sender.lock().take();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                // Last reference dropped by one of our own jobs; the loop ends on its own.
                return;
            }
            if handle.join().is_err() {
                tracing::error!(worker = %self.name, "queue worker terminated abnormally");
            }
        }
    }
}
