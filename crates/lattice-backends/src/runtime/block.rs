//! Running the threads of one block on scoped OS threads

use super::barrier::{BlockBarrier, BARRIER_POISONED};
use lattice_core::{Error, Idx, Result, Vector};
use std::panic::{self, AssertUnwindSafe};
use std::thread;

/// Run `body` once per index of `block_thread_extent`, each on its own scoped thread.
///
/// A panicking body poisons `barrier` so siblings blocked in a sync are
/// released instead of waiting forever. The first genuine kernel panic is
/// returned; the secondary panics of released siblings are dropped.
pub(crate) fn run_block_threads<I, const D: usize, F>(
    backend: &'static str,
    block_thread_extent: Vector<I, D>,
    barrier: &BlockBarrier,
    body: F,
) -> Result<()>
where
    I: Idx,
    F: Fn(Vector<I, D>) + Sync,
{
    let count = block_thread_extent.prod().as_usize();
    debug_assert_eq!(count, barrier.count());

    let guarded = |thread_idx: Vector<I, D>| -> Result<()> {
        panic::catch_unwind(AssertUnwindSafe(|| body(thread_idx))).map_err(|payload| {
            barrier.poison();
            Error::from_panic(&*payload)
        })
    };

    if count == 1 {
        return guarded(Vector::zeros());
    }

    let results: Vec<Result<()>> = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(count);
        let mut spawn_error = None;
        for thread_idx in Vector::ndrange(block_thread_extent) {
            let guarded = &guarded;
            let spawned = thread::Builder::new()
                .name(format!("{backend}-thread-{thread_idx}"))
                .spawn_scoped(scope, move || guarded(thread_idx));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    barrier.poison();
                    spawn_error = Some(Error::backend(backend, format!("failed to spawn block thread: {err}")));
                    break;
                }
            }
        }
        let mut results: Vec<Result<()>> = handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|payload| Err(Error::from_panic(&*payload))))
            .collect();
        if let Some(err) = spawn_error {
            results.insert(0, Err(err));
        }
        results
    });

    first_error(results)
}

fn is_secondary(err: &Error) -> bool {
    matches!(err, Error::KernelPanicked(msg) if msg == BARRIER_POISONED)
}

/// First error that is not a sibling released from a poisoned barrier
pub(crate) fn first_error(results: impl IntoIterator<Item = Result<()>>) -> Result<()> {
    let mut fallback = None;
    for result in results {
        match result {
            Ok(()) => {}
            Err(err) if is_secondary(&err) => {
                fallback.get_or_insert(err);
            }
            Err(err) => return Err(err),
        }
    }
    fallback.map_or(Ok(()), Err)
}
