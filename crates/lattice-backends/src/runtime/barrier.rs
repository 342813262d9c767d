//! Counting barrier for the threads of one host block

use lattice_core::{BlockSync, SyncOp};
use parking_lot::{Condvar, Mutex};

/// Panic message of threads released from a barrier that another thread abandoned
pub(crate) const BARRIER_POISONED: &str = "block barrier poisoned by a failing thread";

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    reduction: i32,
    result: i32,
    poisoned: bool,
}

/// Reusable barrier for a fixed number of threads.
///
/// Each round is one generation. The last thread to arrive publishes the round's
/// predicate reduction and advances the generation; a result can only be
/// overwritten once every thread has arrived at the next round, so waiters
/// always read their own round's value.
#[derive(Debug)]
pub struct BlockBarrier {
    count: usize,
    state: Mutex<BarrierState>,
    cond: Condvar,
}

impl BlockBarrier {
    pub fn new(count: usize) -> Self {
        Self {
            count: count.max(1),
            state: Mutex::new(BarrierState::default()),
            cond: Condvar::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Wait for every thread, folding `predicate` into the round's reduction.
    ///
    /// # Panics
    ///
    /// Panics with [`BARRIER_POISONED`] if the barrier was poisoned.
    pub fn wait_reduce(&self, init: i32, fold: fn(i32, bool) -> i32, predicate: bool) -> i32 {
        let mut state = self.state.lock();
        if state.poisoned {
            panic!("{BARRIER_POISONED}");
        }
        if state.arrived == 0 {
            state.reduction = init;
        }
        state.reduction = fold(state.reduction, predicate);
        state.arrived += 1;

        if state.arrived == self.count {
            state.arrived = 0;
            state.result = state.reduction;
            state.generation = state.generation.wrapping_add(1);
            self.cond.notify_all();
            return state.result;
        }

        let generation = state.generation;
        while state.generation == generation && !state.poisoned {
            self.cond.wait(&mut state);
        }
        if state.generation == generation {
            panic!("{BARRIER_POISONED}");
        }
        state.result
    }

    pub fn wait(&self) {
        self.wait_reduce(0, |acc, _| acc, false);
    }

    /// Release every waiter; later waits panic.
    pub fn poison(&self) {
        let mut state = self.state.lock();
        state.poisoned = true;
        self.cond.notify_all();
    }
}

impl BlockSync for BlockBarrier {
    fn sync_block_threads(&self) {
        self.wait();
    }

    fn sync_block_threads_predicate<P: SyncOp>(&self, predicate: bool) -> i32 {
        self.wait_reduce(P::INIT, P::fold, predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::sync_op::{BlockAnd, BlockCount, BlockOr};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_barrier_orders_phases() {
        let n = 8;
        let barrier = BlockBarrier::new(n);
        let phase_one = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..n {
                s.spawn(|| {
                    phase_one.fetch_add(1, Ordering::SeqCst);
                    barrier.wait();
                    assert_eq!(phase_one.load(Ordering::SeqCst), n);
                    barrier.wait();
                });
            }
        });
    }

    #[test]
    fn test_predicate_reduction_repeated_rounds() {
        let n = 17;
        let barrier = BlockBarrier::new(n);
        std::thread::scope(|s| {
            for t in 0..n {
                let barrier = &barrier;
                s.spawn(move || {
                    for k in 0..=n {
                        let count = barrier.sync_block_threads_predicate::<BlockCount>(t < k);
                        assert_eq!(count, k as i32);
                        let all = barrier.sync_block_threads_predicate::<BlockAnd>(t < k);
                        assert_eq!(all, i32::from(k == n));
                        let any = barrier.sync_block_threads_predicate::<BlockOr>(t < k);
                        assert_eq!(any, i32::from(k > 0));
                    }
                });
            }
        });
    }

    #[test]
    fn test_poison_releases_waiters() {
        let barrier = BlockBarrier::new(3);
        std::thread::scope(|s| {
            let waiter = s.spawn(|| std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| barrier.wait())));
            std::thread::sleep(std::time::Duration::from_millis(20));
            barrier.poison();
            assert!(waiter.join().unwrap().is_err());
        });
    }
}
