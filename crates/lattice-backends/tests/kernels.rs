//! Kernel semantics shared by every host-side backend

use lattice_backends::mem::{mode, Accessor, Buf, TaskMemcpy};
use lattice_backends::{
    create_task_kernel, CpuAccKind, CpuBlocks, CpuSerial, CpuThreads, DevCpu, DevGraph, KernelArgs, QueueCpuBlocking,
    QueueGraphBlocking, TaskKernelGraph,
};
use lattice_core::atomic::hierarchy::{Blocks as BlockLevel, Grids};
use lattice_core::sync_op::{BlockAnd, BlockCount, BlockOr};
use lattice_core::workdiv::origin::{Block, Grid, Thread};
use lattice_core::workdiv::unit::{Blocks, Elems, Threads};
use lattice_core::{Acc, Add, Device, Enqueue, Error, Kernel, Result, Vector, WorkDivMembers};
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;

type Counters = Arc<Vec<AtomicU32>>;

/// Launches one kernel on a fresh device of some backend
type Runner<const D: usize, K, Args> = fn(&WorkDivMembers<u32, D>, K, Args) -> Result<()>;

fn counters(len: usize) -> Counters {
    Arc::new((0..len).map(|_| AtomicU32::new(0)).collect())
}

fn snapshot(counters: &Counters) -> Vec<u32> {
    counters.iter().map(|c| c.load(Ordering::Relaxed)).collect()
}

fn run_cpu<Kind, const D: usize, K, Args>(wd: &WorkDivMembers<u32, D>, kernel: K, args: Args) -> Result<()>
where
    Kind: CpuAccKind,
    K: Kernel<u32, D, Args>,
    Args: KernelArgs,
{
    let dev = DevCpu::new();
    let queue = QueueCpuBlocking::new(&dev);
    queue.enqueue(&create_task_kernel::<Kind, u32, D, K, Args, _>(wd, kernel, args))
}

fn run_graph<const D: usize, K, Args>(wd: &WorkDivMembers<u32, D>, kernel: K, args: Args) -> Result<()>
where
    K: Kernel<u32, D, Args> + 'static,
    Args: KernelArgs,
{
    let dev = DevGraph::new();
    let queue = QueueGraphBlocking::new(&dev)?;
    queue.enqueue(&TaskKernelGraph::new(wd, kernel, args))
}

/// Counts how often each grid element is visited
struct VisitElements;

impl Kernel<u32, 2, Counters> for VisitElements {
    fn call<A: Acc<u32, 2>>(&self, acc: &A, hits: &Counters) {
        let elems = acc.work_div::<Thread, Elems>();
        let grid_elems = acc.work_div::<Grid, Elems>();
        let first = acc.idx::<Grid, Threads>() * elems;
        for e in Vector::ndrange(elems) {
            let linear = (first + e).linearize(&grid_elems) as usize;
            hits[linear].fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn assert_every_element_once(hits: &Counters) {
    assert!(snapshot(hits).iter().all(|&h| h == 1), "{:?}", snapshot(hits));
}

#[test]
fn test_every_element_visited_once_on_single_thread_blocks() {
    let wd = WorkDivMembers::new(Vector::new([4u32, 6]), Vector::ones(), Vector::new([2, 3]));
    let runs: [Runner<2, VisitElements, Counters>; 2] = [run_cpu::<CpuSerial, 2, _, _>, run_cpu::<CpuBlocks, 2, _, _>];
    for run in runs {
        let hits = counters(8 * 18);
        run(&wd, VisitElements, hits.clone()).unwrap();
        assert_every_element_once(&hits);
    }
}

#[test]
fn test_every_element_visited_once_with_block_threads() {
    let wd = WorkDivMembers::new(Vector::new([2u32, 3]), Vector::new([2, 4]), Vector::new([3, 1]));
    let len = (2 * 2 * 3) * (3 * 4);

    let hits = counters(len);
    run_cpu::<CpuThreads, 2, _, _>(&wd, VisitElements, hits.clone()).unwrap();
    assert_every_element_once(&hits);

    let hits = counters(len);
    run_graph(&wd, VisitElements, hits.clone()).unwrap();
    assert_every_element_once(&hits);
}

/// Block `b` votes with its first `b` threads; thread 0 stores count, and, or.
struct Vote;

impl Kernel<u32, 1, Arc<Vec<AtomicI32>>> for Vote {
    fn call<A: Acc<u32, 1>>(&self, acc: &A, out: &Arc<Vec<AtomicI32>>) {
        let block = acc.idx::<Grid, Blocks>()[0];
        let t = acc.idx::<Block, Threads>()[0];
        let vote = t < block;
        let count = acc.sync_block_threads_predicate::<BlockCount>(vote);
        let all = acc.sync_block_threads_predicate::<BlockAnd>(vote);
        let any = acc.sync_block_threads_predicate::<BlockOr>(vote);
        if t == 0 {
            let base = 3 * block as usize;
            out[base].store(count, Ordering::Relaxed);
            out[base + 1].store(all, Ordering::Relaxed);
            out[base + 2].store(any, Ordering::Relaxed);
        }
    }
}

fn check_votes(n: u32, out: &Arc<Vec<AtomicI32>>) {
    for k in 0..=n {
        let base = 3 * k as usize;
        let got: Vec<i32> = (0..3).map(|i| out[base + i].load(Ordering::Relaxed)).collect();
        let want = vec![k as i32, i32::from(k == n), i32::from(k > 0)];
        assert_eq!(got, want, "block size {n}, {k} true votes");
    }
}

#[test]
fn test_predicate_barriers_for_every_vote_count() {
    for n in [1u32, 2, 17, 256] {
        let wd = WorkDivMembers::new(Vector::new([n + 1]), Vector::new([n]), Vector::ones());
        let fresh = || Arc::new((0..3 * (n as usize + 1)).map(|_| AtomicI32::new(-1)).collect::<Vec<_>>());

        let out = fresh();
        run_cpu::<CpuThreads, 1, _, _>(&wd, Vote, out.clone()).unwrap();
        check_votes(n, &out);

        let out = fresh();
        run_graph(&wd, Vote, out.clone()).unwrap();
        check_votes(n, &out);
    }
}

#[test]
fn test_predicate_barrier_with_single_thread_blocks() {
    let wd = WorkDivMembers::new(Vector::new([2u32]), Vector::ones(), Vector::ones());
    let runs: [Runner<1, Vote, Arc<Vec<AtomicI32>>>; 2] = [run_cpu::<CpuSerial, 1, _, _>, run_cpu::<CpuBlocks, 1, _, _>];
    for run in runs {
        let out = Arc::new((0..6).map(|_| AtomicI32::new(-1)).collect::<Vec<_>>());
        run(&wd, Vote, out.clone()).unwrap();
        check_votes(1, &out);
    }
}

/// Grid-wide add of 1; marks the previous value each thread observed.
struct GridAdd;

impl Kernel<u32, 1, (Arc<AtomicU32>, Counters)> for GridAdd {
    fn call<A: Acc<u32, 1>>(&self, acc: &A, (total, seen): &(Arc<AtomicU32>, Counters)) {
        let old = acc.atomic_op::<Add, Grids, _>(&**total, 1);
        seen[old as usize].fetch_add(1, Ordering::Relaxed);
    }
}

fn check_grid_add(n: u32, total: &Arc<AtomicU32>, seen: &Counters) {
    assert_eq!(total.load(Ordering::Relaxed), n);
    // Previous values form a permutation of 0..n
    assert!(snapshot(seen).iter().all(|&s| s == 1));
}

#[test]
fn test_grid_atomic_add_counts_every_thread() {
    for n in [1u32, 64, 1024] {
        let one_per_block = WorkDivMembers::new(Vector::new([n]), Vector::ones(), Vector::ones());
        let runs: [Runner<1, GridAdd, (Arc<AtomicU32>, Counters)>; 2] =
            [run_cpu::<CpuSerial, 1, _, _>, run_cpu::<CpuBlocks, 1, _, _>];
        for run in runs {
            let (total, seen) = (Arc::new(AtomicU32::new(0)), counters(n as usize));
            run(&one_per_block, GridAdd, (total.clone(), seen.clone())).unwrap();
            check_grid_add(n, &total, &seen);
        }

        let one_block = WorkDivMembers::new(Vector::new([1u32]), Vector::new([n]), Vector::ones());
        let (total, seen) = (Arc::new(AtomicU32::new(0)), counters(n as usize));
        run_cpu::<CpuThreads, 1, _, _>(&one_block, GridAdd, (total.clone(), seen.clone())).unwrap();
        check_grid_add(n, &total, &seen);

        let (total, seen) = (Arc::new(AtomicU32::new(0)), counters(n as usize));
        run_graph(&one_block, GridAdd, (total.clone(), seen.clone())).unwrap();
        check_grid_add(n, &total, &seen);
    }
}

/// Compare-and-swap that must not write on a mismatch
struct CasProbe;

impl Kernel<u32, 1, Counters> for CasProbe {
    fn call<A: Acc<u32, 1>>(&self, acc: &A, out: &Counters) {
        let target = AtomicU32::new(5);
        let miss = acc.atomic_cas::<Grids, _>(&target, 3, 9);
        let after_miss = target.load(Ordering::Relaxed);
        let hit = acc.atomic_cas::<Grids, _>(&target, 5, 9);
        for (slot, value) in out.iter().zip([miss, after_miss, hit, target.load(Ordering::Relaxed)]) {
            slot.store(value, Ordering::Relaxed);
        }
    }
}

#[test]
fn test_cas_leaves_target_alone_on_mismatch() {
    let wd = WorkDivMembers::new(Vector::new([1u32]), Vector::ones(), Vector::ones());
    let runs: [Runner<1, CasProbe, Counters>; 4] = [
        run_cpu::<CpuSerial, 1, _, _>,
        run_cpu::<CpuBlocks, 1, _, _>,
        run_cpu::<CpuThreads, 1, _, _>,
        run_graph::<1, _, _>,
    ];
    for run in runs {
        let out = counters(4);
        run(&wd, CasProbe, out.clone()).unwrap();
        assert_eq!(snapshot(&out), vec![5, 5, 5, 9]);
    }
}

/// Writes `row * 100 + col` through an accessor
struct Stamp;

type StampOut = Accessor<u32, u32, 2, mode::WriteOnly>;

impl Kernel<u32, 2, StampOut> for Stamp {
    fn call<A: Acc<u32, 2>>(&self, acc: &A, out: &StampOut) {
        let idx = acc.idx::<Grid, Threads>();
        // SAFETY: each thread owns exactly one element.
        unsafe { out.set(idx, idx[0] * 100 + idx[1]) };
    }
}

fn expected_stamps() -> Vec<u32> {
    (0..4).flat_map(|r| (0..8).map(move |c| r * 100 + c)).collect()
}

#[test]
fn test_accessor_writes_copied_back_on_cpu() {
    let dev = DevCpu::new();
    let queue = QueueCpuBlocking::new(&dev);
    let wd = WorkDivMembers::new(Vector::new([4u32, 8]), Vector::ones(), Vector::ones());
    let device_buf = Buf::<u32, u32, 2>::zeros([4, 8]);
    let host_buf = Buf::<u32, u32, 2>::zeros([4, 8]);

    let task = create_task_kernel::<CpuSerial, u32, 2, _, _, _>(&wd, Stamp, device_buf.access::<mode::WriteOnly>());
    queue.enqueue(&task).unwrap();
    queue.enqueue(&TaskMemcpy::new(&host_buf, &device_buf, [4, 8]).unwrap()).unwrap();
    assert_eq!(host_buf.to_vec(), expected_stamps());
    assert_eq!(dev.native_launch_count(), 1);
}

#[test]
fn test_accessor_writes_copied_back_on_graph() {
    let dev = DevGraph::new();
    let queue = QueueGraphBlocking::new(&dev).unwrap();
    let wd = WorkDivMembers::new(Vector::new([2u32, 1]), Vector::new([2, 8]), Vector::ones());
    let device_buf = Buf::<u32, u32, 2>::zeros([4, 8]);
    let host_buf = Buf::<u32, u32, 2>::zeros([4, 8]);

    queue
        .enqueue(&TaskKernelGraph::new(&wd, Stamp, device_buf.access::<mode::WriteOnly>()))
        .unwrap();
    queue.enqueue(&TaskMemcpy::new(&host_buf, &device_buf, [4, 8]).unwrap()).unwrap();
    assert_eq!(host_buf.to_vec(), expected_stamps());
    assert_eq!(dev.native_launch_count(), 1);
}

/// Block-scoped add into a shared counter, published per block by thread 0
struct SharedTally;

impl Kernel<u32, 1, Counters> for SharedTally {
    fn call<A: Acc<u32, 1>>(&self, acc: &A, out: &Counters) {
        let counter = acc.declare_shared_var::<AtomicU32, 0>();
        acc.atomic_op::<Add, BlockLevel, _>(counter, 1);
        acc.sync_block_threads();
        if acc.idx::<Block, Threads>()[0] == 0 {
            let block = acc.idx::<Grid, Blocks>()[0] as usize;
            out[block].store(counter.load(Ordering::Relaxed), Ordering::Relaxed);
        }
    }
}

#[test]
fn test_block_atomic_add_on_shared_counter() {
    let wd = WorkDivMembers::new(Vector::new([6u32]), Vector::new([256]), Vector::ones());
    let runners: [Runner<1, SharedTally, Counters>; 2] = [run_cpu::<CpuThreads, 1, _, _>, run_graph];

    for run in runners {
        let out = counters(6);
        run(&wd, SharedTally, out.clone()).unwrap();
        assert_eq!(snapshot(&out), vec![256; 6]);
    }
}

struct Noop;

impl Kernel<u32, 1> for Noop {
    fn call<A: Acc<u32, 1>>(&self, _acc: &A, _: &()) {}
}

#[test]
fn test_oversized_block_rejected_before_launch() {
    let wd = WorkDivMembers::new(Vector::new([1u32]), Vector::new([2048]), Vector::ones());

    let dev = DevCpu::new();
    let queue = QueueCpuBlocking::new(&dev);
    let err = queue
        .enqueue(&create_task_kernel::<CpuThreads, u32, 1, _, _, _>(&wd, Noop, ()))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidWorkDiv(_)), "{err}");
    assert_eq!(dev.native_launch_count(), 0);

    let dev = DevGraph::new();
    let queue = QueueGraphBlocking::new(&dev).unwrap();
    let err = queue.enqueue(&TaskKernelGraph::new(&wd, Noop, ())).unwrap_err();
    assert!(matches!(err, Error::InvalidWorkDiv(_)), "{err}");
    assert_eq!(dev.native_launch_count(), 0);
    assert_eq!(dev.context().launch_count(), 0);
}

#[test]
fn test_multi_thread_block_rejected_on_single_thread_accelerators() {
    let wd = WorkDivMembers::new(Vector::new([1u32]), Vector::new([2]), Vector::ones());
    let runs: [Runner<1, Noop, ()>; 2] = [run_cpu::<CpuSerial, 1, _, _>, run_cpu::<CpuBlocks, 1, _, _>];
    for run in runs {
        assert!(matches!(run(&wd, Noop, ()), Err(Error::InvalidWorkDiv(_))));
    }
}

/// Writes the flattened global thread index
struct GlobalIndex;

type IndexOut = Accessor<i32, u32, 1, mode::WriteOnly>;

impl Kernel<u32, 1, IndexOut> for GlobalIndex {
    fn call<A: Acc<u32, 1>>(&self, acc: &A, out: &IndexOut) {
        let i = acc.idx::<Grid, Threads>()[0];
        // SAFETY: one element per thread.
        unsafe { out.set(i, i as i32) };
    }
}

#[test]
fn test_four_blocks_of_eight_write_their_global_index() {
    let wd = WorkDivMembers::new(Vector::new([4u32]), Vector::new([8]), Vector::ones());
    let expected: Vec<i32> = (0..32).collect();

    let dev = DevCpu::new();
    let queue = QueueCpuBlocking::new(&dev);
    let device_buf = Buf::<i32, u32, 1>::zeros(32);
    let host_buf = Buf::<i32, u32, 1>::zeros(32);
    let task =
        create_task_kernel::<CpuThreads, u32, 1, _, _, _>(&wd, GlobalIndex, device_buf.access::<mode::WriteOnly>());
    queue.enqueue(&task).unwrap();
    queue.enqueue(&TaskMemcpy::new(&host_buf, &device_buf, 32).unwrap()).unwrap();
    assert_eq!(host_buf.to_vec(), expected);

    let dev = DevGraph::new();
    let queue = QueueGraphBlocking::new(&dev).unwrap();
    let device_buf = Buf::<i32, u32, 1>::zeros(32);
    let host_buf = Buf::<i32, u32, 1>::zeros(32);
    queue
        .enqueue(&TaskKernelGraph::new(&wd, GlobalIndex, device_buf.access::<mode::WriteOnly>()))
        .unwrap();
    queue.enqueue(&TaskMemcpy::new(&host_buf, &device_buf, 32).unwrap()).unwrap();
    assert_eq!(host_buf.to_vec(), expected);
}

/// Records (grid block, block thread) pairs
struct RecordIdx;

impl Kernel<u32, 2, Counters> for RecordIdx {
    fn call<A: Acc<u32, 2>>(&self, acc: &A, seen: &Counters) {
        let grid = acc.work_div::<Grid, Blocks>();
        let block = acc.work_div::<Block, Threads>();
        let b = acc.idx::<Grid, Blocks>().linearize(&grid);
        let t = acc.idx::<Block, Threads>().linearize(&block);
        seen[(b * block.prod() + t) as usize].fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn test_block_and_thread_indices_cover_the_product() {
    let wd = WorkDivMembers::new(Vector::new([3u32, 2]), Vector::new([2, 5]), Vector::ones());
    let len = 6 * 10;

    let seen = counters(len);
    run_cpu::<CpuThreads, 2, _, _>(&wd, RecordIdx, seen.clone()).unwrap();
    assert_every_element_once(&seen);

    let seen = counters(len);
    run_graph(&wd, RecordIdx, seen.clone()).unwrap();
    assert_every_element_once(&seen);

    let single = WorkDivMembers::new(Vector::new([3u32, 2]), Vector::ones(), Vector::ones());
    let runs: [Runner<2, RecordIdx, Counters>; 2] = [run_cpu::<CpuSerial, 2, _, _>, run_cpu::<CpuBlocks, 2, _, _>];
    for run in runs {
        let seen = counters(6);
        run(&single, RecordIdx, seen.clone()).unwrap();
        assert_every_element_once(&seen);
    }
}

/// Stores the three extents seen by the kernel: G, B then E, two components each
struct ReportWorkDiv;

impl Kernel<u32, 2, Counters> for ReportWorkDiv {
    fn call<A: Acc<u32, 2>>(&self, acc: &A, out: &Counters) {
        let extents = [
            acc.work_div::<Grid, Blocks>(),
            acc.work_div::<Block, Threads>(),
            acc.work_div::<Thread, Elems>(),
        ];
        for (k, v) in extents.iter().flat_map(|e| e.iter()).enumerate() {
            out[k].store(v, Ordering::Relaxed);
        }
    }
}

mod work_div_consistency {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_kernels_see_the_launched_work_div(
            g in (1u32..4, 1u32..4),
            b in (1u32..5, 1u32..5),
            e in (1u32..4, 1u32..4),
        ) {
            let want = vec![g.0, g.1, b.0, b.1, e.0, e.1];

            let wd = WorkDivMembers::new(Vector::new([g.0, g.1]), Vector::new([b.0, b.1]), Vector::new([e.0, e.1]));
            let runs: [Runner<2, ReportWorkDiv, Counters>; 2] = [run_cpu::<CpuThreads, 2, _, _>, run_graph::<2, _, _>];
            for run in runs {
                let out = counters(6);
                run(&wd, ReportWorkDiv, out.clone()).unwrap();
                prop_assert_eq!(snapshot(&out), want.clone());
            }

            let single = WorkDivMembers::new(Vector::new([g.0, g.1]), Vector::ones(), Vector::new([e.0, e.1]));
            let want_single = vec![g.0, g.1, 1, 1, e.0, e.1];
            let runs: [Runner<2, ReportWorkDiv, Counters>; 2] = [run_cpu::<CpuSerial, 2, _, _>, run_cpu::<CpuBlocks, 2, _, _>];
            for run in runs {
                let out = counters(6);
                run(&single, ReportWorkDiv, out.clone()).unwrap();
                prop_assert_eq!(snapshot(&out), want_single.clone());
            }
        }
    }
}
