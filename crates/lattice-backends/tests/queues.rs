//! Ordering, events and memory tasks across CPU and command-group queues

use lattice_backends::mem::{mode, Accessor, Buf, TaskMemcpy, TaskMemset};
use lattice_backends::{
    create_task_kernel, CpuThreads, DevCpu, DevGraph, EventCpu, EventGraph, PlatformCpu, PlatformGraph,
    QueueCpuBlocking, QueueCpuNonBlocking, QueueGraphNonBlocking, TaskHost, TaskKernelGraph,
};
use lattice_core::workdiv::{origin::Grid, unit::Threads};
use lattice_core::{
    current_thread_wait_for, Acc, Device, Enqueue, Error, Event, Kernel, Platform, Queue, RecordEvent, Vector, Wait,
    WaiterWaitFor, WorkDivMembers,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

type Log = Arc<Mutex<Vec<u32>>>;

fn step(log: &Log, value: u32, delay_ms: u64) -> TaskHost<impl Fn() -> lattice_core::Result<()> + Send + Sync + 'static> {
    let log = Arc::clone(log);
    TaskHost::new(move || {
        std::thread::sleep(Duration::from_millis(delay_ms));
        log.lock().push(value);
        Ok(())
    })
}

/// Doubles every element in place
struct Double;

impl Kernel<u32, 1, Accessor<u32, u32, 1, mode::ReadWrite>> for Double {
    fn call<A: Acc<u32, 1>>(&self, acc: &A, data: &Accessor<u32, u32, 1, mode::ReadWrite>) {
        let i = acc.idx::<Grid, Threads>();
        let value = data.get(i);
        // SAFETY: one element per thread.
        unsafe { data.set(i, value * 2) };
    }
}

#[test]
fn test_cpu_non_blocking_queue_keeps_submission_order() {
    let dev = DevCpu::new();
    let queue = QueueCpuNonBlocking::new(&dev).unwrap();
    let log = Log::default();
    for (value, delay) in [(1, 15), (2, 0), (3, 5), (4, 0)] {
        queue.enqueue(&step(&log, value, delay)).unwrap();
    }
    current_thread_wait_for(&queue).unwrap();
    assert!(queue.is_empty());
    assert_eq!(*log.lock(), vec![1, 2, 3, 4]);
}

#[test]
fn test_graph_non_blocking_queue_keeps_submission_order() {
    let dev = DevGraph::new();
    let queue = QueueGraphNonBlocking::new(&dev).unwrap();
    let log = Log::default();
    for (value, delay) in [(1, 15), (2, 0), (3, 5), (4, 0)] {
        queue.enqueue(&step(&log, value, delay)).unwrap();
    }
    queue.wait().unwrap();
    assert!(queue.is_empty());
    assert_eq!(*log.lock(), vec![1, 2, 3, 4]);
}

#[test]
fn test_cpu_event_orders_two_queues() {
    let dev = DevCpu::new();
    let first = QueueCpuNonBlocking::new(&dev).unwrap();
    let second = QueueCpuNonBlocking::new(&dev).unwrap();
    let log = Log::default();
    let event = EventCpu::new(&dev);

    first.enqueue(&step(&log, 1, 20)).unwrap();
    first.record(&event).unwrap();
    second.wait_for(&event).unwrap();
    second.enqueue(&step(&log, 2, 0)).unwrap();

    second.wait().unwrap();
    assert!(event.is_complete());
    assert_eq!(*log.lock(), vec![1, 2]);
}

#[test]
fn test_graph_event_orders_two_queues() {
    let dev = DevGraph::new();
    let first = QueueGraphNonBlocking::new(&dev).unwrap();
    let second = QueueGraphNonBlocking::new(&dev).unwrap();
    let log = Log::default();
    let event = EventGraph::new(&dev);

    first.enqueue(&step(&log, 1, 20)).unwrap();
    first.record(&event).unwrap();
    second.wait_for(&event).unwrap();
    second.enqueue(&step(&log, 2, 0)).unwrap();

    second.wait().unwrap();
    assert!(event.is_complete());
    assert_eq!(*log.lock(), vec![1, 2]);
}

#[test]
fn test_graph_wait_for_survives_rejected_submission() {
    let dev = DevGraph::new();
    let producer = QueueGraphNonBlocking::new(&dev).unwrap();
    let consumer = QueueGraphNonBlocking::new(&dev).unwrap();
    let log = Log::default();
    let event = EventGraph::new(&dev);

    producer.enqueue(&step(&log, 1, 100)).unwrap();
    producer.record(&event).unwrap();
    consumer.wait_for(&event).unwrap();

    let data = Buf::<u32, u32, 1>::zeros(4096);
    let oversized = WorkDivMembers::new(Vector::ones(), Vector::new([4096u32]), Vector::ones());
    let err = consumer
        .enqueue(&TaskKernelGraph::new(&oversized, Double, data.access::<mode::ReadWrite>()))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidWorkDiv(_)), "{err}");

    consumer.enqueue(&step(&log, 2, 0)).unwrap();
    consumer.wait().unwrap();
    assert_eq!(*log.lock(), vec![1, 2]);
    assert_eq!(dev.native_launch_count(), 0);
}

#[test]
fn test_device_wait_drains_every_queue() {
    let dev = DevCpu::new();
    let queues: Vec<_> = (0..3).map(|_| QueueCpuNonBlocking::new(&dev).unwrap()).collect();
    let log = Log::default();
    for (i, queue) in queues.iter().enumerate() {
        queue.enqueue(&step(&log, i as u32, 10)).unwrap();
    }
    dev.wait().unwrap();
    assert!(queues.iter().all(Queue::is_empty));
    assert_eq!(log.lock().len(), 3);
    assert_eq!(dev.queue_count(), 3);
    drop(queues);
    assert_eq!(dev.queue_count(), 0);
}

#[test]
fn test_memset_then_copy_region_on_cpu() {
    let dev = DevCpu::new();
    let queue = QueueCpuBlocking::new(&dev);
    let src = Buf::<u8, u32, 2>::zeros([3, 4]);
    let dst = Buf::<u8, u32, 2>::zeros([3, 4]);

    queue.enqueue(&TaskMemset::new(&src, 0xab, [3, 4]).unwrap()).unwrap();
    let corner = dst.sub_view([1, 2], [2, 2]).unwrap();
    queue.enqueue(&TaskMemcpy::new(&corner, &src, [2, 2]).unwrap()).unwrap();

    let expected: Vec<u8> = (0..3)
        .flat_map(|r| (0..4).map(move |c| if r >= 1 && c >= 2 { 0xab } else { 0 }))
        .collect();
    assert_eq!(dst.to_vec(), expected);
    assert_eq!(dev.native_launch_count(), 0);
}

#[test]
fn test_kernel_then_copy_on_graph_non_blocking() {
    let dev = DevGraph::new();
    let queue = QueueGraphNonBlocking::new(&dev).unwrap();
    let data = Buf::<u32, u32, 1>::from_vec(16, (0..16).collect()).unwrap();
    let host = Buf::<u32, u32, 1>::zeros(16);
    let wd = WorkDivMembers::new(Vector::new([2u32]), Vector::new([8]), Vector::ones());

    queue.enqueue(&TaskKernelGraph::new(&wd, Double, data.access::<mode::ReadWrite>())).unwrap();
    queue.enqueue(&TaskMemcpy::new(&host, &data, 16).unwrap()).unwrap();
    queue.wait().unwrap();

    assert_eq!(host.to_vec(), (0..16).map(|v| v * 2).collect::<Vec<u32>>());
}

#[test]
fn test_buffer_use_orders_queues_without_events() {
    let dev = DevGraph::new();
    let writer = QueueGraphNonBlocking::new(&dev).unwrap();
    let reader = QueueGraphNonBlocking::new(&dev).unwrap();
    let data = Buf::<u32, u32, 1>::from_vec(64, vec![1; 64]).unwrap();
    let host = Buf::<u32, u32, 1>::zeros(64);
    let wd = WorkDivMembers::new(Vector::new([4u32]), Vector::new([16]), Vector::ones());

    writer.enqueue(&TaskKernelGraph::new(&wd, Double, data.access::<mode::ReadWrite>())).unwrap();
    reader.enqueue(&TaskMemcpy::new(&host, &data, 64).unwrap()).unwrap();
    reader.wait().unwrap();
    writer.wait().unwrap();

    assert_eq!(host.to_vec(), vec![2; 64]);
}

#[test]
fn test_cpu_kernel_and_copy_on_non_blocking_queue() {
    let dev = DevCpu::new();
    let queue = QueueCpuNonBlocking::new(&dev).unwrap();
    let data = Buf::<u32, u32, 1>::from_vec(32, (0..32).collect()).unwrap();
    let host = Buf::<u32, u32, 1>::zeros(32);
    let wd = WorkDivMembers::new(Vector::new([4u32]), Vector::new([8]), Vector::ones());

    let task = create_task_kernel::<CpuThreads, u32, 1, _, _, _>(&wd, Double, data.access::<mode::ReadWrite>());
    queue.enqueue(&task).unwrap();
    queue.enqueue(&task).unwrap();
    queue.enqueue(&TaskMemcpy::new(&host, &data, 32).unwrap()).unwrap();
    queue.wait().unwrap();

    assert_eq!(host.to_vec(), (0..32).map(|v| v * 4).collect::<Vec<u32>>());
    assert_eq!(dev.native_launch_count(), 2);
}

#[test]
fn test_copy_larger_than_destination_rejected() {
    let small = Buf::<u32, u32, 1>::zeros(4);
    let large = Buf::<u32, u32, 1>::zeros(8);
    let err = TaskMemcpy::new(&small, &large, 8).unwrap_err();
    assert!(matches!(err, Error::ExtentMismatch { .. }), "{err}");
}

#[test]
fn test_platforms_enumerate_devices() {
    let cpu = PlatformCpu::new();
    assert_eq!(cpu.dev_count(), 1);
    assert!(!cpu.dev_by_idx(0).unwrap().name().is_empty());
    assert!(matches!(cpu.dev_by_idx(1), Err(Error::DeviceIndexOutOfRange { index: 1, count: 1 })));

    let graph = PlatformGraph::with_device_count(2);
    assert_eq!(graph.dev_count(), 2);
    let dev = graph.dev_by_idx(1).unwrap();
    assert_eq!(dev.index(), 1);
    assert!(dev.memory_bytes() >= dev.free_memory_bytes());
}
