//! In-process command-group runtime
//!
//! The native layer the command-group backend binds to. A [`NativeContext`]
//! carries fixed device limits. A [`NativeQueue`] executes command groups in
//! submission order on its own worker thread; each command group is described
//! through a [`Handler`] (explicit dependencies, buffer requirements and one
//! command), and every buffer's previous use becomes an implicit dependency.
//!
//! `parallel_for` runs the work groups of an [`NdRange`] in parallel on the
//! rayon pool. The work items of one group run on scoped OS threads sharing a
//! barrier, a reduction counter and the group's local memory.

use crate::mem::Requirements;
use crate::runtime::block::run_block_threads;
use crate::runtime::shared_st::BlockMemory;
use crate::runtime::{BlockBarrier, BlockShared, InOrderWorker, NativeEvent};
use lattice_core::{Error, Result, Vector};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

pub(crate) const BACKEND: &str = "graph";

/// Largest work group the runtime accepts
pub const GRAPH_MAX_WORK_GROUP_SIZE: usize = 1024;

/// Local memory per work group
pub const GRAPH_LOCAL_MEM_BYTES: usize = 64 * 1024;

/// Device limits and launch bookkeeping shared by every queue of a device.
#[derive(Debug)]
pub struct NativeContext {
    name: String,
    compute_units: usize,
    max_work_group_size: usize,
    local_mem_bytes: usize,
    launches: AtomicU64,
}

impl NativeContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            compute_units: rayon::current_num_threads(),
            max_work_group_size: GRAPH_MAX_WORK_GROUP_SIZE,
            local_mem_bytes: GRAPH_LOCAL_MEM_BYTES,
            launches: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn compute_units(&self) -> usize {
        self.compute_units
    }

    pub fn max_work_group_size(&self) -> usize {
        self.max_work_group_size
    }

    pub fn local_mem_bytes(&self) -> usize {
        self.local_mem_bytes
    }

    /// `parallel_for` commands submitted so far
    pub fn launch_count(&self) -> u64 {
        self.launches.load(Ordering::Relaxed)
    }
}

/// Global and local sizes of a `parallel_for`; global is a multiple of local.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NdRange<const D: usize> {
    global: Vector<usize, D>,
    local: Vector<usize, D>,
}

impl<const D: usize> NdRange<D> {
    pub fn new(global: Vector<usize, D>, local: Vector<usize, D>) -> Result<Self> {
        if !local.is_positive() || !global.is_positive() {
            return Err(Error::backend(BACKEND, format!("empty nd-range: global {global}, local {local}")));
        }
        if (0..D).any(|k| global[k] % local[k] != 0) {
            return Err(Error::backend(
                BACKEND,
                format!("nd-range global size {global} is not a multiple of local size {local}"),
            ));
        }
        Ok(Self { global, local })
    }

    pub fn global(&self) -> Vector<usize, D> {
        self.global
    }

    pub fn local(&self) -> Vector<usize, D> {
        self.local
    }

    pub fn group_range(&self) -> Vector<usize, D> {
        self.global.zip_with(&self.local, |g, l| g / l)
    }
}

/// State shared by the work items of one group
pub(crate) struct GroupContext {
    barrier: BlockBarrier,
    memory: BlockMemory,
    counter: AtomicI32,
}

impl GroupContext {
    fn new(items: usize, local_mem_bytes: usize, dyn_local_bytes: usize) -> Self {
        Self {
            barrier: BlockBarrier::new(items),
            memory: BlockMemory::new(local_mem_bytes, dyn_local_bytes),
            counter: AtomicI32::new(0),
        }
    }
}

/// One work item's view of the nd-range it runs in.
pub struct NdItem<'g, const D: usize> {
    group: Vector<usize, D>,
    local_id: Vector<usize, D>,
    range: NdRange<D>,
    ctx: &'g GroupContext,
}

impl<'g, const D: usize> NdItem<'g, D> {
    pub fn group(&self) -> Vector<usize, D> {
        self.group
    }

    pub fn group_range(&self) -> Vector<usize, D> {
        self.range.group_range()
    }

    pub fn local_id(&self) -> Vector<usize, D> {
        self.local_id
    }

    pub fn local_range(&self) -> Vector<usize, D> {
        self.range.local
    }

    pub fn global_id(&self) -> Vector<usize, D> {
        self.group * self.range.local + self.local_id
    }

    pub fn global_range(&self) -> Vector<usize, D> {
        self.range.global
    }

    pub fn local_linear_id(&self) -> usize {
        self.local_id.linearize(&self.range.local)
    }

    /// Group-wide barrier
    pub fn barrier(&self) {
        self.ctx.barrier.wait();
    }

    pub(crate) fn group_counter(&self) -> &'g AtomicI32 {
        &self.ctx.counter
    }

    pub(crate) fn local_memory(&self) -> BlockShared<'g> {
        self.ctx.memory.shared()
    }
}

impl<const D: usize> fmt::Debug for NdItem<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NdItem")
            .field("group", &format_args!("{}", self.group))
            .field("local_id", &format_args!("{}", self.local_id))
            .finish()
    }
}

fn run_nd_range<const D: usize, F>(range: NdRange<D>, local_mem_bytes: usize, dyn_local_bytes: usize, kernel: &F) -> Result<()>
where
    F: Fn(&NdItem<'_, D>) + Sync,
{
    let groups = range.group_range();
    let items = range.local.prod();
    (0..groups.prod()).into_par_iter().try_for_each(|linear| {
        let group = Vector::from_linear(linear, &groups);
        let ctx = GroupContext::new(items, local_mem_bytes, dyn_local_bytes);
        run_block_threads(BACKEND, range.local, &ctx.barrier, |local_id| {
            kernel(&NdItem {
                group,
                local_id,
                range,
                ctx: &ctx,
            });
        })
    })
}

type Command = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CommandKind {
    Kernel,
    Host,
}

/// Builder of one command group.
pub struct Handler {
    ctx: Arc<NativeContext>,
    dependencies: Vec<NativeEvent>,
    requirements: Requirements,
    dyn_local_bytes: usize,
    command: Option<(CommandKind, Command)>,
}

impl Handler {
    fn new(ctx: Arc<NativeContext>) -> Self {
        Self {
            ctx,
            dependencies: Vec::new(),
            requirements: Requirements::new(),
            dyn_local_bytes: 0,
            command: None,
        }
    }

    pub fn depends_on(&mut self, event: &NativeEvent) {
        self.dependencies.push(event.clone());
    }

    pub fn depends_on_all(&mut self, events: impl IntoIterator<Item = NativeEvent>) {
        self.dependencies.extend(events);
    }

    /// Buffers the command reads or writes
    pub fn requirements_mut(&mut self) -> &mut Requirements {
        &mut self.requirements
    }

    /// Reserve dynamic local memory for every work group of the next `parallel_for`
    pub fn set_dyn_local_mem(&mut self, bytes: usize) -> Result<()> {
        if bytes > self.ctx.local_mem_bytes {
            return Err(Error::backend(
                BACKEND,
                format!("{bytes} bytes of local memory requested, device has {}", self.ctx.local_mem_bytes),
            ));
        }
        self.dyn_local_bytes = bytes;
        Ok(())
    }

    fn set_command(&mut self, kind: CommandKind, command: Command) -> Result<()> {
        if self.command.is_some() {
            return Err(Error::backend(BACKEND, "a command group holds exactly one command"));
        }
        self.command = Some((kind, command));
        Ok(())
    }

    /// Run `kernel` once per work item of `range`.
    pub fn parallel_for<const D: usize, F>(&mut self, range: NdRange<D>, kernel: F) -> Result<()>
    where
        F: Fn(&NdItem<'_, D>) + Send + Sync + 'static,
    {
        let group_size = range.local.prod();
        if group_size > self.ctx.max_work_group_size {
            return Err(Error::backend(
                BACKEND,
                format!(
                    "work group of {group_size} items exceeds the device maximum of {}",
                    self.ctx.max_work_group_size
                ),
            ));
        }
        let local_mem_bytes = self.ctx.local_mem_bytes;
        let dyn_local_bytes = self.dyn_local_bytes;
        self.set_command(
            CommandKind::Kernel,
            Box::new(move || run_nd_range(range, local_mem_bytes, dyn_local_bytes, &kernel)),
        )
    }

    /// Run `f` on the queue's worker once the dependencies completed.
    pub fn host_task<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.set_command(CommandKind::Host, Box::new(f))
    }
}

/// An in-order native queue.
pub struct NativeQueue {
    ctx: Arc<NativeContext>,
    worker: InOrderWorker,
    error: Arc<Mutex<Option<Error>>>,
}

impl NativeQueue {
    pub fn new(ctx: Arc<NativeContext>, name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            worker: InOrderWorker::spawn(name)?,
            ctx,
            error: Arc::new(Mutex::new(None)),
        })
    }

    pub fn context(&self) -> &Arc<NativeContext> {
        &self.ctx
    }

    /// Build a command group with `cgf` and schedule it.
    ///
    /// The command waits for its explicit dependencies and the previous use of
    /// every buffer it requires, then holds the buffers' access locks while it
    /// runs. A failed dependency fails the command with the same error.
    pub fn submit(&self, cgf: impl FnOnce(&mut Handler) -> Result<()>) -> Result<NativeEvent> {
        let mut handler = Handler::new(Arc::clone(&self.ctx));
        cgf(&mut handler)?;
        let Handler {
            mut dependencies,
            requirements,
            command,
            ..
        } = handler;
        let (kind, command) = command.ok_or_else(|| Error::backend(BACKEND, "command group submitted no command"))?;

        let event = NativeEvent::pending();
        for tracker in requirements.trackers() {
            if let Some(previous) = tracker.swap_last_use(event.clone()) {
                dependencies.push(previous);
            }
        }
        dependencies.retain(|dep| !dep.is_complete() || dep.wait().is_err());
        tracing::trace!(?kind, dependencies = dependencies.len(), buffers = requirements.len(), "submitting command group");

        let done = event.clone();
        let error = Arc::clone(&self.error);
        let submitted = self.worker.submit(Box::new(move || {
            let result = dependencies.iter().try_for_each(NativeEvent::wait).and_then(|()| {
                let _guards = requirements.acquire();
                command()
            });
            if let Err(err) = &result {
                tracing::error!(error = %err, "command group failed");
                error.lock().get_or_insert_with(|| err.clone());
            }
            done.finish(result);
        }));
        if let Err(err) = submitted {
            event.finish(Err(err.clone()));
            return Err(err);
        }
        if kind == CommandKind::Kernel {
            self.ctx.launches.fetch_add(1, Ordering::Relaxed);
        }
        Ok(event)
    }

    pub fn is_idle(&self) -> bool {
        self.worker.is_idle()
    }

    /// Wait for every submitted command and return the first failure since the last wait.
    pub fn wait(&self) -> Result<()> {
        self.worker.wait_idle();
        self.take_error().map_or(Ok(()), Err)
    }

    pub(crate) fn take_error(&self) -> Option<Error> {
        self.error.lock().take()
    }
}

impl fmt::Debug for NativeQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeQueue")
            .field("device", &self.ctx.name)
            .field("worker", &self.worker)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{AccessKind, Buf};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn queue() -> NativeQueue {
        NativeQueue::new(Arc::new(NativeContext::new("test")), "test-native-queue").unwrap()
    }

    #[test]
    fn test_nd_range_requires_divisible_global() {
        assert!(NdRange::new(Vector::new([8usize, 6]), Vector::new([4, 3])).is_ok());
        let err = NdRange::new(Vector::new([8usize]), Vector::new([3])).unwrap_err();
        assert!(matches!(err, Error::Backend { backend: "graph", .. }));
        assert_eq!(
            NdRange::new(Vector::new([8usize, 6]), Vector::new([4, 3])).unwrap().group_range(),
            Vector::new([2, 2])
        );
    }

    #[test]
    fn test_parallel_for_visits_every_item() {
        let queue = queue();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let range = NdRange::new(Vector::new([4usize, 6]), Vector::new([2, 3])).unwrap();
        let event = queue
            .submit(|h| {
                h.parallel_for(range, move |item: &NdItem<'_, 2>| {
                    item.barrier();
                    seen.fetch_add(1 << item.global_id().linearize(&Vector::new([4, 6])), Ordering::Relaxed);
                })
            })
            .unwrap();
        event.wait().unwrap();
        assert_eq!(hits.load(Ordering::Relaxed), (1 << 24) - 1);
        assert_eq!(queue.context().launch_count(), 1);
    }

    #[test]
    fn test_oversized_group_rejected_without_launch() {
        let queue = queue();
        let range = NdRange::new(Vector::new([2048usize]), Vector::new([2048])).unwrap();
        let err = queue.submit(|h| h.parallel_for(range, |_: &NdItem<'_, 1>| {})).unwrap_err();
        assert!(matches!(err, Error::Backend { .. }));
        assert_eq!(queue.context().launch_count(), 0);
    }

    #[test]
    fn test_buffer_use_orders_queues() {
        let ctx = Arc::new(NativeContext::new("test"));
        let first = NativeQueue::new(Arc::clone(&ctx), "first").unwrap();
        let second = NativeQueue::new(ctx, "second").unwrap();
        let buf = Buf::<u32, u32, 1>::zeros(1u32);
        let order = Arc::new(Mutex::new(Vec::new()));

        let (log, tracker) = (Arc::clone(&order), Arc::clone(buf.tracker()));
        first
            .submit(|h| {
                h.requirements_mut().require(&tracker, AccessKind::Write);
                h.host_task(move || {
                    std::thread::sleep(Duration::from_millis(20));
                    log.lock().push("write");
                    Ok(())
                })
            })
            .unwrap();
        let log = Arc::clone(&order);
        let read = second
            .submit(|h| {
                h.requirements_mut().require(&tracker, AccessKind::Read);
                h.host_task(move || {
                    log.lock().push("read");
                    Ok(())
                })
            })
            .unwrap();
        read.wait().unwrap();
        assert_eq!(*order.lock(), vec!["write", "read"]);
    }

    #[test]
    fn test_failed_dependency_fails_dependent() {
        let queue = queue();
        let failed = queue.submit(|h| h.host_task(|| Err(Error::unsupported("boom")))).unwrap();
        let dependent = queue
            .submit(|h| {
                h.depends_on(&failed);
                h.host_task(|| Ok(()))
            })
            .unwrap();
        assert_eq!(dependent.wait(), Err(Error::unsupported("boom")));
        assert_eq!(queue.wait(), Err(Error::unsupported("boom")));
        assert_eq!(queue.wait(), Ok(()));
    }

    #[test]
    fn test_command_group_needs_one_command() {
        let queue = queue();
        assert!(queue.submit(|_| Ok(())).is_err());
        let err = queue
            .submit(|h| {
                h.host_task(|| Ok(()))?;
                h.host_task(|| Ok(()))
            })
            .unwrap_err();
        assert!(matches!(err, Error::Backend { .. }));
    }
}
