//! Static block shared memory for host backends

use lattice_core::{BlockSharedMem, DynSharedMem, SharedCell};
use std::any::{type_name, Any};
use std::mem::size_of;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

/// Number of distinct shared variable ids a block may declare
pub const SHARED_VAR_SLOTS: usize = 64;

type Slot = OnceLock<Box<dyn Any + Send + Sync>>;

/// Per-block table of shared variables keyed by id.
///
/// The first thread to declare an id constructs the value; later declarations
/// from any thread of the block get the same reference. Every construction is
/// charged against the block's shared memory budget.
pub struct BlockSharedMemSt {
    slots: Box<[Slot]>,
    used_bytes: AtomicUsize,
    capacity_bytes: usize,
}

impl BlockSharedMemSt {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            slots: (0..SHARED_VAR_SLOTS).map(|_| OnceLock::new()).collect(),
            used_bytes: AtomicUsize::new(0),
            capacity_bytes,
        }
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes.load(Ordering::Relaxed)
    }

    /// # Panics
    ///
    /// On an id outside [`SHARED_VAR_SLOTS`], a type mismatch with an earlier
    /// declaration of the same id, or an exhausted budget.
    pub fn declare<T: Default + Send + Sync + 'static, const ID: usize>(&self) -> &T {
        let Some(slot) = self.slots.get(ID) else {
            panic!("shared variable id {ID} exceeds the {SHARED_VAR_SLOTS} available slots");
        };
        let value = slot.get_or_init(|| {
            let size = size_of::<T>();
            let used = self.used_bytes.fetch_add(size, Ordering::Relaxed) + size;
            if used > self.capacity_bytes {
                panic!(
                    "block shared memory exhausted: {used} bytes requested, {} available",
                    self.capacity_bytes
                );
            }
            Box::new(T::default())
        });
        match (**value).downcast_ref::<T>() {
            Some(v) => v,
            None => panic!("shared variable id {ID} redeclared with type {}", type_name::<T>()),
        }
    }

    /// Drop every variable so the next block starts fresh
    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.take();
        }
        *self.used_bytes.get_mut() = 0;
    }
}

impl std::fmt::Debug for BlockSharedMemSt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockSharedMemSt")
            .field("used_bytes", &self.used_bytes())
            .field("capacity_bytes", &self.capacity_bytes)
            .finish()
    }
}

/// Shared memory of one block: static variables plus the dynamic region.
#[derive(Debug, Clone, Copy)]
pub struct BlockShared<'a> {
    pub(crate) st: &'a BlockSharedMemSt,
    pub(crate) dyn_mem: &'a DynSharedMem,
}

impl<'a> BlockShared<'a> {
    pub fn new(st: &'a BlockSharedMemSt, dyn_mem: &'a DynSharedMem) -> Self {
        Self { st, dyn_mem }
    }
}

impl BlockSharedMem for BlockShared<'_> {
    fn declare_shared_var<T: Default + Send + Sync + 'static, const ID: usize>(&self) -> &T {
        self.st.declare::<T, ID>()
    }

    fn block_shared_mem_dyn<T: bytemuck::Pod>(&self) -> &[SharedCell<T>] {
        self.dyn_mem.as_cells::<T>()
    }
}

/// Shared state of one block, reused across the blocks a worker runs
#[derive(Debug)]
pub(crate) struct BlockMemory {
    pub st: BlockSharedMemSt,
    pub dyn_mem: DynSharedMem,
}

impl BlockMemory {
    /// Split `budget` between the dynamic region and the static table
    pub fn new(budget: usize, dyn_bytes: usize) -> Self {
        Self {
            st: BlockSharedMemSt::new(budget.saturating_sub(dyn_bytes)),
            dyn_mem: DynSharedMem::new(dyn_bytes),
        }
    }

    pub fn shared(&self) -> BlockShared<'_> {
        BlockShared::new(&self.st, &self.dyn_mem)
    }

    pub fn reset(&mut self) {
        self.st.reset();
        self.dyn_mem.clear();
    }
}
