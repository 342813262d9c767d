//! Block shared memory primitives
//!
//! Shared memory is visible to every thread of one block and lives for that
//! block's execution only. Values handed out by the static allocator are plain
//! `&T`, so mutation goes through interior mutability: atomics for contended
//! updates, [`SharedCell`] for data each thread writes exclusively.

use bytemuck::Pod;
use std::cell::UnsafeCell;
use std::fmt;
use std::mem::{align_of, size_of};
use std::ops::Deref;

/// Unsynchronized cell shared between the threads of a block.
///
/// Reading is safe. Writing is `unsafe`: the caller guarantees no other thread
/// reads or writes the same cell until the next barrier (or kernel end).
#[repr(transparent)]
pub struct SharedCell<T>(UnsafeCell<T>);

// SAFETY: every write goes through `set`, whose contract forbids concurrent access
// to the same cell, so shared references never observe a data race.
unsafe impl<T: Send> Sync for SharedCell<T> {}

impl<T> SharedCell<T> {
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    pub fn into_inner(self) -> T {
        self.0.into_inner()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.0.get_mut()
    }
}

impl<T: Copy> SharedCell<T> {
    pub fn get(&self) -> T {
        // SAFETY: concurrent writers are excluded by the contract of `set`.
        unsafe { *self.0.get() }
    }

    /// Store `value`.
    ///
    /// # Safety
    ///
    /// No other thread may access this cell concurrently.
    pub unsafe fn set(&self, value: T) {
        // SAFETY: exclusive access is guaranteed by the caller.
        unsafe { *self.0.get() = value }
    }
}

impl<T: Default> Default for SharedCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Copy + fmt::Debug> fmt::Debug for SharedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedCell").field(&self.get()).finish()
    }
}

/// Fixed-size array usable as a shared variable for any `N`.
pub struct BlockArray<T, const N: usize>([T; N]);

impl<T: Default, const N: usize> Default for BlockArray<T, N> {
    fn default() -> Self {
        Self(std::array::from_fn(|_| T::default()))
    }
}

impl<T, const N: usize> Deref for BlockArray<T, N> {
    type Target = [T; N];

    fn deref(&self) -> &[T; N] {
        &self.0
    }
}

#[derive(Clone, Copy)]
#[repr(C, align(16))]
struct Word([u8; 16]);

const WORD: usize = size_of::<Word>();

/// Zero-initialized dynamic shared memory of one block.
///
/// Viewed as a slice of [`SharedCell<T>`] for any plain-old-data `T`.
pub struct DynSharedMem {
    words: Box<[SharedCell<Word>]>,
    len_bytes: usize,
}

impl DynSharedMem {
    pub fn new(len_bytes: usize) -> Self {
        let words = len_bytes.div_ceil(WORD);
        Self {
            words: (0..words).map(|_| SharedCell::new(Word([0; WORD]))).collect(),
            len_bytes,
        }
    }

    pub fn len_bytes(&self) -> usize {
        self.len_bytes
    }

    /// Typed view of the whole region.
    ///
    /// # Panics
    ///
    /// Panics if `T` needs more than 16-byte alignment.
    pub fn as_cells<T: Pod>(&self) -> &[SharedCell<T>] {
        assert!(
            align_of::<T>() <= align_of::<Word>(),
            "dynamic shared memory supports alignment up to {} bytes",
            align_of::<Word>()
        );
        let size = size_of::<T>();
        if size == 0 {
            return &[];
        }
        let len = self.len_bytes / size;
        // SAFETY: `SharedCell<T>` is a transparent `UnsafeCell<T>`, which has the layout of
        // `T`. The storage holds at least `len * size` zeroed bytes aligned to 16, and `T: Pod`
        // is valid for any bit pattern. Writes are only possible through `SharedCell::set`.
        unsafe { std::slice::from_raw_parts(self.words.as_ptr().cast::<SharedCell<T>>(), len) }
    }

    /// Zero the region for the next block
    pub fn clear(&mut self) {
        for word in self.words.iter_mut() {
            *word.get_mut() = Word([0; WORD]);
        }
    }
}

impl fmt::Debug for DynSharedMem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynSharedMem").field("len_bytes", &self.len_bytes).finish()
    }
}

/// Block shared memory capability of an accelerator.
pub trait BlockSharedMem {
    /// Block-wide variable identified by `ID`.
    ///
    /// The first thread of the block to ask constructs it with `T::default()`;
    /// every thread of the block receives the same reference.
    ///
    /// # Panics
    ///
    /// Panics if `ID` was already declared with a different type in this block,
    /// or if the block's shared memory budget is exhausted.
    fn declare_shared_var<T: Default + Send + Sync + 'static, const ID: usize>(&self) -> &T;

    /// Dynamic shared memory sized by the kernel before launch
    fn block_shared_mem_dyn<T: Pod>(&self) -> &[SharedCell<T>];
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_shared_cell_get_set() {
        let cell = SharedCell::new(3u32);
        unsafe { cell.set(9) };
        assert_eq!(cell.get(), 9);
        assert_eq!(cell.into_inner(), 9);
    }

    #[test]
    fn test_block_array_default_any_length() {
        let arr = BlockArray::<AtomicU32, 100>::default();
        arr[99].fetch_add(2, Ordering::Relaxed);
        assert_eq!(arr.len(), 100);
        assert_eq!(arr[99].load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_dyn_shared_mem_views() {
        let mut mem = DynSharedMem::new(10);
        assert_eq!(mem.as_cells::<u32>().len(), 2);
        assert_eq!(mem.as_cells::<u8>().len(), 10);
        assert!(mem.as_cells::<u64>().iter().all(|c| c.get() == 0));

        unsafe { mem.as_cells::<u32>()[1].set(0xdead_beef) };
        assert_eq!(mem.as_cells::<u32>()[1].get(), 0xdead_beef);
        mem.clear();
        assert_eq!(mem.as_cells::<u32>()[1].get(), 0);
    }

    #[test]
    fn test_dyn_shared_mem_empty() {
        let mem = DynSharedMem::new(0);
        assert!(mem.as_cells::<f32>().is_empty());
    }
}
