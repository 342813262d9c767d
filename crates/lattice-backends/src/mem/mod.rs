//! Host memory: buffers, views, accessors and copy/fill tasks

pub mod access;
pub mod accessor;
pub mod buf;
pub mod task;

pub use access::{AccessKind, AccessTracker, Requirements};
pub use accessor::{mode, AccessMode, Accessor, Readable, Writable};
pub use buf::{Buf, SubView};
pub use task::{TaskMemcpy, TaskMemset};

use buf::BufStorage;
use bytemuck::Pod;
use lattice_core::{Idx, SharedCell, Vector};
use std::mem::size_of;
use std::sync::Arc;

/// Anything addressable as a strided block of `T`.
pub trait View<T: Pod, I: Idx, const D: usize> {
    fn view_ref(&self) -> ViewRef<T, I, D>;

    fn extent(&self) -> Vector<I, D>;

    /// Distance in bytes between neighbours along each dimension.
    ///
    /// Component `D-1` is the element size, `D-2` the row pitch.
    fn pitch_bytes(&self) -> Vector<usize, D> {
        self.view_ref().pitch_bytes()
    }
}

/// Native handle of a view: storage, element offset and pitches.
pub struct ViewRef<T, I, const D: usize> {
    pub(crate) storage: Arc<BufStorage<T>>,
    pub(crate) base: usize,
    pub(crate) extent: Vector<I, D>,
    /// Pitch in elements
    pub(crate) pitch: Vector<usize, D>,
}

impl<T, I: Copy, const D: usize> Clone for ViewRef<T, I, D> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            base: self.base,
            extent: self.extent,
            pitch: self.pitch,
        }
    }
}

impl<T: Pod, I: Idx, const D: usize> ViewRef<T, I, D> {
    pub fn pitch_elems(&self) -> Vector<usize, D> {
        self.pitch
    }

    pub fn pitch_bytes(&self) -> Vector<usize, D> {
        self.pitch.map(|p| p * size_of::<T>())
    }

    pub(crate) fn element_offset(&self, idx: &Vector<I, D>) -> usize {
        (0..D).map(|k| idx[k].as_usize() * self.pitch[k]).sum()
    }

    /// # Panics
    ///
    /// If `idx` lies outside the view's extent.
    pub(crate) fn cell(&self, idx: Vector<I, D>) -> &SharedCell<T> {
        assert!(
            idx.is_within(&self.extent),
            "index {idx} out of bounds for view extent {}",
            self.extent
        );
        &self.storage.cells[self.base + self.element_offset(&idx)]
    }

    pub(crate) fn get(&self, idx: Vector<I, D>) -> T {
        self.cell(idx).get()
    }

    pub(crate) fn tracker(&self) -> &Arc<AccessTracker> {
        &self.storage.tracker
    }
}

impl<T: Pod, I: Idx, const D: usize> View<T, I, D> for ViewRef<T, I, D> {
    fn view_ref(&self) -> ViewRef<T, I, D> {
        self.clone()
    }

    fn extent(&self) -> Vector<I, D> {
        self.extent
    }
}

pub(crate) fn row_major_pitch<I: Idx, const D: usize>(extent: &Vector<I, D>) -> Vector<usize, D> {
    let mut pitch = Vector::<usize, D>::ones();
    for k in (0..D.saturating_sub(1)).rev() {
        pitch[k] = pitch[k + 1] * extent[k + 1].as_usize();
    }
    pitch
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_pitch() {
        assert_eq!(row_major_pitch(&Vector::new([7u32])), Vector::new([1]));
        assert_eq!(row_major_pitch(&Vector::new([2u32, 3, 4])), Vector::new([12, 4, 1]));
    }
}
