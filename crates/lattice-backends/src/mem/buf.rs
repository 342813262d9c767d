//! Host buffers and sub-views

use super::access::AccessTracker;
use super::{row_major_pitch, View, ViewRef};
use bytemuck::Pod;
use lattice_core::{Error, Idx, Result, SharedCell, Vector};
use std::fmt;
use std::sync::Arc;

pub(crate) struct BufStorage<T> {
    pub(crate) cells: Box<[SharedCell<T>]>,
    pub(crate) tracker: Arc<AccessTracker>,
}

impl<T: Pod> BufStorage<T> {
    fn new(cells: Box<[SharedCell<T>]>) -> Arc<Self> {
        Arc::new(Self {
            cells,
            tracker: Arc::new(AccessTracker::default()),
        })
    }
}

/// Row-major host buffer with shared ownership.
///
/// Host memory is directly accessible by the CPU and command-group
/// accelerators; cloning a `Buf` shares the storage. Host reads and writes
/// through `to_vec` / `write` take the buffer's access lock, so they never
/// overlap a task that declared the buffer.
pub struct Buf<T, I, const D: usize> {
    storage: Arc<BufStorage<T>>,
    extent: Vector<I, D>,
}

impl<T, I: Copy, const D: usize> Clone for Buf<T, I, D> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            extent: self.extent,
        }
    }
}

impl<T: Pod, I: Idx, const D: usize> Buf<T, I, D> {
    /// Zero-initialized buffer
    pub fn zeros(extent: impl Into<Vector<I, D>>) -> Self {
        let extent = extent.into();
        let len = extent_len(&extent);
        let cells = (0..len).map(|_| SharedCell::new(T::zeroed())).collect();
        tracing::trace!(%extent, bytes = len * std::mem::size_of::<T>(), "allocated host buffer");
        Self {
            storage: BufStorage::new(cells),
            extent,
        }
    }

    /// # Errors
    ///
    /// [`Error::ExtentMismatch`] when `data` does not hold exactly `extent.prod()` elements.
    pub fn from_vec(extent: impl Into<Vector<I, D>>, data: Vec<T>) -> Result<Self> {
        let extent = extent.into();
        let len = extent_len(&extent);
        if data.len() != len {
            return Err(Error::extent_mismatch("buffer data", len, data.len()));
        }
        Ok(Self {
            storage: BufStorage::new(data.into_iter().map(SharedCell::new).collect()),
            extent,
        })
    }

    pub fn len(&self) -> usize {
        self.storage.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.cells.is_empty()
    }

    /// Copy the contents out in row-major order
    pub fn to_vec(&self) -> Vec<T> {
        let _guard = self.storage.tracker.read();
        self.storage.cells.iter().map(SharedCell::get).collect()
    }

    /// Overwrite the contents from row-major `data`
    pub fn write(&self, data: &[T]) -> Result<()> {
        if data.len() != self.len() {
            return Err(Error::extent_mismatch("host data", self.len(), data.len()));
        }
        let _guard = self.storage.tracker.write();
        for (cell, value) in self.storage.cells.iter().zip(data) {
            // SAFETY: the write lock excludes every task that declared this buffer
            // and every other host access.
            unsafe { cell.set(*value) };
        }
        Ok(())
    }

    /// Sub-view at `offset` with `extent`, sharing this buffer's storage
    pub fn sub_view(&self, offset: impl Into<Vector<I, D>>, extent: impl Into<Vector<I, D>>) -> Result<SubView<T, I, D>> {
        SubView::new(self, offset.into(), extent.into())
    }

    #[cfg(test)]
    pub(crate) fn tracker(&self) -> &Arc<AccessTracker> {
        &self.storage.tracker
    }
}

fn extent_len<I: Idx, const D: usize>(extent: &Vector<I, D>) -> usize {
    extent.iter().map(Idx::as_usize).product()
}

impl<T: Pod, I: Idx, const D: usize> View<T, I, D> for Buf<T, I, D> {
    fn view_ref(&self) -> ViewRef<T, I, D> {
        ViewRef {
            storage: Arc::clone(&self.storage),
            base: 0,
            extent: self.extent,
            pitch: row_major_pitch(&self.extent),
        }
    }

    fn extent(&self) -> Vector<I, D> {
        self.extent
    }
}

impl<T, I: fmt::Display, const D: usize> fmt::Debug for Buf<T, I, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buf")
            .field("extent", &format_args!("{}", self.extent))
            .field("elem", &std::any::type_name::<T>())
            .finish()
    }
}

/// Window into a parent view; shares the parent's storage and pitches.
pub struct SubView<T, I, const D: usize> {
    view: ViewRef<T, I, D>,
}

impl<T, I: Copy, const D: usize> Clone for SubView<T, I, D> {
    fn clone(&self) -> Self {
        Self { view: self.view.clone() }
    }
}

impl<T: Pod, I: Idx, const D: usize> SubView<T, I, D> {
    /// # Errors
    ///
    /// [`Error::OutOfBounds`] unless `offset + extent` fits inside the parent in every dimension.
    pub fn new<V: View<T, I, D> + ?Sized>(parent: &V, offset: Vector<I, D>, extent: Vector<I, D>) -> Result<Self> {
        let parent_ref = parent.view_ref();
        let fits = (0..D).all(|k| {
            offset[k] >= I::zero()
                && offset[k]
                    .checked_add(&extent[k])
                    .is_some_and(|end| end <= parent_ref.extent[k])
        });
        if !fits {
            return Err(Error::OutOfBounds {
                offset: offset.to_string(),
                extent: extent.to_string(),
                parent: parent_ref.extent.to_string(),
            });
        }
        let base = parent_ref.base + parent_ref.element_offset(&offset);
        Ok(Self {
            view: ViewRef { base, extent, ..parent_ref },
        })
    }
}

impl<T: Pod, I: Idx, const D: usize> View<T, I, D> for SubView<T, I, D> {
    fn view_ref(&self) -> ViewRef<T, I, D> {
        self.view.clone()
    }

    fn extent(&self) -> Vector<I, D> {
        self.view.extent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_checks_length() {
        let err = Buf::<u32, u32, 2>::from_vec([2, 3], vec![0; 5]).unwrap_err();
        assert!(matches!(err, Error::ExtentMismatch { .. }));
        let buf = Buf::<u32, u32, 2>::from_vec([2, 3], (0..6).collect()).unwrap();
        assert_eq!(buf.to_vec(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_pitch_bytes_row_major() {
        let buf = Buf::<f32, usize, 3>::zeros([4, 3, 5]);
        assert_eq!(buf.pitch_bytes(), Vector::new([60, 20, 4]));
    }

    #[test]
    fn test_sub_view_offsets_into_parent() {
        let buf = Buf::<u32, u32, 2>::from_vec([3, 4], (0..12).collect()).unwrap();
        let sub = buf.sub_view([1, 1], [2, 2]).unwrap();
        let view = sub.view_ref();
        assert_eq!(view.get(Vector::new([0, 0])), 5);
        assert_eq!(view.get(Vector::new([1, 1])), 10);
        assert_eq!(sub.pitch_bytes(), buf.pitch_bytes());
    }

    #[test]
    fn test_sub_view_bounds_checked() {
        let buf = Buf::<u8, u32, 2>::zeros([3, 4]);
        assert!(matches!(buf.sub_view([2, 0], [2, 4]), Err(Error::OutOfBounds { .. })));
        assert!(buf.sub_view([2, 0], [1, 4]).is_ok());
        let sub = buf.sub_view([1, 1], [2, 3]).unwrap();
        assert!(SubView::new(&sub, Vector::new([1, 1]), Vector::new([1, 3])).is_err());
    }

    #[test]
    fn test_write_replaces_contents() {
        let buf = Buf::<i64, u32, 1>::zeros(4u32);
        buf.write(&[1, 2, 3, 4]).unwrap();
        assert_eq!(buf.clone().to_vec(), vec![1, 2, 3, 4]);
        assert!(buf.write(&[1]).is_err());
    }
}
