//! Copy and fill tasks over views

use super::access::{AccessKind, Requirements};
use super::{View, ViewRef};
use bytemuck::Pod;
use lattice_core::{Error, Idx, Result, Vector};
use std::fmt;
use std::mem::size_of;
use std::time::Instant;

fn check_fits<I: Idx, const D: usize>(what: &'static str, extent: &Vector<I, D>, available: &Vector<I, D>) -> Result<()> {
    if (0..D).all(|k| extent[k] <= available[k]) {
        Ok(())
    } else {
        Err(Error::extent_mismatch(what, extent, available))
    }
}

/// Copy `extent` elements from one view to another.
///
/// Enqueueable on CPU and command-group queues.
pub struct TaskMemcpy<T, I, const D: usize> {
    dst: ViewRef<T, I, D>,
    src: ViewRef<T, I, D>,
    extent: Vector<I, D>,
}

impl<T: Pod, I: Idx, const D: usize> TaskMemcpy<T, I, D> {
    /// # Errors
    ///
    /// [`Error::ExtentMismatch`] when `extent` exceeds either view.
    pub fn new<Dst, Src>(dst: &Dst, src: &Src, extent: impl Into<Vector<I, D>>) -> Result<Self>
    where
        Dst: View<T, I, D> + ?Sized,
        Src: View<T, I, D> + ?Sized,
    {
        let extent = extent.into();
        check_fits("memcpy destination", &extent, &dst.extent())?;
        check_fits("memcpy source", &extent, &src.extent())?;
        Ok(Self {
            dst: dst.view_ref(),
            src: src.view_ref(),
            extent,
        })
    }

    pub fn extent(&self) -> Vector<I, D> {
        self.extent
    }

    pub fn requirements(&self) -> Requirements {
        let mut reqs = Requirements::new();
        reqs.require(self.src.tracker(), AccessKind::Read);
        reqs.require(self.dst.tracker(), AccessKind::Write);
        reqs
    }

    /// Copy on the calling thread, holding both buffers' access locks.
    pub(crate) fn execute(&self) -> Result<()> {
        let requirements = self.requirements();
        let _guards = requirements.acquire();
        self.execute_locked()
    }

    /// Copy assuming the caller already holds the locks of [`Self::requirements`].
    pub(crate) fn execute_locked(&self) -> Result<()> {
        let start = Instant::now();
        for idx in Vector::ndrange(self.extent) {
            let value = self.src.get(idx);
            // SAFETY: the destination's write lock is held, so no task or host access
            // can touch the buffer concurrently.
            unsafe { self.dst.cell(idx).set(value) };
        }
        let elems: usize = self.extent.iter().map(Idx::as_usize).product();
        lattice_tracing::performance::record_transfer(elems * size_of::<T>(), start.elapsed().as_micros() as u64);
        Ok(())
    }
}

impl<T, I: Copy, const D: usize> Clone for TaskMemcpy<T, I, D> {
    fn clone(&self) -> Self {
        Self {
            dst: self.dst.clone(),
            src: self.src.clone(),
            extent: self.extent,
        }
    }
}

impl<T, I: Idx, const D: usize> fmt::Debug for TaskMemcpy<T, I, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskMemcpy")
            .field("extent", &format_args!("{}", self.extent))
            .field("elem_bytes", &size_of::<T>())
            .finish()
    }
}

/// Set every byte of `extent` elements of a view to one value.
pub struct TaskMemset<T, I, const D: usize> {
    dst: ViewRef<T, I, D>,
    byte: u8,
    extent: Vector<I, D>,
}

impl<T: Pod, I: Idx, const D: usize> TaskMemset<T, I, D> {
    /// # Errors
    ///
    /// [`Error::ExtentMismatch`] when `extent` exceeds the view.
    pub fn new<Dst: View<T, I, D> + ?Sized>(dst: &Dst, byte: u8, extent: impl Into<Vector<I, D>>) -> Result<Self> {
        let extent = extent.into();
        check_fits("memset destination", &extent, &dst.extent())?;
        Ok(Self {
            dst: dst.view_ref(),
            byte,
            extent,
        })
    }

    pub fn requirements(&self) -> Requirements {
        let mut reqs = Requirements::new();
        reqs.require(self.dst.tracker(), AccessKind::Write);
        reqs
    }

    /// The element value whose every byte is the fill byte
    pub fn value(&self) -> T {
        bytemuck::pod_read_unaligned(&vec![self.byte; size_of::<T>()])
    }

    pub(crate) fn execute(&self) -> Result<()> {
        let requirements = self.requirements();
        let _guards = requirements.acquire();
        self.execute_locked()
    }

    pub(crate) fn execute_locked(&self) -> Result<()> {
        let value = self.value();
        for idx in Vector::ndrange(self.extent) {
            // SAFETY: the destination's write lock is held.
            unsafe { self.dst.cell(idx).set(value) };
        }
        Ok(())
    }
}

impl<T, I: Copy, const D: usize> Clone for TaskMemset<T, I, D> {
    fn clone(&self) -> Self {
        Self {
            dst: self.dst.clone(),
            byte: self.byte,
            extent: self.extent,
        }
    }
}

impl<T, I: Idx, const D: usize> fmt::Debug for TaskMemset<T, I, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskMemset")
            .field("extent", &format_args!("{}", self.extent))
            .field("byte", &format_args!("{:#04x}", self.byte))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::Buf;

    #[test]
    fn test_memcpy_into_sub_view() {
        let src = Buf::<u16, u32, 2>::from_vec([2, 2], vec![1, 2, 3, 4]).unwrap();
        let dst = Buf::<u16, u32, 2>::zeros([3, 3]);
        let window = dst.sub_view([1, 1], [2, 2]).unwrap();
        TaskMemcpy::new(&window, &src, [2, 2]).unwrap().execute().unwrap();
        assert_eq!(dst.to_vec(), vec![0, 0, 0, 0, 1, 2, 0, 3, 4]);
    }

    #[test]
    fn test_memcpy_extent_mismatch() {
        let src = Buf::<u16, u32, 1>::zeros(4u32);
        let dst = Buf::<u16, u32, 1>::zeros(2u32);
        let err = TaskMemcpy::new(&dst, &src, 4u32).err().unwrap();
        assert!(matches!(err, Error::ExtentMismatch { what: "memcpy destination", .. }));
    }

    #[test]
    fn test_memset_replicates_byte() {
        let buf = Buf::<u32, u32, 1>::zeros(3u32);
        let task = TaskMemset::new(&buf, 0xab, 2u32).unwrap();
        assert_eq!(task.value(), 0xabab_abab);
        task.execute().unwrap();
        assert_eq!(buf.to_vec(), vec![0xabab_abab, 0xabab_abab, 0]);
    }

    #[test]
    fn test_memcpy_within_one_buffer() {
        let buf = Buf::<u8, u32, 1>::from_vec(4u32, vec![1, 2, 3, 4]).unwrap();
        let lo = buf.sub_view(0u32, 2u32).unwrap();
        let hi = buf.sub_view(2u32, 2u32).unwrap();
        TaskMemcpy::new(&hi, &lo, 2u32).unwrap().execute().unwrap();
        assert_eq!(buf.to_vec(), vec![1, 2, 1, 2]);
    }
}
