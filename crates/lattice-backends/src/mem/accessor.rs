//! Typed kernel access to buffers

use super::access::{AccessKind, AccessTracker};
use super::{View, ViewRef};
use bytemuck::Pod;
use lattice_core::{Idx, Vector};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Access mode markers
pub mod mode {
    #[derive(Clone, Copy, Debug, Default)]
    pub struct ReadOnly;
    #[derive(Clone, Copy, Debug, Default)]
    pub struct WriteOnly;
    #[derive(Clone, Copy, Debug, Default)]
    pub struct ReadWrite;
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::mode::ReadOnly {}
    impl Sealed for super::mode::WriteOnly {}
    impl Sealed for super::mode::ReadWrite {}
}

pub trait AccessMode: sealed::Sealed + Send + Sync + 'static {
    const KIND: AccessKind;
}

pub trait Readable: AccessMode {}
pub trait Writable: AccessMode {}

impl AccessMode for mode::ReadOnly {
    const KIND: AccessKind = AccessKind::Read;
}
impl AccessMode for mode::WriteOnly {
    const KIND: AccessKind = AccessKind::Write;
}
impl AccessMode for mode::ReadWrite {
    const KIND: AccessKind = AccessKind::Write;
}

impl Readable for mode::ReadOnly {}
impl Readable for mode::ReadWrite {}
impl Writable for mode::WriteOnly {}
impl Writable for mode::ReadWrite {}

/// Kernel argument granting element access to a view.
///
/// Indices are relative to the view; pitches come from the parent buffer, so
/// an accessor over a sub-view addresses the right elements of its parent.
/// Passing an accessor to a task declares the view's buffer with the mode's
/// access kind.
pub struct Accessor<T, I, const D: usize, M> {
    view: ViewRef<T, I, D>,
    _mode: PhantomData<fn() -> M>,
}

impl<T: Pod, I: Idx, const D: usize, M: AccessMode> Accessor<T, I, D, M> {
    pub fn new<V: View<T, I, D> + ?Sized>(view: &V) -> Self {
        Self {
            view: view.view_ref(),
            _mode: PhantomData,
        }
    }

    pub fn extent(&self) -> Vector<I, D> {
        self.view.extent
    }

    pub fn pitch_elems(&self) -> Vector<usize, D> {
        self.view.pitch
    }

    pub(crate) fn tracker(&self) -> &Arc<AccessTracker> {
        self.view.tracker()
    }
}

impl<T: Pod, I: Idx, const D: usize, M: Readable> Accessor<T, I, D, M> {
    /// # Panics
    ///
    /// If `idx` lies outside the accessor's extent.
    pub fn get(&self, idx: impl Into<Vector<I, D>>) -> T {
        self.view.get(idx.into())
    }
}

impl<T: Pod, I: Idx, const D: usize, M: Writable> Accessor<T, I, D, M> {
    /// Store `value` at `idx`.
    ///
    /// # Safety
    ///
    /// No other execution unit or host thread may access the same element
    /// until the kernel finishes or the block synchronizes.
    ///
    /// # Panics
    ///
    /// If `idx` lies outside the accessor's extent.
    pub unsafe fn set(&self, idx: impl Into<Vector<I, D>>, value: T) {
        // SAFETY: exclusivity of this element is guaranteed by the caller.
        unsafe { self.view.cell(idx.into()).set(value) }
    }
}

impl<T, I: Copy, const D: usize, M> Clone for Accessor<T, I, D, M> {
    fn clone(&self) -> Self {
        Self {
            view: self.view.clone(),
            _mode: PhantomData,
        }
    }
}

impl<T, I: fmt::Display, const D: usize, M> fmt::Debug for Accessor<T, I, D, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("extent", &format_args!("{}", self.view.extent))
            .field("mode", &std::any::type_name::<M>())
            .finish()
    }
}

impl<T: Pod, I: Idx, const D: usize> super::Buf<T, I, D> {
    /// Accessor over the whole buffer
    pub fn access<M: AccessMode>(&self) -> Accessor<T, I, D, M> {
        Accessor::new(self)
    }
}

impl<T: Pod, I: Idx, const D: usize> super::SubView<T, I, D> {
    pub fn access<M: AccessMode>(&self) -> Accessor<T, I, D, M> {
        Accessor::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::mode::{ReadOnly, ReadWrite, WriteOnly};
    use super::*;
    use crate::mem::Buf;

    #[test]
    fn test_read_write_through_sub_view() {
        let buf = Buf::<u32, u32, 2>::zeros([4, 4]);
        let sub = buf.sub_view([1, 2], [2, 2]).unwrap();
        let acc = sub.access::<ReadWrite>();
        unsafe { acc.set([1, 1], 42) };
        assert_eq!(acc.get([1, 1]), 42);
        assert_eq!(buf.to_vec()[2 * 4 + 3], 42);
    }

    #[test]
    fn test_modes_map_to_access_kind() {
        assert_eq!(<ReadOnly as AccessMode>::KIND, AccessKind::Read);
        assert_eq!(<WriteOnly as AccessMode>::KIND, AccessKind::Write);
        assert_eq!(<ReadWrite as AccessMode>::KIND, AccessKind::Write);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_out_of_bounds_panics() {
        let buf = Buf::<u8, u32, 1>::zeros(3u32);
        buf.access::<ReadOnly>().get(3u32);
    }

    #[test]
    fn test_write_only_one_dim() {
        let buf = Buf::<f32, usize, 1>::zeros(3usize);
        let out = buf.access::<WriteOnly>();
        for i in 0..3 {
            unsafe { out.set(i, i as f32 * 0.5) };
        }
        assert_eq!(buf.to_vec(), vec![0.0, 0.5, 1.0]);
    }
}
