//! Work division: the grid / block / thread-element hierarchy of one launch
//!
//! A work division is three extents: blocks per grid (G), threads per block (B)
//! and elements per thread (E). Backends either store them
//! ([`WorkDivMembers`]) or recompute G and B from native runtime state while
//! keeping E as a stored constant.
//!
//! Extents are retrieved by an (origin, unit) tag pair:
//!
//! ```rust
//! use lattice_core::workdiv::{origin::*, unit::*, WorkDiv, WorkDivMembers};
//! use lattice_core::Vector;
//!
//! let wd = WorkDivMembers::new(Vector::new([4u32]), Vector::new([8]), Vector::new([2]));
//! assert_eq!(wd.work_div::<Grid, Blocks>(), Vector::new([4]));
//! assert_eq!(wd.work_div::<Grid, Threads>(), Vector::new([32]));
//! assert_eq!(wd.work_div::<Grid, Elems>(), Vector::new([64]));
//! ```

use crate::error::{Error, Result};
use crate::idx::Idx;
use crate::props::AccDevProps;
use crate::vec::Vector;
use std::fmt;

/// Origin tags: the level an extent or index is measured relative to
pub mod origin {
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Grid;
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Block;
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Thread;
}

/// Unit tags: what an extent or index counts
pub mod unit {
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Blocks;
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Threads;
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Elems;
}

mod sealed {
    pub trait Sealed {}
}

use origin::{Block, Grid, Thread};
use unit::{Blocks, Elems, Threads};

/// Read access to the three extents of a work division.
pub trait WorkDiv<I: Idx, const D: usize> {
    /// Blocks per grid
    fn grid_block_extent(&self) -> Vector<I, D>;

    /// Threads per block
    fn block_thread_extent(&self) -> Vector<I, D>;

    /// Elements per thread
    fn thread_elem_extent(&self) -> Vector<I, D>;

    /// Extent selected by an (origin, unit) pair
    fn work_div<O, U>(&self) -> Vector<I, D>
    where
        (O, U): Span,
    {
        <(O, U) as Span>::extent(self)
    }
}

/// (origin, unit) pairs that name an extent of a work division.
pub trait Span: sealed::Sealed {
    fn extent<I: Idx, const D: usize, W: WorkDiv<I, D> + ?Sized>(wd: &W) -> Vector<I, D>;
}

macro_rules! span {
    ($origin:ty, $unit:ty, |$wd:ident| $body:expr) => {
        impl sealed::Sealed for ($origin, $unit) {}

        impl Span for ($origin, $unit) {
            fn extent<I: Idx, const D: usize, W: WorkDiv<I, D> + ?Sized>($wd: &W) -> Vector<I, D> {
                $body
            }
        }
    };
}

span!(Grid, Blocks, |wd| wd.grid_block_extent());
span!(Block, Threads, |wd| wd.block_thread_extent());
span!(Thread, Elems, |wd| wd.thread_elem_extent());
span!(Grid, Threads, |wd| wd.grid_block_extent() * wd.block_thread_extent());
span!(Block, Elems, |wd| wd.block_thread_extent() * wd.thread_elem_extent());
span!(Grid, Elems, |wd| wd.grid_block_extent() * wd.block_thread_extent() * wd.thread_elem_extent());

/// Work division storing its three extents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorkDivMembers<I, const D: usize> {
    grid_block_extent: Vector<I, D>,
    block_thread_extent: Vector<I, D>,
    thread_elem_extent: Vector<I, D>,
}

impl<I: Idx, const D: usize> WorkDivMembers<I, D> {
    pub fn new(grid_block_extent: Vector<I, D>, block_thread_extent: Vector<I, D>, thread_elem_extent: Vector<I, D>) -> Self {
        Self {
            grid_block_extent,
            block_thread_extent,
            thread_elem_extent,
        }
    }

    /// Copy the extents out of any work division
    pub fn from_work_div<W: WorkDiv<I, D> + ?Sized>(wd: &W) -> Self {
        Self::new(wd.grid_block_extent(), wd.block_thread_extent(), wd.thread_elem_extent())
    }
}

impl<I: Idx, const D: usize> WorkDiv<I, D> for WorkDivMembers<I, D> {
    fn grid_block_extent(&self) -> Vector<I, D> {
        self.grid_block_extent
    }

    fn block_thread_extent(&self) -> Vector<I, D> {
        self.block_thread_extent
    }

    fn thread_elem_extent(&self) -> Vector<I, D> {
        self.thread_elem_extent
    }
}

impl<I: Idx, const D: usize> fmt::Display for WorkDivMembers<I, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{grid: {}, block: {}, thread: {}}}",
            self.grid_block_extent, self.block_thread_extent, self.thread_elem_extent
        )
    }
}

// ================================================================================================
// Validation
// ================================================================================================

fn count<I: Idx, const D: usize>(v: &Vector<I, D>) -> u128 {
    v.iter().fold(1u128, |acc, c| acc.saturating_mul(c.as_usize() as u128))
}

fn check_level<I: Idx, const D: usize>(
    what: &str,
    extent: &Vector<I, D>,
    extent_max: &Vector<I, D>,
    count_max: I,
) -> Result<()> {
    if !extent.is_positive() {
        return Err(Error::invalid_work_div(format!("{what} extent {extent} has a zero component")));
    }
    for k in 0..D {
        if extent[k] > extent_max[k] {
            return Err(Error::invalid_work_div(format!(
                "{what} extent {extent} exceeds the device maximum {extent_max} in dimension {k}"
            )));
        }
    }
    let total = count(extent);
    if total > count_max.as_usize() as u128 {
        return Err(Error::invalid_work_div(format!(
            "{what} count {total} exceeds the device maximum {count_max}"
        )));
    }
    Ok(())
}

/// Check a work division against device limits.
///
/// # Arguments
///
/// * `props` - Limits reported by the target device
/// * `wd` - Work division to check
/// * `dyn_shared_bytes` - Dynamic block shared memory the kernel requests
///
/// # Errors
///
/// Returns [`Error::InvalidWorkDiv`] naming the first violated limit.
pub fn validate_work_div<I, const D: usize, W>(props: &AccDevProps<I, D>, wd: &W, dyn_shared_bytes: usize) -> Result<()>
where
    I: Idx,
    W: WorkDiv<I, D> + ?Sized,
{
    check_level(
        "grid block",
        &wd.grid_block_extent(),
        &props.grid_block_extent_max,
        props.grid_block_count_max,
    )?;
    check_level(
        "block thread",
        &wd.block_thread_extent(),
        &props.block_thread_extent_max,
        props.block_thread_count_max,
    )?;
    check_level(
        "thread element",
        &wd.thread_elem_extent(),
        &props.thread_elem_extent_max,
        props.thread_elem_count_max,
    )?;
    if dyn_shared_bytes > props.shared_mem_size_bytes {
        return Err(Error::invalid_work_div(format!(
            "dynamic block shared memory of {dyn_shared_bytes} bytes exceeds the device budget of {} bytes",
            props.shared_mem_size_bytes
        )));
    }
    Ok(())
}

/// `true` when [`validate_work_div`] accepts the work division without dynamic shared memory
pub fn is_valid_work_div<I, const D: usize, W>(props: &AccDevProps<I, D>, wd: &W) -> bool
where
    I: Idx,
    W: WorkDiv<I, D> + ?Sized,
{
    validate_work_div(props, wd, 0).is_ok()
}

fn div_ceil<I: Idx>(a: I, b: I) -> I {
    if b == I::zero() {
        return I::zero();
    }
    (a + b - I::one()) / b
}

/// Derive a work division covering `grid_elem_extent` elements.
///
/// Threads per block are grown from the fastest dimension outwards until the
/// per-dimension or total thread limit is hit; the grid is rounded up so every
/// element is covered. The result may still exceed grid limits for very large
/// problems; callers validate it like any other work division.
pub fn suggest_work_div<I: Idx, const D: usize>(
    props: &AccDevProps<I, D>,
    grid_elem_extent: Vector<I, D>,
    thread_elem_extent: Vector<I, D>,
) -> WorkDivMembers<I, D> {
    let elems = thread_elem_extent.map(|e| e.max(I::one()));
    let grid_threads = grid_elem_extent.zip_with(&elems, div_ceil);

    let mut block = Vector::<I, D>::ones();
    let mut budget = props.block_thread_count_max.max(I::one());
    for k in (0..D).rev() {
        let want = grid_threads[k].max(I::one());
        let b = want.min(props.block_thread_extent_max[k].max(I::one())).min(budget);
        block[k] = b;
        budget = (budget / b).max(I::one());
    }

    let grid = grid_threads.zip_with(&block, div_ceil).map(|g| g.max(I::one()));
    let wd = WorkDivMembers::new(grid, block, elems);
    tracing::trace!(%grid_elem_extent, work_div = %wd, "suggested work division");
    wd
}
