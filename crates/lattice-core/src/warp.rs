//! Warp (sub-group) collectives

/// Warp-level collective capability.
///
/// Masks are bit sets over lane ids of the calling warp.
pub trait Warp {
    /// Lanes per warp
    fn size(&self) -> usize;

    /// Mask of lanes currently executing
    fn activemask(&self) -> u64;

    /// True if the predicate holds on every active lane
    fn all(&self, predicate: bool) -> bool;

    /// True if the predicate holds on any active lane
    fn any(&self, predicate: bool) -> bool;

    /// Mask of active lanes whose predicate holds
    fn ballot(&self, predicate: bool) -> u64;
}

/// A warp of exactly one lane, used by host backends
#[derive(Clone, Copy, Debug, Default)]
pub struct WarpSingleThread;

impl Warp for WarpSingleThread {
    fn size(&self) -> usize {
        1
    }

    fn activemask(&self) -> u64 {
        1
    }

    fn all(&self, predicate: bool) -> bool {
        predicate
    }

    fn any(&self, predicate: bool) -> bool {
        predicate
    }

    fn ballot(&self, predicate: bool) -> u64 {
        u64::from(predicate)
    }
}
