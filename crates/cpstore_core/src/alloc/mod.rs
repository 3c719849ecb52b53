//! Space allocation over the data file.
//!
//! The data file is divided into fixed allocation quanta. An allocator hands
//! out runs of consecutive quanta, identified by the index of their first
//! quantum, and takes them back when a page moves.
//!
//! ## Invariants
//!
//! - Two live allocations never share a quantum
//! - `allocate` always succeeds, growing the tracked space when needed
//! - Freeing quanta that are not allocated is an invariant violation
//!
//! Placement policy is not part of the contract: [`BitmapAllocator`] uses a
//! cursor-biased first fit, and any other implementation of
//! [`SpaceAllocator`] can be substituted without touching the page store.

mod bitmap;

pub use bitmap::BitmapAllocator;

use crate::error::CoreResult;

/// Allocator of quantum runs in the data file.
pub trait SpaceAllocator: Send + Sync + std::fmt::Debug {
    /// Allocates `quanta` consecutive quanta and returns the first index.
    ///
    /// Never fails: when no free run is large enough, the tracked space grows.
    fn allocate(&mut self, quanta: u64) -> u64;

    /// Releases a run previously returned by [`allocate`](Self::allocate) or
    /// marked by [`reserve`](Self::reserve).
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if any quantum in the run is not allocated.
    fn free(&mut self, position: u64, quanta: u64) -> CoreResult<()>;

    /// Marks a specific run as allocated, growing the tracked space if needed.
    ///
    /// Used to rebuild allocator state from the page index at startup.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if any quantum in the run is already allocated.
    fn reserve(&mut self, position: u64, quanta: u64) -> CoreResult<()>;

    /// Extends the tracked space by `quanta` free quanta.
    fn grow(&mut self, quanta: u64);

    /// Number of quanta currently tracked.
    fn capacity(&self) -> u64;

    /// Number of quanta currently allocated.
    fn used(&self) -> u64;
}
