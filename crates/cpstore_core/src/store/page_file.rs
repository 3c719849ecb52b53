//! The fixed-page file contract.

use crate::error::CoreResult;

/// A file of fixed-size logical pages.
///
/// This is the whole surface the database layer uses to reach storage.
/// Addresses are byte addresses and must be multiples of the page size.
/// Address 0 is special: it holds a raw header buffer of up to one page
/// that bypasses compression, encryption and the page index.
///
/// Implementations do no internal locking around page operations. The
/// `lock` family takes advisory whole-file locks that coordinate separate
/// processes, not threads.
pub trait FixedPageFile: Send {
    /// Writes one page at `address`.
    ///
    /// `page` must be exactly one page long unless `address` is 0.
    fn write(&mut self, address: u64, page: &[u8]) -> CoreResult<()>;

    /// Reads the page at `address` into `page` and returns the number of
    /// bytes produced: the page size, or 0 for a page never written.
    fn read(&self, address: u64, page: &mut [u8]) -> CoreResult<usize>;

    /// Makes every write since the previous `sync` durable.
    fn sync(&mut self) -> CoreResult<()>;

    /// Length of the underlying data file in bytes.
    fn length(&self) -> CoreResult<u64>;

    /// Takes an advisory lock on the data file, blocking until granted.
    fn lock(&self, shared: bool) -> CoreResult<()>;

    /// Tries to take an advisory lock; returns `false` if it is held elsewhere.
    fn try_lock(&self, shared: bool) -> CoreResult<bool>;

    /// Releases the advisory lock.
    fn unlock(&self) -> CoreResult<()>;

    /// Flushes and closes the file. All writes must have been synced.
    fn close(&mut self) -> CoreResult<()>;
}
