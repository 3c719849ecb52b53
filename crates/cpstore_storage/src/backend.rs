//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level positional byte store.
///
/// Storage backends are **opaque byte stores**. They read and write bytes at
/// offsets, append, flush and truncate. The page store owns all format
/// interpretation - backends do not understand pages, descriptors or log
/// records.
///
/// # Invariants
///
/// - `write_at` followed by `read_at` over the same range returns the written bytes
/// - `write_at` past the current end extends the store, zero-filling any gap
/// - `append` returns the offset where data was written
/// - `sync` ensures all previously written data is durable
/// - Backends must be `Send + Sync` so a store can move between threads
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync {
    /// Reads exactly `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The read would extend beyond the current size
    /// - An I/O error occurs
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Reads up to `buf.len()` bytes starting at `offset` into `buf`.
    ///
    /// Unlike [`read_at`](Self::read_at) a short read is not an error: the
    /// number of bytes actually copied is returned, and 0 is returned when
    /// `offset` is at or past the end.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn read_into(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize>;

    /// Writes `data` at `offset`, overwriting existing bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is read-only or an I/O error occurs.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Appends data to the end of the storage.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is read-only or an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Flushes buffered writes to the operating system.
    ///
    /// This does not force the device to persist the data; see [`sync`](Self::sync).
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size of the storage in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// After this returns successfully, all previously written data
    /// is guaranteed to survive process termination.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the storage to the given size.
    ///
    /// This removes all data after the specified offset. The recovery log
    /// uses this to reset itself after a checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The truncation fails
    /// - `new_size` is greater than current size
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Acquires an advisory whole-store lock, blocking until it is granted.
    ///
    /// Locks coordinate separate processes opening the same files; they do
    /// not serialize threads within one process. The default implementation
    /// has nothing to lock and always succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the operating system rejects the lock request.
    fn lock(&self, _shared: bool) -> StorageResult<()> {
        Ok(())
    }

    /// Attempts to acquire an advisory whole-store lock without blocking.
    ///
    /// Returns `false` when another holder prevents the lock from being granted.
    ///
    /// # Errors
    ///
    /// Returns an error for failures other than lock contention.
    fn try_lock(&self, _shared: bool) -> StorageResult<bool> {
        Ok(true)
    }

    /// Releases a lock taken with [`lock`](Self::lock) or [`try_lock`](Self::try_lock).
    ///
    /// # Errors
    ///
    /// Returns an error if the operating system rejects the unlock request.
    fn unlock(&self) -> StorageResult<()> {
        Ok(())
    }
}
