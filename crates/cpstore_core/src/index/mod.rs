//! Persistent logical-to-physical page index.
//!
//! The index is a flat, directly addressed table of 8-byte little-endian
//! descriptors. The slot for logical address `a` lives at byte position
//! `a >> (log2(page_size) - 3)`, i.e. one slot per page in address order.
//! Slot 0 belongs to the header page and is never written. A zero slot
//! means the page has never been written.
//!
//! Two implementations share this layout:
//!
//! - [`MappedPageIndex`] - memory-mapped file, grown by doubling and remapping
//! - [`BackendPageIndex`] - positional reads and writes against any
//!   [`StorageBackend`](cpstore_storage::StorageBackend)

mod backend;
mod mapped;

pub use backend::BackendPageIndex;
pub use mapped::MappedPageIndex;

use crate::error::CoreResult;
use crate::types::Descriptor;

/// Size of one index slot in bytes.
pub const SLOT_SIZE: usize = 8;

/// Directly addressed table mapping logical page addresses to descriptors.
pub trait PageIndex: Send + Sync {
    /// Returns the descriptor recorded for `address`, or `None` if the page
    /// was never written or lies beyond the current extent.
    fn get(&self, address: u64) -> CoreResult<Option<Descriptor>>;

    /// Records `descriptor` for `address`, growing the table first if the
    /// slot lies beyond the current extent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ReadOnly`](crate::CoreError::ReadOnly) on a
    /// read-only index, or a file access error if growth fails.
    fn set(&mut self, address: u64, descriptor: Descriptor) -> CoreResult<()>;

    /// Forces the table to durable storage.
    fn flush(&mut self) -> CoreResult<()>;

    /// Calls `visit` for every non-empty slot in address order.
    fn scan(&self, visit: &mut dyn FnMut(u64, Descriptor) -> CoreResult<()>) -> CoreResult<()>;

    /// Current size of the table in bytes.
    fn extent(&self) -> CoreResult<u64>;
}

/// Decodes one slot.
fn decode_slot(bytes: &[u8]) -> Descriptor {
    let mut raw = [0u8; SLOT_SIZE];
    raw.copy_from_slice(&bytes[..SLOT_SIZE]);
    Descriptor::new(u64::from_le_bytes(raw))
}
