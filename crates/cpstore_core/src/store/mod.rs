//! The compressed page store and the fixed-page file contract it implements.
//!
//! ## Write path
//!
//! 1. compress the page (raw copy if compression does not shrink it)
//! 2. encrypt the payload if a passphrase is configured
//! 3. place it in the data file, reusing the pending location when the
//!    quantum count is unchanged, otherwise allocating a fresh run
//! 4. record `{address, new, old}` in the pending remap buffer
//!
//! ## Sync path
//!
//! 1. flush the data file
//! 2. append all pending remaps to the recovery log as one record
//! 3. write the new descriptors into the page index
//! 4. free the replaced allocations
//! 5. checkpoint if the log has grown past the threshold

mod page_file;
mod page_store;
mod stats;

pub use page_file::FixedPageFile;
pub use page_store::CompressedPageStore;
pub use stats::{OperationCounts, StoreStats, VerifyReport};
