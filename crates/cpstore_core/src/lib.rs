//! # cpstore Core
//!
//! A compressed, optionally encrypted, crash-recoverable store of
//! fixed-size pages.
//!
//! Callers read and write whole logical pages at page-aligned addresses.
//! Each page is compressed, optionally XOR-encrypted, and placed at a
//! quantum-aligned offset in a data file. A persistent page index maps
//! logical addresses to physical descriptors, and a recovery log makes
//! every `sync` durable without flushing the index each time.
//!
//! This crate provides:
//! - [`CompressedPageStore`] implementing the [`FixedPageFile`] contract
//! - [`PageIndex`] with memory-mapped and backend-positional implementations
//! - [`RecoveryLog`] with torn-tail tolerant replay
//! - [`SpaceAllocator`] with the cursor-biased [`BitmapAllocator`]
//! - [`PendingRemaps`], the remaps written since the last sync
//! - [`StreamCipher`], a page-length XOR pad derived from a passphrase
//!
//! ## Example
//!
//! ```rust,no_run
//! use cpstore_core::{CompressedPageStore, FixedPageFile, StoreConfig};
//! use std::path::Path;
//!
//! let config = StoreConfig::in_dir(Path::new("/tmp/pages"));
//! let mut store = CompressedPageStore::open(config)?;
//!
//! store.write(4096, &[0x41; 4096])?;
//! store.sync()?;
//!
//! let mut page = [0u8; 4096];
//! assert_eq!(store.read(4096, &mut page)?, 4096);
//! store.close()?;
//! # Ok::<(), cpstore_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod alloc;
pub mod cipher;
pub mod codec;
pub mod config;
mod error;
pub mod index;
pub mod log;
pub mod pending;
mod store;
mod types;

pub use crate::alloc::{BitmapAllocator, SpaceAllocator};
pub use cipher::StreamCipher;
pub use config::StoreConfig;
pub use error::{CoreError, CoreResult};
pub use index::{BackendPageIndex, MappedPageIndex, PageIndex};
pub use log::{LogEntry, LogRecord, RecoveryLog, ReplaySummary};
pub use pending::{PendingRemap, PendingRemaps};
pub use store::{CompressedPageStore, FixedPageFile, OperationCounts, StoreStats, VerifyReport};
pub use types::{Descriptor, Geometry};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
