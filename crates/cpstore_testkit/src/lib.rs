//! # cpstore Testkit
//!
//! Test utilities for cpstore.
//!
//! This crate provides:
//! - Store fixtures over temporary directories or shared in-memory files
//! - Property-based test generators using proptest
//! - A crash-simulating storage backend and crash recovery scenarios
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cpstore_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_store() {
//!     with_temp_store(|store| {
//!         store.write(4096, &compressible_page(4096, 1)).unwrap();
//!         store.sync().unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
