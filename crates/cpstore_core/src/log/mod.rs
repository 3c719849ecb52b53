//! Recovery log for crash-consistent page remaps.
//!
//! Every `sync` appends one record holding the remaps it is about to apply
//! to the page index. On open, the log is replayed into the index, which
//! restores every remap whose record was completely written even if the
//! memory-mapped index never reached the disk.
//!
//! ## Record Format
//!
//! ```text
//! | count: i32 | (address: i64, descriptor: i64) x count |
//! ```
//!
//! All integers are little-endian. Records are concatenated with no padding.
//!
//! ## Recovery Policy
//!
//! - **Short header**: fewer than 4 bytes left → end of log
//! - **Short body**: the count promises more entries than the remaining
//!   bytes hold → end of log
//! - **Negative count**: treated like a short body
//!
//! Each of these marks a record that was being appended when the process
//! died. It is discarded and everything before it is applied; none of them
//! is an error.
//!
//! ## Invariants
//!
//! - The log is **append-only** between checkpoints
//! - The log is **flushed before** the index is updated
//! - Replay is **idempotent** - replaying twice produces the same index
//! - The log is truncated only after the index has been flushed

mod iterator;
mod record;
mod writer;

pub use iterator::LogRecordIterator;
pub use record::{LogEntry, LogRecord, COUNT_SIZE, ENTRY_SIZE};
pub use writer::{RecoveryLog, ReplaySummary};
