//! Recovery log writer and replay.

use crate::error::CoreResult;
use crate::log::iterator::LogRecordIterator;
use crate::log::record::{LogEntry, LogRecord};
use cpstore_storage::StorageBackend;
use tracing::warn;

/// Outcome of replaying the recovery log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplaySummary {
    /// Complete records applied.
    pub records: usize,
    /// Entries applied across all records.
    pub entries: usize,
    /// Offset of a discarded torn record, if one was found.
    pub torn_at: Option<u64>,
}

impl ReplaySummary {
    /// Returns `true` if the log held anything, complete or torn.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records == 0 && self.torn_at.is_none()
    }
}

/// Append-only log of page remaps.
///
/// One record is appended per `sync`; the log is truncated to zero once the
/// page index holding its effects has been flushed.
pub struct RecoveryLog {
    /// Storage backend for log data.
    backend: Box<dyn StorageBackend>,
    /// Whether to force the device flush after each append.
    sync_on_append: bool,
}

impl RecoveryLog {
    /// Creates a recovery log over a backend.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_append: bool) -> Self {
        Self {
            backend,
            sync_on_append,
        }
    }

    /// Appends one record holding `entries` and flushes it.
    ///
    /// Returns the offset where the record was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or written.
    pub fn append(&mut self, entries: &[LogEntry]) -> CoreResult<u64> {
        let data = LogRecord::new(entries.to_vec()).encode()?;
        let offset = self.backend.append(&data)?;

        if self.sync_on_append {
            self.backend.sync()?;
        } else {
            self.backend.flush()?;
        }

        Ok(offset)
    }

    /// Returns the current log size in bytes.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Returns a streaming iterator over complete records.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be accessed.
    pub fn iter(&self) -> CoreResult<LogRecordIterator<'_>> {
        LogRecordIterator::new(self.backend.as_ref())
    }

    /// Reads all complete records.
    ///
    /// Intended for inspection tools and tests; replay streams instead.
    pub fn records(&self) -> CoreResult<Vec<(u64, LogRecord)>> {
        self.iter()?.collect()
    }

    /// Feeds every entry of every complete record to `apply`, oldest first.
    ///
    /// A torn trailing record is skipped with a warning and reported in the
    /// summary; it is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or `apply` fails.
    pub fn replay<F>(&self, mut apply: F) -> CoreResult<ReplaySummary>
    where
        F: FnMut(&LogEntry) -> CoreResult<()>,
    {
        let mut summary = ReplaySummary::default();
        let mut iter = self.iter()?;

        for result in iter.by_ref() {
            let (_, record) = result?;
            for entry in &record.entries {
                apply(entry)?;
            }
            summary.records += 1;
            summary.entries += record.entries.len();
        }

        summary.torn_at = iter.torn_at();
        if let Some(offset) = summary.torn_at {
            warn!(offset, "discarding torn recovery log record");
        }

        Ok(summary)
    }

    /// Truncates the log to `offset` bytes.
    pub fn truncate(&mut self, offset: u64) -> CoreResult<()> {
        self.backend.truncate(offset)?;
        Ok(())
    }

    /// Empties the log after a checkpoint.
    pub fn clear(&mut self) -> CoreResult<()> {
        self.truncate(0)
    }
}

impl std::fmt::Debug for RecoveryLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryLog")
            .field("sync_on_append", &self.sync_on_append)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Descriptor;
    use cpstore_storage::InMemoryBackend;

    fn entry(address: u64, descriptor: u64) -> LogEntry {
        LogEntry {
            address,
            descriptor: Descriptor(descriptor),
        }
    }

    fn create_log() -> (RecoveryLog, InMemoryBackend) {
        let backend = InMemoryBackend::new();
        (RecoveryLog::new(Box::new(backend.clone()), false), backend)
    }

    #[test]
    fn append_and_read_back() {
        let (mut log, _) = create_log();
        let first = log.append(&[entry(4096, 10)]).unwrap();
        let second = log.append(&[entry(8192, 20), entry(4096, 30)]).unwrap();

        assert_eq!(first, 0);
        assert_eq!(second, 20);
        assert_eq!(log.size().unwrap(), 20 + 36);

        let records = log.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].1.entries[1], entry(4096, 30));
    }

    #[test]
    fn replay_applies_in_order() {
        let (mut log, _) = create_log();
        log.append(&[entry(4096, 10)]).unwrap();
        log.append(&[entry(4096, 30), entry(8192, 20)]).unwrap();

        let mut applied = Vec::new();
        let summary = log
            .replay(|e| {
                applied.push(*e);
                Ok(())
            })
            .unwrap();

        assert_eq!(summary.records, 2);
        assert_eq!(summary.entries, 3);
        assert_eq!(summary.torn_at, None);
        assert_eq!(
            applied,
            vec![entry(4096, 10), entry(4096, 30), entry(8192, 20)]
        );
    }

    #[test]
    fn replay_discards_torn_tail() {
        let (mut log, backend) = create_log();
        log.append(&[entry(4096, 10)]).unwrap();
        log.append(&[entry(8192, 20), entry(12288, 30)]).unwrap();

        // Simulate a crash halfway through the second record.
        let mut data = backend.data();
        data.truncate(20 + 10);
        backend.set_data(data);

        let mut applied = Vec::new();
        let summary = log
            .replay(|e| {
                applied.push(*e);
                Ok(())
            })
            .unwrap();

        assert_eq!(applied, vec![entry(4096, 10)]);
        assert_eq!(summary.records, 1);
        assert_eq!(summary.torn_at, Some(20));
        assert!(!summary.is_empty());
    }

    #[test]
    fn replay_of_empty_log() {
        let (log, _) = create_log();
        let summary = log.replay(|_| Ok(())).unwrap();
        assert!(summary.is_empty());
    }

    #[test]
    fn replay_propagates_apply_errors() {
        let (mut log, _) = create_log();
        log.append(&[entry(4096, 10)]).unwrap();
        let result = log.replay(|_| Err(crate::CoreError::invariant("boom")));
        assert!(result.unwrap_err().is_fatal());
    }

    #[test]
    fn clear_log() {
        let (mut log, _) = create_log();
        log.append(&[entry(4096, 10)]).unwrap();
        assert!(log.size().unwrap() > 0);

        log.clear().unwrap();
        assert_eq!(log.size().unwrap(), 0);
        assert!(log.records().unwrap().is_empty());
    }
}
