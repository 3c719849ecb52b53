//! Streaming recovery log iterator.
//!
//! Reads records one at a time from the storage backend, so replay memory is
//! bounded by the largest single record rather than the log size.

use crate::error::CoreResult;
use crate::log::record::{LogRecord, COUNT_SIZE, ENTRY_SIZE};
use cpstore_storage::StorageBackend;

/// An iterator over complete recovery log records.
///
/// Yields `(offset, record)` pairs. Iteration ends at end of log or at the
/// first torn record; in the latter case [`torn_at`](Self::torn_at) reports
/// where the discarded tail begins. I/O failures are yielded as errors and
/// end the iteration.
pub struct LogRecordIterator<'a> {
    /// Backend holding the log.
    backend: &'a dyn StorageBackend,
    /// Total size of the log when iteration started.
    total_size: u64,
    /// Offset of the next record.
    current_offset: u64,
    /// Offset of a torn trailing record, once found.
    torn_at: Option<u64>,
    /// Whether the end (or an error) has been reached.
    finished: bool,
}

impl<'a> LogRecordIterator<'a> {
    /// Creates an iterator starting at the beginning of the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be determined.
    pub fn new(backend: &'a dyn StorageBackend) -> CoreResult<Self> {
        let total_size = backend.size()?;
        Ok(Self {
            backend,
            total_size,
            current_offset: 0,
            torn_at: None,
            finished: false,
        })
    }

    /// Offset of a discarded torn record, if iteration stopped at one.
    #[must_use]
    pub fn torn_at(&self) -> Option<u64> {
        self.torn_at
    }

    /// Offset just past the last complete record read so far.
    #[must_use]
    pub fn valid_len(&self) -> u64 {
        self.current_offset
    }

    fn torn(&mut self) -> Option<CoreResult<(u64, LogRecord)>> {
        self.torn_at = Some(self.current_offset);
        self.finished = true;
        None
    }

    fn read_next_record(&mut self) -> Option<CoreResult<(u64, LogRecord)>> {
        let remaining = self.total_size - self.current_offset;
        if remaining == 0 {
            self.finished = true;
            return None;
        }
        if remaining < COUNT_SIZE as u64 {
            return self.torn();
        }

        let header = match self.backend.read_at(self.current_offset, COUNT_SIZE) {
            Ok(header) => header,
            Err(e) => {
                self.finished = true;
                return Some(Err(e.into()));
            }
        };
        let mut count_bytes = [0u8; COUNT_SIZE];
        count_bytes.copy_from_slice(&header);

        let Some(count) = LogRecord::decode_count(count_bytes) else {
            return self.torn();
        };
        let body_len = count * ENTRY_SIZE;
        if body_len as u64 > remaining - COUNT_SIZE as u64 {
            return self.torn();
        }

        let offset = self.current_offset;
        let record = self
            .backend
            .read_at(offset + COUNT_SIZE as u64, body_len)
            .map_err(Into::into)
            .and_then(|body| LogRecord::decode_body(count, &body));

        match record {
            Ok(record) => {
                self.current_offset += (COUNT_SIZE + body_len) as u64;
                Some(Ok((offset, record)))
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl Iterator for LogRecordIterator<'_> {
    type Item = CoreResult<(u64, LogRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        self.read_next_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::record::LogEntry;
    use crate::types::Descriptor;
    use cpstore_storage::InMemoryBackend;

    fn record(n: u64) -> Vec<u8> {
        LogRecord::new(
            (1..=n)
                .map(|i| LogEntry {
                    address: i * 4096,
                    descriptor: Descriptor(i),
                })
                .collect(),
        )
        .encode()
        .unwrap()
    }

    #[test]
    fn empty_log() {
        let backend = InMemoryBackend::new();
        let mut iter = LogRecordIterator::new(&backend).unwrap();
        assert!(iter.next().is_none());
        assert_eq!(iter.torn_at(), None);
    }

    #[test]
    fn reads_records_with_offsets() {
        let mut data = record(1);
        data.extend(record(3));
        let backend = InMemoryBackend::with_data(data);

        let records: Vec<_> = LogRecordIterator::new(&backend)
            .unwrap()
            .collect::<CoreResult<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, 0);
        assert_eq!(records[1].0, 20);
        assert_eq!(records[1].1.entries.len(), 3);
    }

    #[test]
    fn torn_body_ends_iteration() {
        let mut data = record(2);
        let mut torn = record(4);
        torn.truncate(30);
        data.extend(torn);
        let backend = InMemoryBackend::with_data(data);

        let mut iter = LogRecordIterator::new(&backend).unwrap();
        assert!(iter.next().unwrap().is_ok());
        assert!(iter.next().is_none());
        assert_eq!(iter.torn_at(), Some(36));
        assert_eq!(iter.valid_len(), 36);
    }

    #[test]
    fn torn_header_ends_iteration() {
        let mut data = record(1);
        data.extend_from_slice(&[2, 0]);
        let backend = InMemoryBackend::with_data(data);

        let mut iter = LogRecordIterator::new(&backend).unwrap();
        assert!(iter.next().unwrap().is_ok());
        assert!(iter.next().is_none());
        assert_eq!(iter.torn_at(), Some(20));
    }

    #[test]
    fn negative_count_ends_iteration() {
        let mut data = record(1);
        data.extend_from_slice(&(-5i32).to_le_bytes());
        data.extend_from_slice(&[0u8; 64]);
        let backend = InMemoryBackend::with_data(data);

        let records: Vec<_> = LogRecordIterator::new(&backend).unwrap().collect();
        assert_eq!(records.len(), 1);
    }
}
