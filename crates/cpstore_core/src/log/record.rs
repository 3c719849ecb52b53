//! Recovery log record types and serialization.

use crate::error::{CoreError, CoreResult};
use crate::pending::PendingRemap;
use crate::types::Descriptor;

/// Size of the record header (entry count).
pub const COUNT_SIZE: usize = 4;

/// Size of one `(address, descriptor)` entry.
pub const ENTRY_SIZE: usize = 16;

/// One remap persisted in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntry {
    /// Logical page address.
    pub address: u64,
    /// New physical descriptor for the page.
    pub descriptor: Descriptor,
}

impl From<PendingRemap> for LogEntry {
    fn from(remap: PendingRemap) -> Self {
        Self {
            address: remap.address,
            descriptor: remap.new,
        }
    }
}

/// A batch of remaps written by one `sync`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogRecord {
    /// Entries in the order they were appended.
    pub entries: Vec<LogEntry>,
}

impl LogRecord {
    /// Creates a record from entries.
    #[must_use]
    pub fn new(entries: Vec<LogEntry>) -> Self {
        Self { entries }
    }

    /// Size of the encoded record in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        COUNT_SIZE + self.entries.len() * ENTRY_SIZE
    }

    /// Encodes the record.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if the entry count does not fit in an `i32`.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let count = i32::try_from(self.entries.len()).map_err(|_| {
            CoreError::invariant(format!(
                "{} remaps exceed the log record limit",
                self.entries.len()
            ))
        })?;

        let mut data = Vec::with_capacity(self.encoded_len());
        data.extend_from_slice(&count.to_le_bytes());
        for entry in &self.entries {
            data.extend_from_slice(&(entry.address as i64).to_le_bytes());
            data.extend_from_slice(&(entry.descriptor.as_u64() as i64).to_le_bytes());
        }
        Ok(data)
    }

    /// Decodes the entry count from a record header.
    ///
    /// Returns `None` for a negative count.
    #[must_use]
    pub fn decode_count(header: [u8; COUNT_SIZE]) -> Option<usize> {
        usize::try_from(i32::from_le_bytes(header)).ok()
    }

    /// Decodes the body of a record holding `count` entries.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if `body` is not exactly `count` entries long.
    pub fn decode_body(count: usize, body: &[u8]) -> CoreResult<Self> {
        if body.len() != count * ENTRY_SIZE {
            return Err(CoreError::invariant(format!(
                "log record body of {} bytes does not hold {count} entries",
                body.len()
            )));
        }

        let entries = body
            .chunks_exact(ENTRY_SIZE)
            .map(|chunk| {
                let mut address = [0u8; 8];
                let mut descriptor = [0u8; 8];
                address.copy_from_slice(&chunk[..8]);
                descriptor.copy_from_slice(&chunk[8..]);
                LogEntry {
                    address: i64::from_le_bytes(address) as u64,
                    descriptor: Descriptor::new(i64::from_le_bytes(descriptor) as u64),
                }
            })
            .collect();

        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout() {
        let record = LogRecord::new(vec![LogEntry {
            address: 4096,
            descriptor: Descriptor(0x0102),
        }]);
        let data = record.encode().unwrap();

        assert_eq!(data.len(), 20);
        assert_eq!(record.encoded_len(), 20);
        assert_eq!(&data[..4], &1i32.to_le_bytes());
        assert_eq!(&data[4..12], &4096i64.to_le_bytes());
        assert_eq!(&data[12..20], &0x0102i64.to_le_bytes());
    }

    #[test]
    fn decode_matches_encode() {
        let record = LogRecord::new(vec![
            LogEntry {
                address: 4096,
                descriptor: Descriptor(17),
            },
            LogEntry {
                address: 8192,
                descriptor: Descriptor(u64::MAX >> 1),
            },
        ]);
        let data = record.encode().unwrap();

        let mut header = [0u8; COUNT_SIZE];
        header.copy_from_slice(&data[..COUNT_SIZE]);
        let count = LogRecord::decode_count(header).unwrap();
        assert_eq!(count, 2);

        let decoded = LogRecord::decode_body(count, &data[COUNT_SIZE..]).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn empty_record() {
        let data = LogRecord::default().encode().unwrap();
        assert_eq!(data, 0i32.to_le_bytes());
    }

    #[test]
    fn negative_count_is_rejected() {
        assert_eq!(LogRecord::decode_count((-1i32).to_le_bytes()), None);
    }

    #[test]
    fn body_length_mismatch_is_fatal() {
        assert!(LogRecord::decode_body(2, &[0u8; 16])
            .unwrap_err()
            .is_fatal());
    }

    #[test]
    fn from_pending_remap_uses_new_descriptor() {
        let entry = LogEntry::from(PendingRemap {
            address: 4096,
            new: Descriptor(9),
            old: Descriptor(3),
        });
        assert_eq!(entry.descriptor, Descriptor(9));
    }
}
