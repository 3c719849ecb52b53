//! Dump-log command implementation.

use super::{CliError, Format, StoreLocation};
use cpstore_core::{Descriptor, Geometry, RecoveryLog};
use cpstore_storage::FileBackend;
use serde::Serialize;

/// Recovery log record representation for output.
#[derive(Debug, Serialize)]
pub struct LogRecordInfo {
    /// Offset in the log file.
    pub offset: u64,
    /// Remaps in the record.
    pub entries: Vec<RemapInfo>,
}

/// One remap of a recovery log record.
#[derive(Debug, Serialize)]
pub struct RemapInfo {
    /// Logical page address.
    pub address: u64,
    /// Raw packed descriptor.
    pub descriptor: u64,
    /// Payload offset in the data file.
    pub offset: u64,
    /// Stored payload size.
    pub size: usize,
}

/// Log contents returned by [`read_log`].
#[derive(Debug, Serialize)]
pub struct LogDump {
    /// Complete records, oldest first.
    pub records: Vec<LogRecordInfo>,
    /// Offset of a torn trailing record, if iteration stopped at one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torn_at: Option<u64>,
}

/// Reads up to `limit` records from the recovery log without replaying it.
pub fn read_log(location: &StoreLocation, limit: Option<usize>) -> Result<LogDump, CliError> {
    let path = location.log_path();
    if !path.exists() {
        return Err(CliError::NotFound(location.dir.clone()));
    }

    let geometry = Geometry::new(location.page_size, 1)?;
    let backend = FileBackend::open_with(&path, true).map_err(cpstore_core::CoreError::from)?;
    let log = RecoveryLog::new(Box::new(backend), false);

    let mut iter = log.iter()?;
    let mut records = Vec::new();
    let max_records = limit.unwrap_or(usize::MAX);

    while records.len() < max_records {
        let Some(next) = iter.next() else { break };
        let (offset, record) = next?;
        records.push(LogRecordInfo {
            offset,
            entries: record
                .entries
                .iter()
                .map(|entry| describe(geometry, entry.address, entry.descriptor))
                .collect(),
        });
    }

    Ok(LogDump {
        records,
        torn_at: iter.torn_at(),
    })
}

fn describe(geometry: Geometry, address: u64, descriptor: Descriptor) -> RemapInfo {
    RemapInfo {
        address,
        descriptor: descriptor.as_u64(),
        offset: geometry.offset(descriptor),
        size: geometry.size(descriptor),
    }
}

/// Runs the dump-log command.
pub fn run(location: &StoreLocation, limit: Option<usize>, format: &str) -> Result<(), CliError> {
    let format = Format::parse(format)?;
    let dump = read_log(location, limit)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&dump)?),
        Format::Text => print_text_output(&dump),
    }
    Ok(())
}

fn print_text_output(dump: &LogDump) {
    if dump.records.is_empty() {
        println!("Recovery log is empty");
    }

    for record in &dump.records {
        println!("[{:08}] {} remap(s)", record.offset, record.entries.len());
        for entry in &record.entries {
            println!(
                "    page {:#x} -> offset {} ({} bytes)",
                entry.address, entry.offset, entry.size
            );
        }
    }

    if let Some(offset) = dump.torn_at {
        println!("Torn record at offset {offset} (discarded on replay)");
    }
}
