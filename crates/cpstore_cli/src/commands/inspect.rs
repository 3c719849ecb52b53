//! Inspect command implementation.

use super::{format_size, CliError, Format, StoreLocation};
use cpstore_core::{CompressedPageStore, StoreStats};
use serde::Serialize;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store directory.
    pub path: String,
    /// Page index file.
    pub index_path: String,
    /// Logical page size in bytes.
    pub page_size: usize,
    /// Pages with a stored payload.
    pub live_pages: u64,
    /// Logical bytes held by live pages.
    pub logical_bytes: u64,
    /// Stored payload bytes of live pages.
    pub payload_bytes: u64,
    /// Stored bytes per logical byte.
    pub compression_ratio: f64,
    /// Data file size in bytes.
    pub data_size: u64,
    /// Recovery log size in bytes.
    pub log_size: u64,
    /// Page index size in bytes.
    pub index_size: u64,
    /// Allocation quanta in use.
    pub allocated_quanta: u64,
    /// Allocation quanta tracked.
    pub capacity_quanta: u64,
    /// Whether pages are encrypted.
    pub encrypted: bool,
}

impl InspectResult {
    fn new(location: &StoreLocation, stats: &StoreStats) -> Self {
        Self {
            path: location.dir.display().to_string(),
            index_path: location.index_path().display().to_string(),
            page_size: stats.page_size,
            live_pages: stats.live_pages,
            logical_bytes: stats.logical_bytes(),
            payload_bytes: stats.payload_bytes,
            compression_ratio: stats.compression_ratio(),
            data_size: stats.data_length,
            log_size: stats.log_length,
            index_size: stats.index_extent,
            allocated_quanta: stats.allocated_quanta,
            capacity_quanta: stats.capacity_quanta,
            encrypted: stats.encrypted,
        }
    }
}

/// Collects inspection data from a read-only store.
///
/// Any recovery log is replayed in memory only; the files are not modified.
pub fn inspect(location: &StoreLocation) -> Result<InspectResult, CliError> {
    let store = CompressedPageStore::open(location.config(true)?)?;
    let stats = store.stats()?;
    Ok(InspectResult::new(location, &stats))
}

/// Runs the inspect command.
pub fn run(location: &StoreLocation, format: &str) -> Result<(), CliError> {
    let format = Format::parse(format)?;
    let result = inspect(location)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("cpstore Page Store Inspection");
    println!("=============================");
    println!();
    println!("Path:  {}", result.path);
    println!("Index: {}", result.index_path);
    println!();
    println!("Pages:");
    println!("  Page size:     {}", result.page_size);
    println!("  Live pages:    {}", result.live_pages);
    println!("  Logical size:  {}", format_size(result.logical_bytes));
    println!("  Stored size:   {}", format_size(result.payload_bytes));
    println!("  Ratio:         {:.3}", result.compression_ratio);
    println!("  Encrypted:     {}", result.encrypted);
    println!();
    println!("Files:");
    println!("  Data file:     {}", format_size(result.data_size));
    println!("  Recovery log:  {}", format_size(result.log_size));
    println!("  Page index:    {}", format_size(result.index_size));
    println!();
    println!("Allocation:");
    println!(
        "  Quanta used:   {} of {}",
        result.allocated_quanta, result.capacity_quanta
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{location, populate};

    #[test]
    fn inspect_counts_pages() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path(), None);

        let result = inspect(&location(dir.path())).unwrap();
        assert_eq!(result.live_pages, 4);
        assert_eq!(result.logical_bytes, 4 * 4096);
        assert!(result.compression_ratio < 0.1);
        assert_eq!(result.log_size, 0);
        assert!(!result.encrypted);
    }

    #[test]
    fn inspect_serializes_to_json() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path(), None);

        let result = inspect(&location(dir.path())).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&result).unwrap()).unwrap();
        assert_eq!(json["live_pages"], 4);
        assert_eq!(json["page_size"], 4096);
    }
}
