//! Checkpoint command implementation.

use super::{format_size, CliError, StoreLocation};
use cpstore_core::{CompressedPageStore, FixedPageFile};
use tracing::info;

/// Opens the store writable (which replays any recovery log), forces a
/// checkpoint and closes it. Returns the log size found before opening.
pub fn checkpoint(location: &StoreLocation) -> Result<u64, CliError> {
    let config = location.config(false)?;
    let log_path = location.log_path();
    let log_before = std::fs::metadata(&log_path).map(|m| m.len()).unwrap_or(0);

    let mut store = CompressedPageStore::open(config)?;
    store.checkpoint()?;
    store.close()?;

    info!(log = %log_path.display(), log_before, "checkpoint complete");
    Ok(log_before)
}

/// Runs the checkpoint command.
pub fn run(location: &StoreLocation) -> Result<(), CliError> {
    let log_before = checkpoint(location)?;
    println!(
        "Checkpointed {} ({} of recovery log applied)",
        location.dir.display(),
        format_size(log_before)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::location;
    use cpstore_core::StoreConfig;

    #[test]
    fn checkpoint_truncates_log_and_keeps_pages() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = CompressedPageStore::open(StoreConfig::in_dir(dir.path())).unwrap();
            store.write(4096, &[9u8; 4096]).unwrap();
            store.sync().unwrap();
        }

        let location = location(dir.path());
        let log_before = checkpoint(&location).unwrap();
        assert_eq!(log_before, 20);
        assert_eq!(std::fs::metadata(location.log_path()).unwrap().len(), 0);

        let store = CompressedPageStore::open(StoreConfig::in_dir(dir.path())).unwrap();
        let mut page = vec![0u8; 4096];
        assert_eq!(store.read(4096, &mut page).unwrap(), 4096);
        assert_eq!(page, vec![9u8; 4096]);
    }
}
