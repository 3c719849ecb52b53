//! Verify command implementation.

use super::{CliError, StoreLocation};
use cpstore_core::{CompressedPageStore, VerifyReport};

/// Verifies a store opened read-only.
pub fn verify(location: &StoreLocation) -> Result<VerifyReport, CliError> {
    let store = CompressedPageStore::open(location.config(true)?)?;
    Ok(store.verify()?)
}

/// Runs the verify command.
pub fn run(location: &StoreLocation) -> Result<(), CliError> {
    println!("Verifying page store at {}", location.dir.display());
    println!();

    let report = verify(location)?;
    println!("Pages checked: {}", report.pages_checked);
    for problem in &report.problems {
        println!("  - {problem}");
    }

    println!();
    if report.is_ok() {
        println!("✓ Page store verification passed");
        Ok(())
    } else {
        println!("✗ Page store verification failed");
        Err(CliError::VerificationFailed(report.problems.len()))
    }
}
