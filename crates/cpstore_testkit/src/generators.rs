//! Property-based test generators using proptest.
//!
//! Provides strategies for page contents, page addresses and operation
//! sequences against the page store.

use crate::fixtures::incompressible_page;
use proptest::prelude::*;

/// Strategy for pages built by repeating a short pattern; these compress well.
pub fn compressible_page_strategy(page_size: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..16)
        .prop_map(move |pattern| pattern.iter().copied().cycle().take(page_size).collect())
}

/// Strategy for pages of pseudo-random noise; these never compress.
pub fn incompressible_page_strategy(page_size: usize) -> impl Strategy<Value = Vec<u8>> {
    any::<u64>().prop_map(move |seed| incompressible_page(page_size, seed))
}

/// Strategy for page contents of mixed compressibility, including all-zero pages.
pub fn page_strategy(page_size: usize) -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        3 => compressible_page_strategy(page_size),
        2 => incompressible_page_strategy(page_size),
        1 => Just(vec![0u8; page_size]),
    ]
}

/// Strategy for page-aligned addresses past the header page.
pub fn page_address_strategy(page_size: usize, max_pages: u64) -> impl Strategy<Value = u64> {
    (1..=max_pages).prop_map(move |page| page * page_size as u64)
}

/// An operation against the page store.
#[derive(Debug, Clone)]
pub enum PageOperation {
    /// Write a page
    Write {
        /// Page address
        address: u64,
        /// Page contents
        data: Vec<u8>,
    },
    /// Make pending writes durable
    Sync,
    /// Drop the store without closing and reopen it
    Crash,
}

/// Strategy for page store operations over `max_pages` addresses.
pub fn page_operation_strategy(
    page_size: usize,
    max_pages: u64,
) -> impl Strategy<Value = PageOperation> {
    prop_oneof![
        6 => (page_address_strategy(page_size, max_pages), page_strategy(page_size))
            .prop_map(|(address, data)| PageOperation::Write { address, data }),
        2 => Just(PageOperation::Sync),
        1 => Just(PageOperation::Crash),
    ]
}

/// Strategy for a sequence of page store operations.
pub fn operation_sequence_strategy(
    page_size: usize,
    max_pages: u64,
    max_ops: usize,
) -> impl Strategy<Value = Vec<PageOperation>> {
    prop::collection::vec(page_operation_strategy(page_size, max_pages), 1..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::MemoryFiles;
    use cpstore_core::{FixedPageFile, StoreConfig};
    use std::collections::HashMap;

    const PAGE: usize = 512;

    fn config() -> StoreConfig {
        StoreConfig::default().page_size(PAGE).allocation_quantum(64)
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn generated_pages_have_page_size(page in page_strategy(PAGE)) {
            prop_assert_eq!(page.len(), PAGE);
        }

        #[test]
        fn generated_addresses_are_aligned(address in page_address_strategy(PAGE, 64)) {
            prop_assert!(address >= PAGE as u64);
            prop_assert_eq!(address % PAGE as u64, 0);
        }

        #[test]
        fn store_matches_model(ops in operation_sequence_strategy(PAGE, 8, 40)) {
            let files = MemoryFiles::new();
            let mut store = files.open(config()).unwrap();
            let mut durable: HashMap<u64, Vec<u8>> = HashMap::new();
            let mut pending: HashMap<u64, Vec<u8>> = HashMap::new();

            for op in ops {
                match op {
                    PageOperation::Write { address, data } => {
                        store.write(address, &data).unwrap();
                        pending.insert(address, data);
                    }
                    PageOperation::Sync => {
                        store.sync().unwrap();
                        durable.extend(pending.drain());
                    }
                    PageOperation::Crash => {
                        drop(store);
                        store = files.open(config()).unwrap();
                        pending.clear();
                    }
                }
            }

            let mut page = vec![0u8; PAGE];
            for n in 1..=8u64 {
                let address = n * PAGE as u64;
                let expected = pending.get(&address).or_else(|| durable.get(&address));
                let read = store.read(address, &mut page).unwrap();
                match expected {
                    Some(contents) => {
                        prop_assert_eq!(read, PAGE);
                        prop_assert_eq!(&page, contents);
                    }
                    None => prop_assert_eq!(read, 0),
                }
            }
            prop_assert!(store.verify().unwrap().is_ok());
        }
    }
}
