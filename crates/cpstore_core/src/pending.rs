//! Remaps written since the last `sync`.
//!
//! Each write places a page at a new physical location and records it here
//! until the next `sync` persists it into the recovery log and the page
//! index. The descriptor a remap replaces is kept alongside so that its
//! space can be freed once the new location is durable.

use crate::types::Descriptor;
use std::collections::BTreeMap;

/// A logical page moved to a new physical location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRemap {
    /// Logical page address.
    pub address: u64,
    /// Descriptor of the freshly written payload.
    pub new: Descriptor,
    /// Durable descriptor being replaced, or [`Descriptor::NONE`] for a first write.
    pub old: Descriptor,
}

/// In-memory map of pending remaps keyed by logical address.
///
/// Iteration is in ascending address order and stable for as long as the
/// buffer is not modified.
#[derive(Debug, Default)]
pub struct PendingRemaps {
    entries: BTreeMap<u64, (Descriptor, Descriptor)>,
}

impl PendingRemaps {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pending remap for `address`, if any.
    #[must_use]
    pub fn get(&self, address: u64) -> Option<PendingRemap> {
        self.entries
            .get(&address)
            .map(|&(new, old)| PendingRemap { address, new, old })
    }

    /// Returns the pending descriptor for `address`, or [`Descriptor::NONE`].
    #[must_use]
    pub fn descriptor(&self, address: u64) -> Descriptor {
        self.entries
            .get(&address)
            .map_or(Descriptor::NONE, |&(new, _)| new)
    }

    /// Records a remap.
    ///
    /// When `address` already has a pending entry only its new descriptor is
    /// replaced; the originally recorded `old` is kept, because that is the
    /// durable allocation that must be freed after the next sync.
    pub fn put(&mut self, address: u64, new: Descriptor, old: Descriptor) {
        self.entries
            .entry(address)
            .and_modify(|entry| entry.0 = new)
            .or_insert((new, old));
    }

    /// Iterates over pending remaps in address order.
    pub fn iter(&self) -> impl Iterator<Item = PendingRemap> + '_ {
        self.entries
            .iter()
            .map(|(&address, &(new, old))| PendingRemap { address, new, old })
    }

    /// Removes every pending remap.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of pending remaps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
