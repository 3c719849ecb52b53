//! Core type definitions: physical descriptors and page geometry.

use crate::error::{CoreError, CoreResult};
use std::fmt;

/// Packed location of a page payload in the data file.
///
/// A descriptor holds `(offset << log2(page_size)) | (size - 1)`: the
/// quantum-aligned byte offset of the payload and its stored length. The raw
/// value 0 means "no allocation"; it can never describe a real payload
/// because the first page of the data file is reserved for the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Descriptor(pub u64);

impl Descriptor {
    /// The empty descriptor.
    pub const NONE: Self = Self(0);

    /// Creates a descriptor from its raw packed value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw packed value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns `true` for the empty descriptor.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Converts the empty descriptor to `None`.
    #[must_use]
    pub const fn into_option(self) -> Option<Self> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "desc:{:#x}", self.0)
    }
}

/// Page and allocation-quantum sizes, with the arithmetic derived from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    page_size: usize,
    page_size_log: u32,
    quantum: u64,
    quantum_log: u32,
}

impl Geometry {
    /// Creates a geometry.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation unless both sizes are powers of two,
    /// the page holds at least one descriptor slot and the quantum does not
    /// exceed the page size.
    pub fn new(page_size: usize, quantum: u64) -> CoreResult<Self> {
        if !page_size.is_power_of_two() || page_size < 8 {
            return Err(CoreError::invariant(format!(
                "page size {page_size} is not a power of two >= 8"
            )));
        }
        if !quantum.is_power_of_two() || quantum > page_size as u64 {
            return Err(CoreError::invariant(format!(
                "allocation quantum {quantum} must be a power of two <= {page_size}"
            )));
        }
        Ok(Self {
            page_size,
            page_size_log: page_size.trailing_zeros(),
            quantum,
            quantum_log: quantum.trailing_zeros(),
        })
    }

    /// Logical page size in bytes.
    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// `log2(page_size)`.
    #[must_use]
    pub const fn page_size_log(&self) -> u32 {
        self.page_size_log
    }

    /// Allocation quantum in bytes.
    #[must_use]
    pub const fn quantum(&self) -> u64 {
        self.quantum
    }

    /// Returns `true` if `address` is a multiple of the page size.
    #[must_use]
    pub const fn is_aligned(&self, address: u64) -> bool {
        address & (self.page_size as u64 - 1) == 0
    }

    /// Byte position of the page index slot for `address`.
    #[must_use]
    pub const fn slot_position(&self, address: u64) -> u64 {
        address >> (self.page_size_log - 3)
    }

    /// Logical address owning the index slot at byte position `position`.
    #[must_use]
    pub const fn slot_address(&self, position: u64) -> u64 {
        position << (self.page_size_log - 3)
    }

    /// Number of quanta needed to hold `size` bytes.
    #[must_use]
    pub const fn quanta(&self, size: usize) -> u64 {
        (size as u64 + self.quantum - 1) >> self.quantum_log
    }

    /// Quanta reserved at the start of the data file for the header page.
    #[must_use]
    pub const fn header_quanta(&self) -> u64 {
        self.quanta(self.page_size)
    }

    /// Converts a quantum index to a byte offset.
    #[must_use]
    pub const fn quantum_offset(&self, position: u64) -> u64 {
        position << self.quantum_log
    }

    /// Converts a quantum-aligned byte offset to a quantum index.
    #[must_use]
    pub const fn quantum_position(&self, offset: u64) -> u64 {
        offset >> self.quantum_log
    }

    /// Packs an offset and a stored size into a descriptor.
    ///
    /// `size` must be in `1..=page_size`.
    #[must_use]
    pub const fn pack(&self, offset: u64, size: usize) -> Descriptor {
        Descriptor((offset << self.page_size_log) | (size as u64 - 1))
    }

    /// Byte offset of the payload described by `descriptor`.
    #[must_use]
    pub const fn offset(&self, descriptor: Descriptor) -> u64 {
        descriptor.0 >> self.page_size_log
    }

    /// Stored payload size described by `descriptor`.
    #[must_use]
    pub const fn size(&self, descriptor: Descriptor) -> usize {
        ((descriptor.0 & (self.page_size as u64 - 1)) + 1) as usize
    }

    /// Quantum index and quantum count occupied by `descriptor`.
    #[must_use]
    pub const fn extent(&self, descriptor: Descriptor) -> (u64, u64) {
        (
            self.quantum_position(self.offset(descriptor)),
            self.quanta(self.size(descriptor)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> Geometry {
        Geometry::new(4096, 512).unwrap()
    }

    #[test]
    fn pack_and_unpack() {
        let g = geometry();
        let d = g.pack(8192, 1234);
        assert_eq!(g.offset(d), 8192);
        assert_eq!(g.size(d), 1234);

        let full = g.pack(4096, 4096);
        assert_eq!(g.offset(full), 4096);
        assert_eq!(g.size(full), 4096);
        assert!(!full.is_none());
    }

    #[test]
    fn slot_position_is_eight_bytes_per_page() {
        let g = geometry();
        assert_eq!(g.slot_position(4096), 8);
        assert_eq!(g.slot_position(3 * 4096), 24);
        assert_eq!(g.slot_address(24), 3 * 4096);
    }

    #[test]
    fn quanta_round_up() {
        let g = geometry();
        assert_eq!(g.quanta(1), 1);
        assert_eq!(g.quanta(512), 1);
        assert_eq!(g.quanta(513), 2);
        assert_eq!(g.quanta(4096), 8);
        assert_eq!(g.header_quanta(), 8);
    }

    #[test]
    fn extent_of_descriptor() {
        let g = geometry();
        let d = g.pack(g.quantum_offset(10), 1500);
        assert_eq!(g.extent(d), (10, 3));
    }

    #[test]
    fn alignment() {
        let g = geometry();
        assert!(g.is_aligned(0));
        assert!(g.is_aligned(8192));
        assert!(!g.is_aligned(100));
    }

    #[test]
    fn rejects_bad_sizes() {
        assert!(Geometry::new(1000, 512).is_err());
        assert!(Geometry::new(4096, 8192).is_err());
        assert!(Geometry::new(4096, 500).is_err());
    }

    #[test]
    fn none_descriptor() {
        assert!(Descriptor::NONE.is_none());
        assert_eq!(Descriptor::NONE.into_option(), None);
        assert_eq!(Descriptor::new(7).into_option(), Some(Descriptor(7)));
    }
}
