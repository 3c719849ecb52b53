//! Page index over a positional storage backend.

use super::{decode_slot, PageIndex, SLOT_SIZE};
use crate::error::{CoreError, CoreResult};
use crate::types::{Descriptor, Geometry};
use cpstore_storage::StorageBackend;

/// Page index stored through a [`StorageBackend`].
///
/// Same on-disk layout as [`MappedPageIndex`](super::MappedPageIndex), but
/// every lookup is a positional read. Useful where mapping is unavailable
/// and for in-memory stores in tests.
pub struct BackendPageIndex {
    backend: Box<dyn StorageBackend>,
    geometry: Geometry,
    read_only: bool,
}

impl BackendPageIndex {
    /// Creates an index over `backend`, zero-extending it to `initial_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be sized.
    pub fn new(
        backend: Box<dyn StorageBackend>,
        geometry: Geometry,
        initial_size: u64,
    ) -> CoreResult<Self> {
        let mut index = Self {
            backend,
            geometry,
            read_only: false,
        };
        let initial = initial_size.next_multiple_of(SLOT_SIZE as u64);
        let size = index.backend.size()?;
        if size < initial {
            index.zero_extend(size, initial)?;
        }
        Ok(index)
    }

    /// Creates an index over `backend` that rejects updates.
    #[must_use]
    pub fn read_only(backend: Box<dyn StorageBackend>, geometry: Geometry) -> Self {
        Self {
            backend,
            geometry,
            read_only: true,
        }
    }

    fn zero_extend(&mut self, from: u64, to: u64) -> CoreResult<()> {
        let fill = usize::try_from(to - from)
            .map_err(|_| CoreError::invariant(format!("page index extent {to} is too large")))?;
        self.backend.write_at(from, &vec![0u8; fill])?;
        Ok(())
    }
}

impl PageIndex for BackendPageIndex {
    fn get(&self, address: u64) -> CoreResult<Option<Descriptor>> {
        let pos = self.geometry.slot_position(address);
        if pos + SLOT_SIZE as u64 > self.backend.size()? {
            return Ok(None);
        }
        let slot = self.backend.read_at(pos, SLOT_SIZE)?;
        Ok(decode_slot(&slot).into_option())
    }

    fn set(&mut self, address: u64, descriptor: Descriptor) -> CoreResult<()> {
        if self.read_only {
            return Err(CoreError::read_only("page index update"));
        }

        let pos = self.geometry.slot_position(address);
        let end = pos + SLOT_SIZE as u64;
        let size = self.backend.size()?;
        if end > size {
            self.zero_extend(size, (size * 2).max(end))?;
        }

        self.backend
            .write_at(pos, &descriptor.as_u64().to_le_bytes())?;
        Ok(())
    }

    fn flush(&mut self) -> CoreResult<()> {
        if !self.read_only {
            self.backend.sync()?;
        }
        Ok(())
    }

    fn scan(&self, visit: &mut dyn FnMut(u64, Descriptor) -> CoreResult<()>) -> CoreResult<()> {
        let size = usize::try_from(self.backend.size()?)
            .map_err(|_| CoreError::invariant("page index does not fit in memory"))?;
        let table = self.backend.read_at(0, size - size % SLOT_SIZE)?;

        for (slot, chunk) in table.chunks_exact(SLOT_SIZE).enumerate().skip(1) {
            let descriptor = decode_slot(chunk);
            if !descriptor.is_none() {
                visit(
                    self.geometry.slot_address((slot * SLOT_SIZE) as u64),
                    descriptor,
                )?;
            }
        }
        Ok(())
    }

    fn extent(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }
}

impl std::fmt::Debug for BackendPageIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendPageIndex")
            .field("geometry", &self.geometry)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpstore_storage::InMemoryBackend;

    fn geometry() -> Geometry {
        Geometry::new(4096, 512).unwrap()
    }

    #[test]
    fn initial_extent_is_zeroed() {
        let backend = InMemoryBackend::new();
        let index = BackendPageIndex::new(Box::new(backend.clone()), geometry(), 100).unwrap();

        assert_eq!(index.extent().unwrap(), 104);
        assert!(backend.data().iter().all(|&b| b == 0));
        assert_eq!(index.get(4096).unwrap(), None);
    }

    #[test]
    fn set_grows_and_writes_little_endian() {
        let backend = InMemoryBackend::new();
        let mut index = BackendPageIndex::new(Box::new(backend.clone()), geometry(), 16).unwrap();

        index.set(4096, Descriptor(0x0102)).unwrap();
        index.set(10 * 4096, Descriptor(7)).unwrap();

        assert_eq!(index.extent().unwrap(), 88);
        let data = backend.data();
        assert_eq!(&data[8..16], &0x0102u64.to_le_bytes());
        assert_eq!(index.get(10 * 4096).unwrap(), Some(Descriptor(7)));
        assert_eq!(index.get(9 * 4096).unwrap(), None);
    }

    #[test]
    fn scan_reports_live_slots() {
        let mut index =
            BackendPageIndex::new(Box::new(InMemoryBackend::new()), geometry(), 64).unwrap();
        index.set(3 * 4096, Descriptor(3)).unwrap();
        index.set(4096, Descriptor(1)).unwrap();

        let mut seen = Vec::new();
        index
            .scan(&mut |address, _| {
                seen.push(address);
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![4096, 3 * 4096]);
    }

    #[test]
    fn read_only_index_rejects_set() {
        let backend = InMemoryBackend::with_data(vec![0u8; 64]);
        let mut index = BackendPageIndex::read_only(Box::new(backend), geometry());
        assert!(matches!(
            index.set(4096, Descriptor(1)),
            Err(CoreError::ReadOnly { .. })
        ));
        assert!(index.flush().is_ok());
    }
}
