//! Memory-mapped page index.

use super::{decode_slot, PageIndex, SLOT_SIZE};
use crate::error::{CoreError, CoreResult};
use crate::types::{Descriptor, Geometry};
use memmap2::{Mmap, MmapMut};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

enum Mapping {
    Writable(MmapMut),
    ReadOnly(Option<Mmap>),
}

/// Page index backed by a memory-mapped file.
///
/// Updates go straight into the shared mapping and reach the file through
/// the OS page cache; [`flush`](PageIndex::flush) forces them to disk. When a
/// slot beyond the mapped extent is written, the file is doubled (or grown
/// exactly enough, if that is more) and remapped before the write.
pub struct MappedPageIndex {
    path: PathBuf,
    file: File,
    map: Mapping,
    geometry: Geometry,
}

impl MappedPageIndex {
    /// Opens or creates a writable index file of at least `initial_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns a file access error if the file cannot be opened, sized or mapped.
    pub fn open(path: &Path, geometry: Geometry, initial_size: u64) -> CoreResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let initial = initial_size.max(2 * SLOT_SIZE as u64).next_multiple_of(SLOT_SIZE as u64);
        if file.metadata()?.len() < initial {
            file.set_len(initial)?;
        }

        let map = map_writable(&file)?;
        debug!(path = %path.display(), extent = map.len(), "mapped page index");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            map: Mapping::Writable(map),
            geometry,
        })
    }

    /// Opens an existing index file read-only. The index never grows.
    ///
    /// # Errors
    ///
    /// Returns a file access error if the file does not exist or cannot be mapped.
    pub fn open_read_only(path: &Path, geometry: Geometry) -> CoreResult<Self> {
        let file = File::open(path)?;
        let map = if file.metadata()?.len() == 0 {
            None
        } else {
            // SAFETY: the mapping is only read, and the store's contract is
            // that no other process truncates the index while it is open.
            #[allow(unsafe_code)]
            let map = unsafe { Mmap::map(&file)? };
            Some(map)
        };

        Ok(Self {
            path: path.to_path_buf(),
            file,
            map: Mapping::ReadOnly(map),
            geometry,
        })
    }

    /// Path of the index file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn bytes(&self) -> &[u8] {
        match &self.map {
            Mapping::Writable(map) => &map[..],
            Mapping::ReadOnly(Some(map)) => &map[..],
            Mapping::ReadOnly(None) => &[],
        }
    }

    fn grow(&mut self, required: u64) -> CoreResult<()> {
        let new_len = (self.bytes().len() as u64 * 2).max(required);

        // Unmap before resizing; dirty pages stay in the page cache.
        drop(std::mem::replace(&mut self.map, Mapping::ReadOnly(None)));
        let resized = self.file.set_len(new_len);

        // Remap even when resizing failed so the index stays usable.
        self.map = Mapping::Writable(map_writable(&self.file)?);
        resized?;

        debug!(path = %self.path.display(), extent = new_len, "grew page index");
        Ok(())
    }
}

impl PageIndex for MappedPageIndex {
    fn get(&self, address: u64) -> CoreResult<Option<Descriptor>> {
        let pos = self.geometry.slot_position(address) as usize;
        let bytes = self.bytes();
        if pos + SLOT_SIZE > bytes.len() {
            return Ok(None);
        }
        Ok(decode_slot(&bytes[pos..]).into_option())
    }

    fn set(&mut self, address: u64, descriptor: Descriptor) -> CoreResult<()> {
        if !matches!(self.map, Mapping::Writable(_)) {
            return Err(CoreError::read_only("page index update"));
        }

        let pos = self.geometry.slot_position(address) as usize;
        let end = pos + SLOT_SIZE;
        if end > self.bytes().len() {
            self.grow(end as u64)?;
        }

        if let Mapping::Writable(map) = &mut self.map {
            map[pos..end].copy_from_slice(&descriptor.as_u64().to_le_bytes());
        }
        Ok(())
    }

    fn flush(&mut self) -> CoreResult<()> {
        if let Mapping::Writable(map) = &self.map {
            map.flush()?;
        }
        Ok(())
    }

    fn scan(&self, visit: &mut dyn FnMut(u64, Descriptor) -> CoreResult<()>) -> CoreResult<()> {
        for (slot, chunk) in self.bytes().chunks_exact(SLOT_SIZE).enumerate().skip(1) {
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
        Ok(self.bytes().len() as u64)
    }
}

impl std::fmt::Debug for MappedPageIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedPageIndex")
            .field("path", &self.path)
            .field("extent", &self.bytes().len())
            .field("writable", &matches!(self.map, Mapping::Writable(_)))
            .finish()
    }
}

fn map_writable(file: &File) -> CoreResult<MmapMut> {
    // SAFETY: the store is the only writer of the index file and does not
    // truncate it while mapped; growth drops the mapping before resizing.
    #[allow(unsafe_code)]
    let map = unsafe { MmapMut::map_mut(file)? };
    Ok(map)
}
