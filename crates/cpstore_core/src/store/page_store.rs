//! The compressed page store.

use super::page_file::FixedPageFile;
use super::stats::{StoreCounters, StoreStats, VerifyReport};
use crate::alloc::{BitmapAllocator, SpaceAllocator};
use crate::cipher::StreamCipher;
use crate::codec;
use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::index::{MappedPageIndex, PageIndex};
use crate::log::{LogEntry, RecoveryLog, ReplaySummary};
use crate::pending::PendingRemaps;
use crate::types::{Descriptor, Geometry};
use cpstore_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, trace};

/// Fixed-page file storing compressed, optionally encrypted pages.
///
/// Every write places the page's payload at a fresh quantum-aligned location
/// in the data file and records the move in the pending remap buffer. The
/// durable location of a page is never overwritten: only a location written
/// since the last `sync` is reused in place, and only when the new payload
/// needs the same number of quanta. `sync` appends the pending remaps to the
/// recovery log, applies them to the page index and only then frees the
/// replaced allocations.
///
/// On open the recovery log is replayed into the page index. A writable
/// store then flushes the index and truncates the log; a read-only store
/// keeps the replayed remaps in memory and never touches the files. The
/// space allocator is rebuilt from the resulting set of live pages.
///
/// Dropping a store without [`close`](FixedPageFile::close) behaves like a
/// crash: unsynced writes are lost on the next open.
pub struct CompressedPageStore {
    config: StoreConfig,
    geometry: Geometry,
    data: Box<dyn StorageBackend>,
    index: Box<dyn PageIndex>,
    log: RecoveryLog,
    allocator: Box<dyn SpaceAllocator>,
    pending: PendingRemaps,
    /// Remaps replayed into a read-only store, shadowing the index.
    recovered: HashMap<u64, Descriptor>,
    cipher: Option<StreamCipher>,
    counters: StoreCounters,
    closed: bool,
}

impl CompressedPageStore {
    /// Opens (or, unless read-only, creates) the data, index and log files
    /// named by `config`.
    ///
    /// # Errors
    ///
    /// Returns a file access error if any file cannot be opened or mapped, and
    /// an invariant violation for a bad configuration or a corrupt index or log.
    pub fn open(config: StoreConfig) -> CoreResult<Self> {
        config.validate()?;
        let geometry = Geometry::new(config.page_size, config.allocation_quantum)?;
        let read_only = config.read_only;

        let data = FileBackend::open_with(&config.data_path, read_only)?;
        let log: Box<dyn StorageBackend> = if read_only && !config.log_path.exists() {
            Box::new(InMemoryBackend::new())
        } else {
            Box::new(FileBackend::open_with(&config.log_path, read_only)?)
        };
        let index: Box<dyn PageIndex> = if read_only {
            Box::new(MappedPageIndex::open_read_only(&config.index_path, geometry)?)
        } else {
            Box::new(MappedPageIndex::open(
                &config.index_path,
                geometry,
                config.initial_index_size,
            )?)
        };

        Self::assemble(config, geometry, Box::new(data), log, index)
    }

    /// Opens a store over caller-supplied backends.
    ///
    /// The paths in `config` are ignored. `index` must have been created with
    /// the geometry implied by `config`.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open), minus file opening.
    pub fn open_with_backends(
        config: StoreConfig,
        data: Box<dyn StorageBackend>,
        log: Box<dyn StorageBackend>,
        index: Box<dyn PageIndex>,
    ) -> CoreResult<Self> {
        config.validate()?;
        let geometry = Geometry::new(config.page_size, config.allocation_quantum)?;
        Self::assemble(config, geometry, data, log, index)
    }

    fn assemble(
        config: StoreConfig,
        geometry: Geometry,
        data: Box<dyn StorageBackend>,
        log: Box<dyn StorageBackend>,
        mut index: Box<dyn PageIndex>,
    ) -> CoreResult<Self> {
        let mut log = RecoveryLog::new(log, !config.no_flush);
        let (summary, recovered) = recover(index.as_mut(), &mut log, geometry, config.read_only)?;

        let pages = durable_pages(index.as_ref(), &recovered)?;
        let allocator = rebuild_allocator(&config, geometry, data.size()?, &pages)?;

        let cipher = config
            .passphrase
            .as_deref()
            .map(|passphrase| StreamCipher::new(passphrase.as_bytes(), geometry.page_size()))
            .transpose()?;

        info!(
            data = %config.data_path.display(),
            page_size = geometry.page_size(),
            pages = pages.len(),
            replayed = summary.records,
            torn_tail = summary.torn_at.is_some(),
            read_only = config.read_only,
            "opened page store"
        );

        Ok(Self {
            config,
            geometry,
            data,
            index,
            log,
            allocator: Box::new(allocator),
            pending: PendingRemaps::new(),
            recovered,
            cipher,
            counters: StoreCounters::default(),
            closed: false,
        })
    }

    /// Store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Page and quantum geometry.
    #[must_use]
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Number of pages written since the last sync.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` once [`close`](FixedPageFile::close) has succeeded.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Flushes the page index to disk and truncates the recovery log.
    ///
    /// Only synced remaps are covered; pending writes stay pending. `sync`
    /// calls this on its own once the log passes the checkpoint threshold.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ReadOnly`] on a read-only store, or a file access
    /// error if the flush or truncation fails.
    pub fn checkpoint(&mut self) -> CoreResult<()> {
        self.ensure_writable("checkpoint")?;

        let log_length = self.log.size()?;
        self.index.flush()?;
        self.log.clear()?;
        self.counters.record_checkpoint();

        debug!(log_length, "checkpointed page index");
        Ok(())
    }

    /// Every page that currently resolves to a payload, pending writes included.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the index cannot be read.
    pub fn live_pages(&self) -> CoreResult<BTreeMap<u64, Descriptor>> {
        self.ensure_open()?;
        let mut pages = durable_pages(self.index.as_ref(), &self.recovered)?;
        pages.extend(self.pending.iter().map(|remap| (remap.address, remap.new)));
        Ok(pages)
    }

    /// Collects sizes and counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or a file size cannot be read.
    pub fn stats(&self) -> CoreResult<StoreStats> {
        let pages = self.live_pages()?;
        let payload_bytes = pages
            .values()
            .map(|&descriptor| self.geometry.size(descriptor) as u64)
            .sum();

        Ok(StoreStats {
            page_size: self.geometry.page_size(),
            live_pages: pages.len() as u64,
            pending_pages: self.pending.len() as u64,
            payload_bytes,
            data_length: self.data.size()?,
            log_length: self.log.size()?,
            index_extent: self.index.extent()?,
            allocated_quanta: self.allocator.used(),
            capacity_quanta: self.allocator.capacity(),
            encrypted: self.cipher.is_some(),
            read_only: self.config.read_only,
            operations: self.counters.snapshot(),
        })
    }

    /// Decodes every live page and checks that payloads are aligned, lie
    /// inside the data file and do not overlap each other or the header.
    ///
    /// Corrupt pages are reported, not raised.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or an I/O failure occurs.
    pub fn verify(&self) -> CoreResult<VerifyReport> {
        let pages = self.live_pages()?;
        let data_length = self.data.size()?;
        let header_end = self.geometry.quantum_offset(self.geometry.header_quanta());

        let mut report = VerifyReport::default();
        let mut extents = Vec::with_capacity(pages.len());
        let mut page = vec![0u8; self.geometry.page_size()];

        for (&address, &descriptor) in &pages {
            report.pages_checked += 1;
            let offset = self.geometry.offset(descriptor);
            let size = self.geometry.size(descriptor) as u64;

            if offset % self.geometry.quantum() != 0 {
                report.problem(format!(
                    "page {address:#x}: offset {offset} is not quantum-aligned"
                ));
                continue;
            }
            if offset < header_end {
                report.problem(format!(
                    "page {address:#x}: offset {offset} lies in the header page"
                ));
                continue;
            }
            if offset + size > data_length {
                report.problem(format!(
                    "page {address:#x}: payload {offset}..{} runs past the data file end {data_length}",
                    offset + size
                ));
                continue;
            }

            match self.read_page(address, descriptor, &mut page) {
                Ok(()) => {}
                Err(e) if e.is_fatal() => report.problem(e.to_string()),
                Err(e) => return Err(e),
            }

            let (position, quanta) = self.geometry.extent(descriptor);
            extents.push((position, position + quanta, address));
        }

        extents.sort_unstable();
        for pair in extents.windows(2) {
            let (_, end, first) = pair[0];
            let (start, _, second) = pair[1];
            if start < end {
                report.problem(format!(
                    "pages {first:#x} and {second:#x} share quantum {start}"
                ));
            }
        }

        debug!(
            pages = report.pages_checked,
            problems = report.problems.len(),
            "verified page store"
        );
        Ok(report)
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.closed {
            Err(CoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn ensure_writable(&self, operation: &'static str) -> CoreResult<()> {
        self.ensure_open()?;
        if self.config.read_only {
            return Err(CoreError::read_only(operation));
        }
        Ok(())
    }

    fn check_page(&self, address: u64, len: usize) -> CoreResult<()> {
        if !self.geometry.is_aligned(address) {
            return Err(CoreError::invariant(format!(
                "address {address:#x} is not aligned to the {}-byte page size",
                self.geometry.page_size()
            )));
        }
        if len != self.geometry.page_size() {
            return Err(CoreError::invariant(format!(
                "page buffer of {len} bytes, expected {}",
                self.geometry.page_size()
            )));
        }
        Ok(())
    }

    /// Descriptor as of the last sync.
    fn durable_descriptor(&self, address: u64) -> CoreResult<Option<Descriptor>> {
        match self.recovered.get(&address) {
            Some(&descriptor) => Ok(Some(descriptor)),
            None => self.index.get(address),
        }
    }

    fn resolve(&self, address: u64) -> CoreResult<Option<Descriptor>> {
        match self.pending.get(address) {
            Some(remap) => Ok(Some(remap.new)),
            None => self.durable_descriptor(address),
        }
    }

    fn write_header(&mut self, header: &[u8]) -> CoreResult<()> {
        if header.len() > self.geometry.page_size() {
            return Err(CoreError::invariant(format!(
                "header of {} bytes exceeds the {}-byte header page",
                header.len(),
                self.geometry.page_size()
            )));
        }

        self.data.write_at(0, header)?;
        self.counters.record_write(header.len() as u64);
        trace!(len = header.len(), "wrote header page");
        Ok(())
    }

    fn write_page(&mut self, address: u64, page: &[u8]) -> CoreResult<()> {
        self.check_page(address, page.len())?;
        let geometry = self.geometry;

        let payload = codec::encode_page(page, self.config.compression_level)?;
        let payload = match &self.cipher {
            Some(cipher) => {
                let mut sealed = payload.into_owned();
                cipher.crypt(&mut sealed)?;
                Cow::Owned(sealed)
            }
            None => payload,
        };
        let size = payload.len();
        let quanta = geometry.quanta(size);

        let pending = self.pending.get(address);
        let in_place = pending.filter(|remap| geometry.extent(remap.new).1 == quanta);
        let offset = match in_place {
            Some(remap) => geometry.offset(remap.new),
            None => geometry.quantum_offset(self.allocator.allocate(quanta)),
        };

        if let Err(e) = self.data.write_at(offset, &payload) {
            if in_place.is_none() {
                self.allocator
                    .free(geometry.quantum_position(offset), quanta)?;
            }
            return Err(e.into());
        }

        let old = match pending {
            Some(remap) => {
                if in_place.is_none() {
                    // The superseded payload was never synced; nothing refers to it.
                    let (position, quanta) = geometry.extent(remap.new);
                    self.allocator.free(position, quanta)?;
                }
                remap.old
            }
            None => self
                .durable_descriptor(address)?
                .unwrap_or(Descriptor::NONE),
        };

        self.pending.put(address, geometry.pack(offset, size), old);
        self.counters.record_write(size as u64);
        trace!(address, size, offset, in_place = in_place.is_some(), "wrote page");
        Ok(())
    }

    fn read_page(&self, address: u64, descriptor: Descriptor, page: &mut [u8]) -> CoreResult<()> {
        let offset = self.geometry.offset(descriptor);
        let size = self.geometry.size(descriptor);

        let mut payload = self.data.read_at(offset, size)?;
        if let Some(cipher) = &self.cipher {
            cipher.crypt(&mut payload)?;
        }
        codec::decode_page(&payload, page).map_err(|e| match e {
            CoreError::InvariantViolation { message } => {
                CoreError::invariant(format!("page {address:#x} at offset {offset}: {message}"))
            }
            other => other,
        })
    }
}

impl FixedPageFile for CompressedPageStore {
    fn write(&mut self, address: u64, page: &[u8]) -> CoreResult<()> {
        self.ensure_writable("write")?;
        if address == 0 {
            self.write_header(page)
        } else {
            self.write_page(address, page)
        }
    }

    fn read(&self, address: u64, page: &mut [u8]) -> CoreResult<usize> {
        self.ensure_open()?;
        self.counters.record_read();

        if address == 0 {
            let len = page.len().min(self.geometry.page_size());
            return Ok(self.data.read_into(0, &mut page[..len])?);
        }

        self.check_page(address, page.len())?;
        match self.resolve(address)? {
            Some(descriptor) => {
                self.read_page(address, descriptor, page)?;
                Ok(page.len())
            }
            None => Ok(0),
        }
    }

    fn sync(&mut self) -> CoreResult<()> {
        self.ensure_open()?;
        if self.config.read_only {
            return Ok(());
        }

        if self.config.no_flush {
            self.data.flush()?;
        } else {
            self.data.sync()?;
        }
        if self.pending.is_empty() {
            return Ok(());
        }

        let entries: Vec<LogEntry> = self.pending.iter().map(LogEntry::from).collect();
        self.log.append(&entries)?;
        for entry in &entries {
            self.index.set(entry.address, entry.descriptor)?;
        }
        for remap in self.pending.iter() {
            if !remap.old.is_none() {
                let (position, quanta) = self.geometry.extent(remap.old);
                self.allocator.free(position, quanta)?;
            }
        }
        self.pending.clear();
        self.counters.record_sync();

        let log_length = self.log.size()?;
        debug!(entries = entries.len(), log_length, "synced pending remaps");
        if log_length > self.config.checkpoint_threshold {
            self.checkpoint()?;
        }
        Ok(())
    }

    fn length(&self) -> CoreResult<u64> {
        self.ensure_open()?;
        Ok(self.data.size()?)
    }

    fn lock(&self, shared: bool) -> CoreResult<()> {
        self.ensure_open()?;
        Ok(self.data.lock(shared)?)
    }

    fn try_lock(&self, shared: bool) -> CoreResult<bool> {
        self.ensure_open()?;
        Ok(self.data.try_lock(shared)?)
    }

    fn unlock(&self) -> CoreResult<()> {
        self.ensure_open()?;
        Ok(self.data.unlock()?)
    }

    fn close(&mut self) -> CoreResult<()> {
        if self.closed {
            return Ok(());
        }
        if !self.pending.is_empty() {
            return Err(CoreError::invariant(format!(
                "close with {} unsynced pages",
                self.pending.len()
            )));
        }

        if !self.config.read_only {
            if self.config.no_flush {
                self.data.flush()?;
            } else {
                self.data.sync()?;
            }
            self.checkpoint()?;
        }

        // Release any advisory lock taken through `lock`.
        if let Err(e) = self.data.unlock() {
            debug!(error = %e, "unlock at close failed");
        }
        self.closed = true;
        info!(data = %self.config.data_path.display(), "closed page store");
        Ok(())
    }
}

impl std::fmt::Debug for CompressedPageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressedPageStore")
            .field("config", &self.config)
            .field("pending", &self.pending.len())
            .field("allocator", &self.allocator)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Replays the recovery log.
///
/// Writable stores apply the remaps to the index, flush it and truncate the
/// log. Read-only stores collect them in the returned map instead.
fn recover(
    index: &mut dyn PageIndex,
    log: &mut RecoveryLog,
    geometry: Geometry,
    read_only: bool,
) -> CoreResult<(ReplaySummary, HashMap<u64, Descriptor>)> {
    let mut recovered = HashMap::new();
    let summary = log.replay(|entry| {
        check_replayed(geometry, entry)?;
        if read_only {
            recovered.insert(entry.address, entry.descriptor);
            Ok(())
        } else {
            index.set(entry.address, entry.descriptor)
        }
    })?;

    if !read_only && !summary.is_empty() {
        index.flush()?;
        log.clear()?;
        debug!(
            records = summary.records,
            entries = summary.entries,
            "applied recovery log to page index"
        );
    }

    Ok((summary, recovered))
}

fn check_replayed(geometry: Geometry, entry: &LogEntry) -> CoreResult<()> {
    if entry.address == 0 || !geometry.is_aligned(entry.address) {
        return Err(CoreError::invariant(format!(
            "recovery log remaps invalid address {:#x}",
            entry.address
        )));
    }
    if entry.descriptor.is_none() {
        return Err(CoreError::invariant(format!(
            "recovery log remaps {:#x} to an empty descriptor",
            entry.address
        )));
    }
    Ok(())
}

/// Pages recorded in the index, overlaid with replayed remaps.
fn durable_pages(
    index: &dyn PageIndex,
    recovered: &HashMap<u64, Descriptor>,
) -> CoreResult<BTreeMap<u64, Descriptor>> {
    let mut pages = BTreeMap::new();
    index.scan(&mut |address, descriptor| {
        pages.insert(address, descriptor);
        Ok(())
    })?;
    pages.extend(recovered.iter().map(|(&address, &descriptor)| (address, descriptor)));
    Ok(pages)
}

fn rebuild_allocator(
    config: &StoreConfig,
    geometry: Geometry,
    data_length: u64,
    pages: &BTreeMap<u64, Descriptor>,
) -> CoreResult<BitmapAllocator> {
    let header = geometry.header_quanta();
    let capacity = data_length.div_ceil(geometry.quantum()).max(header);
    let extension = config.extension_quantum / geometry.quantum();
    let mut allocator = BitmapAllocator::new(capacity, header, extension);

    for (&address, &descriptor) in pages {
        if geometry.offset(descriptor) % geometry.quantum() != 0 {
            return Err(CoreError::invariant(format!(
                "page {address:#x} has unaligned descriptor {descriptor}"
            )));
        }
        let (position, quanta) = geometry.extent(descriptor);
        allocator.reserve(position, quanta)?;
    }
    Ok(allocator)
}
