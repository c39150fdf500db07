//! In-memory storage mechanism for tests and embedding.
//!
//! [`InMemoryFactory`] owns the backing data. Every [`InMemoryMechanism`] it
//! creates is a separate instance with its own lifecycle, but all of them read
//! and write the same cells, so content written through one muxer is visible
//! to the next. Data is lost when the factory and all instances are dropped.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use oms_types::{CellId, Expiration, ManifestDb, SegmentDataDb};
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::traits::{MechanismFactory, RemovedCallback, StorageCell, StorageMechanism};

const CREATED: u8 = 0;
const OPEN: u8 = 1;
const CLOSED: u8 = 2;

/// Key-allocating table of records.
#[derive(Debug)]
struct Table<T> {
    next_key: u64,
    rows: BTreeMap<u64, T>,
}

impl<T> Table<T> {
    fn new() -> Self {
        Self {
            next_key: 0,
            rows: BTreeMap::new(),
        }
    }

    fn insert(&mut self, row: T) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        self.rows.insert(key, row);
        key
    }

    fn remove_all(&mut self, keys: &[u64], on_removed: RemovedCallback<'_>) {
        for key in keys {
            if self.rows.remove(key).is_some() {
                on_removed(*key);
            }
        }
    }
}

impl<T: Clone> Table<T> {
    fn get_all(&self, keys: &[u64]) -> Vec<Option<T>> {
        keys.iter().map(|key| self.rows.get(key).cloned()).collect()
    }
}

#[derive(Debug)]
struct CellData {
    read_only: bool,
    manifests: Table<ManifestDb>,
    segments: Table<SegmentDataDb>,
}

impl CellData {
    fn new(read_only: bool) -> Self {
        Self {
            read_only,
            manifests: Table::new(),
            segments: Table::new(),
        }
    }
}

type SharedCells = Arc<BTreeMap<CellId, Arc<RwLock<CellData>>>>;

/// Builds and owns the shared backing for in-memory mechanisms.
///
/// Clones share the same backing.
#[derive(Clone)]
pub struct InMemoryFactory {
    name: String,
    supported: bool,
    cells: SharedCells,
}

impl InMemoryFactory {
    /// A supported factory with one writable cell named `default`.
    pub fn new() -> Self {
        Self::builder().cell(default_cell_id()).build()
    }

    pub fn builder() -> InMemoryFactoryBuilder {
        InMemoryFactoryBuilder {
            name: "memory".into(),
            supported: true,
            cells: BTreeMap::new(),
        }
    }

    /// Insert manifests directly into a cell, bypassing lifecycle and
    /// read-only checks. Used to stage legacy content.
    pub fn seed(&self, cell: &CellId, manifests: Vec<ManifestDb>) -> StorageResult<Vec<u64>> {
        let data = self
            .cells
            .get(cell)
            .ok_or_else(|| StorageError::Backend(format!("unknown cell {cell}")))?;
        let mut data = write_lock(data)?;
        Ok(manifests
            .into_iter()
            .map(|m| data.manifests.insert(m))
            .collect())
    }

    /// Total number of manifests across all cells.
    pub fn manifest_count(&self) -> usize {
        self.cells
            .values()
            .filter_map(|cell| cell.read().ok().map(|d| d.manifests.rows.len()))
            .sum()
    }
}

impl Default for InMemoryFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MechanismFactory for InMemoryFactory {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn create(&self) -> Arc<dyn StorageMechanism> {
        Arc::new(InMemoryMechanism {
            name: self.name.clone(),
            state: Arc::new(AtomicU8::new(CREATED)),
            cells: Arc::clone(&self.cells),
        })
    }
}

impl std::fmt::Debug for InMemoryFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryFactory")
            .field("name", &self.name)
            .field("supported", &self.supported)
            .field("cells", &self.cells.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`InMemoryFactory`].
pub struct InMemoryFactoryBuilder {
    name: String,
    supported: bool,
    cells: BTreeMap<CellId, bool>,
}

impl InMemoryFactoryBuilder {
    /// Label used in log lines and error messages.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Report the mechanism as unavailable on this platform.
    pub fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }

    /// Add a writable cell.
    pub fn cell(mut self, id: CellId) -> Self {
        self.cells.insert(id, false);
        self
    }

    /// Add a cell that rejects new content.
    pub fn read_only_cell(mut self, id: CellId) -> Self {
        self.cells.insert(id, true);
        self
    }

    pub fn build(self) -> InMemoryFactory {
        let cells = self
            .cells
            .into_iter()
            .map(|(id, read_only)| (id, Arc::new(RwLock::new(CellData::new(read_only)))))
            .collect();
        InMemoryFactory {
            name: self.name,
            supported: self.supported,
            cells: Arc::new(cells),
        }
    }
}

fn default_cell_id() -> CellId {
    CellId::new("default").unwrap_or_else(|_| unreachable!("'default' is a valid cell id"))
}

/// One instance of the in-memory mechanism.
pub struct InMemoryMechanism {
    name: String,
    state: Arc<AtomicU8>,
    cells: SharedCells,
}

impl InMemoryMechanism {
    fn ensure_open(&self) -> StorageResult<()> {
        check_open(&self.name, &self.state)
    }
}

#[async_trait]
impl StorageMechanism for InMemoryMechanism {
    async fn init(&self) -> StorageResult<()> {
        match self
            .state
            .compare_exchange(CREATED, OPEN, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) | Err(OPEN) => {
                debug!(mechanism = %self.name, "in-memory mechanism initialized");
                Ok(())
            }
            Err(_) => Err(StorageError::Closed {
                mechanism: self.name.clone(),
            }),
        }
    }

    fn cells(&self) -> BTreeMap<CellId, Arc<dyn StorageCell>> {
        self.cells
            .iter()
            .map(|(id, data)| {
                let cell: Arc<dyn StorageCell> = Arc::new(InMemoryCell {
                    mechanism: self.name.clone(),
                    id: id.clone(),
                    state: Arc::clone(&self.state),
                    data: Arc::clone(data),
                });
                (id.clone(), cell)
            })
            .collect()
    }

    async fn destroy(&self) -> StorageResult<()> {
        self.state.store(CLOSED, Ordering::Release);
        debug!(mechanism = %self.name, "in-memory mechanism destroyed");
        Ok(())
    }

    async fn erase(&self) -> StorageResult<()> {
        self.ensure_open()?;
        for (id, data) in self.cells.iter() {
            let mut data = write_lock(data)?;
            data.manifests.rows.clear();
            data.segments.rows.clear();
            debug!(mechanism = %self.name, cell = %id, "cell erased");
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryMechanism")
            .field("name", &self.name)
            .field("state", &self.state.load(Ordering::Acquire))
            .finish()
    }
}

/// A cell view bound to one mechanism instance.
pub struct InMemoryCell {
    mechanism: String,
    id: CellId,
    state: Arc<AtomicU8>,
    data: Arc<RwLock<CellData>>,
}

impl InMemoryCell {
    fn read(&self) -> StorageResult<RwLockReadGuard<'_, CellData>> {
        check_open(&self.mechanism, &self.state)?;
        self.data
            .read()
            .map_err(|e| StorageError::Backend(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, CellData>> {
        check_open(&self.mechanism, &self.state)?;
        write_lock(&self.data)
    }

    fn writable(&self) -> StorageResult<RwLockWriteGuard<'_, CellData>> {
        let data = self.write()?;
        if data.read_only {
            return Err(StorageError::ReadOnly {
                cell: self.id.to_string(),
            });
        }
        Ok(data)
    }
}

#[async_trait]
impl StorageCell for InMemoryCell {
    fn is_read_only(&self) -> bool {
        self.data.read().map(|d| d.read_only).unwrap_or(true)
    }

    async fn add_manifests(&self, manifests: &[ManifestDb]) -> StorageResult<Vec<u64>> {
        let mut data = self.writable()?;
        let keys: Vec<u64> = manifests
            .iter()
            .map(|m| data.manifests.insert(m.clone()))
            .collect();
        debug!(cell = %self.id, ?keys, "manifests added");
        Ok(keys)
    }

    async fn get_manifests(&self, keys: &[u64]) -> StorageResult<Vec<Option<ManifestDb>>> {
        Ok(self.read()?.manifests.get_all(keys))
    }

    async fn get_all_manifests(&self) -> StorageResult<Vec<(u64, ManifestDb)>> {
        let data = self.read()?;
        Ok(data
            .manifests
            .rows
            .iter()
            .map(|(key, m)| (*key, m.clone()))
            .collect())
    }

    async fn remove_manifests(
        &self,
        keys: &[u64],
        on_removed: RemovedCallback<'_>,
    ) -> StorageResult<()> {
        self.write()?.manifests.remove_all(keys, on_removed);
        Ok(())
    }

    async fn update_manifest_expiration(
        &self,
        key: u64,
        expiration: Expiration,
    ) -> StorageResult<()> {
        let mut data = self.write()?;
        match data.manifests.rows.get_mut(&key) {
            Some(manifest) => {
                manifest.expiration = expiration;
                debug!(cell = %self.id, key, %expiration, "manifest expiration updated");
            }
            None => debug!(cell = %self.id, key, "expiration update for missing manifest ignored"),
        }
        Ok(())
    }

    async fn add_segments(&self, segments: &[SegmentDataDb]) -> StorageResult<Vec<u64>> {
        let mut data = self.writable()?;
        Ok(segments
            .iter()
            .map(|s| data.segments.insert(s.clone()))
            .collect())
    }

    async fn get_segments(&self, keys: &[u64]) -> StorageResult<Vec<Option<SegmentDataDb>>> {
        Ok(self.read()?.segments.get_all(keys))
    }

    async fn remove_segments(
        &self,
        keys: &[u64],
        on_removed: RemovedCallback<'_>,
    ) -> StorageResult<()> {
        self.write()?.segments.remove_all(keys, on_removed);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCell")
            .field("mechanism", &self.mechanism)
            .field("id", &self.id)
            .finish()
    }
}

fn check_open(mechanism: &str, state: &AtomicU8) -> StorageResult<()> {
    match state.load(Ordering::Acquire) {
        OPEN => Ok(()),
        CREATED => Err(StorageError::NotInitialized {
            mechanism: mechanism.to_string(),
        }),
        _ => Err(StorageError::Closed {
            mechanism: mechanism.to_string(),
        }),
    }
}

fn write_lock(data: &RwLock<CellData>) -> StorageResult<RwLockWriteGuard<'_, CellData>> {
    data.write()
        .map_err(|e| StorageError::Backend(format!("lock poisoned: {e}")))
}
