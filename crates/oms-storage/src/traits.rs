use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use oms_types::{CellId, Expiration, ManifestDb, SegmentDataDb};

use crate::error::StorageResult;

/// Called once for every key a remove operation actually deleted.
pub type RemovedCallback<'a> = &'a mut (dyn FnMut(u64) + Send);

/// One logical storage partition inside a mechanism.
///
/// All implementations must satisfy these invariants:
/// - Keys are cell-local and never reused for a different record while the
///   original still exists.
/// - A removed record is gone: later lookups by its key return `None`, never a
///   stale copy.
/// - `update_manifest_expiration` on an absent key is a no-op and never
///   recreates the record.
/// - Batch reads return exactly one entry per requested key, in order.
#[async_trait]
pub trait StorageCell: Send + Sync {
    /// Whether this cell refuses new content (e.g. a legacy on-disk format).
    fn is_read_only(&self) -> bool {
        false
    }

    /// Store manifests and return their new keys, in input order.
    async fn add_manifests(&self, manifests: &[ManifestDb]) -> StorageResult<Vec<u64>>;

    /// Read manifests by key. Missing keys yield `None`.
    async fn get_manifests(&self, keys: &[u64]) -> StorageResult<Vec<Option<ManifestDb>>>;

    /// Read every manifest in the cell, ordered by key.
    async fn get_all_manifests(&self) -> StorageResult<Vec<(u64, ManifestDb)>>;

    /// Delete manifests by key, reporting each key that existed.
    async fn remove_manifests(
        &self,
        keys: &[u64],
        on_removed: RemovedCallback<'_>,
    ) -> StorageResult<()>;

    /// Overwrite the expiration of one manifest. Absent keys are ignored.
    async fn update_manifest_expiration(
        &self,
        key: u64,
        expiration: Expiration,
    ) -> StorageResult<()>;

    /// Store segment data and return the new keys, in input order.
    async fn add_segments(&self, segments: &[SegmentDataDb]) -> StorageResult<Vec<u64>>;

    /// Read segment data by key. Missing keys yield `None`.
    async fn get_segments(&self, keys: &[u64]) -> StorageResult<Vec<Option<SegmentDataDb>>>;

    /// Delete segment data by key, reporting each key that existed.
    async fn remove_segments(
        &self,
        keys: &[u64],
        on_removed: RemovedCallback<'_>,
    ) -> StorageResult<()>;
}

/// A storage backend owning one or more named cells.
///
/// Lifecycle: `init` before use, `destroy` when done. After `destroy`, every
/// cell obtained from this instance fails with
/// [`StorageError::Closed`](crate::StorageError::Closed).
#[async_trait]
pub trait StorageMechanism: Send + Sync {
    async fn init(&self) -> StorageResult<()>;

    /// The cells of this mechanism, keyed and ordered by id.
    fn cells(&self) -> BTreeMap<CellId, Arc<dyn StorageCell>>;

    /// Release resources. Calling it more than once is harmless.
    async fn destroy(&self) -> StorageResult<()>;

    /// Delete all content in every cell.
    async fn erase(&self) -> StorageResult<()>;
}

/// Creates mechanism instances for the registry.
pub trait MechanismFactory: Send + Sync {
    /// Platform capability check. Must not have side effects.
    fn is_supported(&self) -> bool;

    /// A fresh, un-initialized mechanism instance.
    fn create(&self) -> Arc<dyn StorageMechanism>;
}
