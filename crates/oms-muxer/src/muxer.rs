use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use oms_storage::{StorageCell, StorageError, StorageMechanism};
use oms_types::{CellId, MechanismId, OfflineUri};
use tracing::{debug, info, warn};

use crate::config::MuxerConfig;
use crate::error::{MuxerError, MuxerResult};
use crate::registry::{MechanismRegistry, Registration};

/// Where a cell lives: `(mechanism, cell)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoragePath {
    pub mechanism: MechanismId,
    pub cell: CellId,
}

impl StoragePath {
    pub fn new(mechanism: MechanismId, cell: CellId) -> Self {
        Self { mechanism, cell }
    }

    /// The offline URI of manifest `key` in this cell.
    pub fn manifest_uri(&self, key: u64) -> OfflineUri {
        OfflineUri::manifest(self.mechanism.clone(), self.cell.clone(), key)
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.mechanism, self.cell)
    }
}

/// A live mechanism + cell pair. Valid until the muxer that produced it is
/// destroyed; afterwards cell operations fail with `StorageError::Closed`.
#[derive(Clone)]
pub struct StorageHandle {
    pub path: StoragePath,
    pub mechanism: Arc<dyn StorageMechanism>,
    pub cell: Arc<dyn StorageCell>,
}

impl fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageHandle")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct LiveMechanism {
    id: MechanismId,
    mechanism: Arc<dyn StorageMechanism>,
}

enum MuxerState {
    Uninitialized,
    Initializing,
    Ready(Vec<LiveMechanism>),
    Destroyed,
}

/// Presents every registered storage mechanism behind one interface.
///
/// Lifecycle:
/// - `init()` instantiates every registered, supported, enabled mechanism.
/// - `get_active()`, `get_cell()`, `resolve()`, `for_each_cell()` require a
///   completed `init()`; before it they fail with `NotInitialized`, after
///   `destroy()` with `Destroyed`.
/// - `destroy()` is idempotent and safe in any state.
/// - `erase()` works in any state; it uses its own short-lived instances.
///
/// Active selection is deterministic: the configured preferred mechanism
/// first (if live), then the rest in registration order; within a mechanism,
/// the first writable cell by id.
pub struct StorageMuxer {
    registry: MechanismRegistry,
    config: MuxerConfig,
    state: Mutex<MuxerState>,
}

impl StorageMuxer {
    /// A muxer over the process-wide registry with default configuration.
    pub fn new() -> Self {
        Self::with_registry(MechanismRegistry::global().clone())
    }

    pub fn with_registry(registry: MechanismRegistry) -> Self {
        Self::with_config(registry, MuxerConfig::default())
    }

    pub fn with_config(registry: MechanismRegistry, config: MuxerConfig) -> Self {
        Self {
            registry,
            config,
            state: Mutex::new(MuxerState::Uninitialized),
        }
    }

    /// True iff any mechanism in the process-wide registry is supported.
    pub fn support() -> bool {
        Self::support_in(MechanismRegistry::global())
    }

    pub fn support_in(registry: &MechanismRegistry) -> bool {
        registry.support()
    }

    pub fn registry(&self) -> &MechanismRegistry {
        &self.registry
    }

    pub fn config(&self) -> &MuxerConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        matches!(*self.lock(), MuxerState::Ready(_))
    }

    /// Instantiate and initialize every usable mechanism.
    ///
    /// If any mechanism fails to initialize, the ones already initialized are
    /// destroyed and the muxer is left uninitialized.
    pub async fn init(&self) -> MuxerResult<()> {
        {
            let mut state = self.lock();
            match *state {
                MuxerState::Uninitialized => *state = MuxerState::Initializing,
                MuxerState::Initializing | MuxerState::Ready(_) => {
                    return Err(MuxerError::AlreadyInitialized)
                }
                MuxerState::Destroyed => return Err(MuxerError::Destroyed),
            }
        }

        let mut live = Vec::new();
        for Registration { id, factory } in self.registry.snapshot() {
            if self.config.is_disabled(&id) {
                debug!(mechanism = %id, "storage mechanism disabled by config");
                continue;
            }
            if !factory.is_supported() {
                debug!(mechanism = %id, "storage mechanism not supported on this platform");
                continue;
            }
            let mechanism = factory.create();
            let entry = LiveMechanism { id, mechanism };
            if let Err(e) = entry.mechanism.init().await {
                warn!(mechanism = %entry.id, error = %e, "storage mechanism failed to initialize");
                live.push(entry);
                destroy_all(&live).await;
                self.reset_if_initializing();
                return Err(e.into());
            }
            live.push(entry);
        }

        let accepted = {
            let mut state = self.lock();
            if matches!(*state, MuxerState::Initializing) {
                *state = MuxerState::Ready(live.clone());
                true
            } else {
                false
            }
        };
        if !accepted {
            // destroy() ran while we were initializing.
            destroy_all(&live).await;
            return Err(MuxerError::Destroyed);
        }
        debug!(count = live.len(), "storage muxer initialized");
        Ok(())
    }

    /// The active mechanism and cell for new content.
    pub fn get_active(&self) -> MuxerResult<StorageHandle> {
        let live = self.live()?;
        if live.is_empty() {
            return Err(MuxerError::StorageUnavailable(
                "no storage mechanisms are available".into(),
            ));
        }

        let preferred = self.config.preferred_mechanism.as_ref();
        let ordered = preferred
            .and_then(|p| live.iter().find(|m| &m.id == p))
            .into_iter()
            .chain(live.iter().filter(|m| Some(&m.id) != preferred));

        for m in ordered {
            if let Some((cell_id, cell)) = m
                .mechanism
                .cells()
                .into_iter()
                .find(|(_, cell)| !cell.is_read_only())
            {
                let path = StoragePath::new(m.id.clone(), cell_id);
                debug!(%path, "active storage cell selected");
                return Ok(StorageHandle {
                    path,
                    mechanism: Arc::clone(&m.mechanism),
                    cell,
                });
            }
        }

        Err(MuxerError::StorageUnavailable(
            "no writable storage cell is available".into(),
        ))
    }

    /// A specific cell of a specific live mechanism.
    pub fn get_cell(
        &self,
        mechanism: &MechanismId,
        cell: &CellId,
    ) -> MuxerResult<Arc<dyn StorageCell>> {
        let live = self.live()?;
        let m = live
            .iter()
            .find(|m| &m.id == mechanism)
            .ok_or_else(|| MuxerError::MechanismNotFound(mechanism.clone()))?;
        m.mechanism
            .cells()
            .remove(cell)
            .ok_or_else(|| MuxerError::CellNotFound {
                mechanism: mechanism.clone(),
                cell: cell.clone(),
            })
    }

    /// The cell an offline URI points into.
    pub fn resolve(&self, uri: &OfflineUri) -> MuxerResult<Arc<dyn StorageCell>> {
        self.get_cell(uri.mechanism(), uri.cell())
    }

    /// Ids of the live mechanisms, in registration order. Empty when no
    /// registered mechanism is supported and enabled.
    pub fn mechanism_ids(&self) -> MuxerResult<Vec<MechanismId>> {
        Ok(self.live()?.into_iter().map(|m| m.id).collect())
    }

    /// Visit every cell of every live mechanism, in selection order.
    pub fn for_each_cell<F>(&self, mut f: F) -> MuxerResult<()>
    where
        F: FnMut(&StoragePath, &Arc<dyn StorageCell>),
    {
        for m in self.live()? {
            for (cell_id, cell) in m.mechanism.cells() {
                f(&StoragePath::new(m.id.clone(), cell_id), &cell);
            }
        }
        Ok(())
    }

    /// All cells of all live mechanisms, keyed by path.
    pub fn cells(&self) -> MuxerResult<BTreeMap<StoragePath, Arc<dyn StorageCell>>> {
        let mut cells = BTreeMap::new();
        self.for_each_cell(|path, cell| {
            cells.insert(path.clone(), Arc::clone(cell));
        })?;
        Ok(cells)
    }

    /// Delete all content in every registered, supported mechanism.
    ///
    /// Runs independently of this muxer's own lifecycle. Every mechanism is
    /// attempted even if an earlier one fails; the first error is returned.
    pub async fn erase(&self) -> MuxerResult<()> {
        let mut first_error: Option<StorageError> = None;
        for Registration { id, factory } in self.registry.snapshot() {
            if !factory.is_supported() {
                continue;
            }
            let mechanism = factory.create();
            let result = match mechanism.init().await {
                Ok(()) => mechanism.erase().await,
                Err(e) => Err(e),
            };
            if let Err(e) = mechanism.destroy().await {
                warn!(mechanism = %id, error = %e, "failed to destroy mechanism after erase");
            }
            match result {
                Ok(()) => info!(mechanism = %id, "storage mechanism erased"),
                Err(e) => {
                    warn!(mechanism = %id, error = %e, "failed to erase storage mechanism");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), |e| Err(e.into()))
    }

    /// Release every live mechanism. Safe to call in any state, any number
    /// of times.
    pub async fn destroy(&self) -> MuxerResult<()> {
        let previous = std::mem::replace(&mut *self.lock(), MuxerState::Destroyed);
        let MuxerState::Ready(live) = previous else {
            return Ok(());
        };

        let mut first_error = None;
        for m in &live {
            if let Err(e) = m.mechanism.destroy().await {
                warn!(mechanism = %m.id, error = %e, "failed to destroy storage mechanism");
                first_error.get_or_insert(e);
            }
        }
        debug!(count = live.len(), "storage muxer destroyed");
        first_error.map_or(Ok(()), |e| Err(e.into()))
    }

    fn live(&self) -> MuxerResult<Vec<LiveMechanism>> {
        match &*self.lock() {
            MuxerState::Ready(live) => Ok(live.clone()),
            MuxerState::Uninitialized | MuxerState::Initializing => {
                Err(MuxerError::NotInitialized)
            }
            MuxerState::Destroyed => Err(MuxerError::Destroyed),
        }
    }

    fn reset_if_initializing(&self) {
        let mut state = self.lock();
        if matches!(*state, MuxerState::Initializing) {
            *state = MuxerState::Uninitialized;
        }
    }

    fn lock(&self) -> MutexGuard<'_, MuxerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StorageMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StorageMuxer {
    fn drop(&mut self) {
        if let MuxerState::Ready(live) = &*self.lock() {
            warn!(count = live.len(), "storage muxer dropped without destroy()");
        }
    }
}

impl fmt::Debug for StorageMuxer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.lock() {
            MuxerState::Uninitialized => "uninitialized".to_string(),
            MuxerState::Initializing => "initializing".to_string(),
            MuxerState::Ready(live) => format!("ready({})", live.len()),
            MuxerState::Destroyed => "destroyed".to_string(),
        };
        f.debug_struct("StorageMuxer")
            .field("registry", &self.registry)
            .field("state", &state)
            .finish()
    }
}

async fn destroy_all(live: &[LiveMechanism]) {
    for m in live {
        if let Err(e) = m.mechanism.destroy().await {
            warn!(mechanism = %m.id, error = %e, "failed to destroy storage mechanism");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use oms_storage::{InMemoryFactory, MechanismFactory, StorageResult};
    use oms_types::ManifestDb;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mech(s: &str) -> MechanismId {
        MechanismId::new(s).unwrap()
    }

    fn cell(s: &str) -> CellId {
        CellId::new(s).unwrap()
    }

    fn record() -> ManifestDb {
        ManifestDb::new("https://cdn.example/movie.mpd", 600.0, 104_857_600)
    }

    fn registry_with(entries: Vec<(&str, InMemoryFactory)>) -> MechanismRegistry {
        let registry = MechanismRegistry::new();
        for (id, factory) in entries {
            registry.register(mech(id), Arc::new(factory));
        }
        registry
    }

    /// Mechanism whose init always fails; counts destroys.
    struct BrokenFactory {
        destroyed: Arc<AtomicUsize>,
    }

    struct BrokenMechanism {
        destroyed: Arc<AtomicUsize>,
    }

    impl MechanismFactory for BrokenFactory {
        fn is_supported(&self) -> bool {
            true
        }

        fn create(&self) -> Arc<dyn StorageMechanism> {
            Arc::new(BrokenMechanism {
                destroyed: Arc::clone(&self.destroyed),
            })
        }
    }

    #[async_trait]
    impl StorageMechanism for BrokenMechanism {
        async fn init(&self) -> StorageResult<()> {
            Err(StorageError::Backend("quota exceeded".into()))
        }

        fn cells(&self) -> BTreeMap<CellId, Arc<dyn StorageCell>> {
            BTreeMap::new()
        }

        async fn destroy(&self) -> StorageResult<()> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn erase(&self) -> StorageResult<()> {
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // Support
    // -----------------------------------------------------------------------

    #[test]
    fn support_reflects_registry() {
        assert!(!StorageMuxer::support_in(&MechanismRegistry::new()));
        let registry = registry_with(vec![("memory", InMemoryFactory::new())]);
        assert!(StorageMuxer::support_in(&registry));
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn operations_before_init_fail() {
        let muxer = StorageMuxer::with_registry(registry_with(vec![(
            "memory",
            InMemoryFactory::new(),
        )]));
        assert!(matches!(muxer.get_active(), Err(MuxerError::NotInitialized)));
        assert!(matches!(
            muxer.get_cell(&mech("memory"), &cell("default")),
            Err(MuxerError::NotInitialized)
        ));
        assert!(!muxer.is_initialized());
    }

    #[tokio::test]
    async fn double_init_is_rejected() {
        let muxer = StorageMuxer::with_registry(registry_with(vec![(
            "memory",
            InMemoryFactory::new(),
        )]));
        muxer.init().await.unwrap();
        assert!(matches!(
            muxer.init().await,
            Err(MuxerError::AlreadyInitialized)
        ));
        muxer.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn destroy_is_idempotent_and_final() {
        let muxer = StorageMuxer::with_registry(MechanismRegistry::new());
        muxer.destroy().await.unwrap();
        muxer.destroy().await.unwrap();
        assert!(matches!(muxer.init().await, Err(MuxerError::Destroyed)));
        assert!(matches!(muxer.get_active(), Err(MuxerError::Destroyed)));
    }

    #[tokio::test]
    async fn destroy_closes_handles() {
        let muxer = StorageMuxer::with_registry(registry_with(vec![(
            "memory",
            InMemoryFactory::new(),
        )]));
        muxer.init().await.unwrap();
        let handle = muxer.get_active().unwrap();
        muxer.destroy().await.unwrap();

        let err = handle.cell.get_manifests(&[0]).await.unwrap_err();
        assert!(matches!(err, StorageError::Closed { .. }));
    }

    #[tokio::test]
    async fn failed_init_destroys_initialized_mechanisms() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(vec![("memory", InMemoryFactory::new())]);
        registry.register(
            mech("broken"),
            Arc::new(BrokenFactory {
                destroyed: Arc::clone(&destroyed),
            }),
        );

        let muxer = StorageMuxer::with_registry(registry);
        let err = muxer.init().await.unwrap_err();
        assert!(matches!(err, MuxerError::Storage(StorageError::Backend(_))));
        assert!(matches!(muxer.get_active(), Err(MuxerError::NotInitialized)));
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        // Cleanup after a failed init is still allowed.
        muxer.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn init_with_nothing_available_then_get_active_fails() {
        let registry = registry_with(vec![(
            "memory",
            InMemoryFactory::builder().unsupported().build(),
        )]);
        let muxer = StorageMuxer::with_registry(registry);
        assert!(matches!(
            muxer.mechanism_ids(),
            Err(MuxerError::NotInitialized)
        ));
        muxer.init().await.unwrap();
        assert!(muxer.mechanism_ids().unwrap().is_empty());
        assert!(matches!(
            muxer.get_active(),
            Err(MuxerError::StorageUnavailable(_))
        ));
        muxer.destroy().await.unwrap();
    }

    // -----------------------------------------------------------------------
    // Active selection
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn active_is_first_registered_writable_cell() {
        let registry = registry_with(vec![
            (
                "legacy",
                InMemoryFactory::builder().read_only_cell(cell("v1")).build(),
            ),
            (
                "idb",
                InMemoryFactory::builder()
                    .cell(cell("v5"))
                    .cell(cell("v3"))
                    .build(),
            ),
            ("memory", InMemoryFactory::new()),
        ]);
        let muxer = StorageMuxer::with_registry(registry);
        muxer.init().await.unwrap();

        let first = muxer.get_active().unwrap();
        assert_eq!(first.path, StoragePath::new(mech("idb"), cell("v3")));
        // Stable across calls.
        assert_eq!(muxer.get_active().unwrap().path, first.path);
        muxer.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn preferred_mechanism_wins() {
        let registry = registry_with(vec![
            ("first", InMemoryFactory::new()),
            ("second", InMemoryFactory::new()),
        ]);
        let config = MuxerConfig {
            preferred_mechanism: Some(mech("second")),
            ..MuxerConfig::default()
        };
        let muxer = StorageMuxer::with_config(registry, config);
        muxer.init().await.unwrap();
        assert_eq!(muxer.get_active().unwrap().path.mechanism, mech("second"));
        muxer.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn disabled_mechanisms_are_not_initialized() {
        let registry = registry_with(vec![
            ("first", InMemoryFactory::new()),
            ("second", InMemoryFactory::new()),
        ]);
        let config = MuxerConfig {
            disabled_mechanisms: vec![mech("first")],
            ..MuxerConfig::default()
        };
        let muxer = StorageMuxer::with_config(registry, config);
        muxer.init().await.unwrap();
        assert_eq!(muxer.get_active().unwrap().path.mechanism, mech("second"));
        assert_eq!(muxer.mechanism_ids().unwrap(), vec![mech("second")]);
        assert!(matches!(
            muxer.get_cell(&mech("first"), &cell("default")),
            Err(MuxerError::MechanismNotFound(_))
        ));
        muxer.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn only_read_only_cells_is_unavailable() {
        let registry = registry_with(vec![(
            "legacy",
            InMemoryFactory::builder().read_only_cell(cell("v1")).build(),
        )]);
        let muxer = StorageMuxer::with_registry(registry);
        muxer.init().await.unwrap();
        assert_eq!(muxer.mechanism_ids().unwrap(), vec![mech("legacy")]);
        assert!(matches!(
            muxer.get_active(),
            Err(MuxerError::StorageUnavailable(_))
        ));
        // Addressed access to the legacy cell still works.
        muxer.get_cell(&mech("legacy"), &cell("v1")).unwrap();
        muxer.destroy().await.unwrap();
    }

    // -----------------------------------------------------------------------
    // Addressing
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn get_cell_and_resolve() {
        let muxer = StorageMuxer::with_registry(registry_with(vec![(
            "memory",
            InMemoryFactory::new(),
        )]));
        muxer.init().await.unwrap();

        let active = muxer.get_active().unwrap();
        let key = active.cell.add_manifests(&[record()]).await.unwrap()[0];
        let uri = active.path.manifest_uri(key);
        assert_eq!(uri.to_string(), format!("offline:manifest/memory/default/{key}"));

        let resolved = muxer.resolve(&uri).unwrap();
        assert!(resolved.get_manifests(&[key]).await.unwrap()[0].is_some());

        assert!(matches!(
            muxer.get_cell(&mech("nope"), &cell("default")),
            Err(MuxerError::MechanismNotFound(_))
        ));
        assert!(matches!(
            muxer.get_cell(&mech("memory"), &cell("nope")),
            Err(MuxerError::CellNotFound { .. })
        ));
        muxer.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn for_each_cell_visits_everything_in_order() {
        let registry = registry_with(vec![
            (
                "b",
                InMemoryFactory::builder()
                    .cell(cell("y"))
                    .cell(cell("x"))
                    .build(),
            ),
            ("a", InMemoryFactory::new()),
        ]);
        let muxer = StorageMuxer::with_registry(registry);
        muxer.init().await.unwrap();

        let mut seen = Vec::new();
        muxer
            .for_each_cell(|path, _| seen.push(path.to_string()))
            .unwrap();
        assert_eq!(seen, vec!["b/x", "b/y", "a/default"]);
        assert_eq!(muxer.cells().unwrap().len(), 3);
        muxer.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn separate_muxers_see_the_same_content() {
        let registry = registry_with(vec![("memory", InMemoryFactory::new())]);

        let writer = StorageMuxer::with_registry(registry.clone());
        writer.init().await.unwrap();
        let handle = writer.get_active().unwrap();
        let key = handle.cell.add_manifests(&[record()]).await.unwrap()[0];

        let reader = StorageMuxer::with_registry(registry);
        reader.init().await.unwrap();
        writer.destroy().await.unwrap();

        let resolved = reader.resolve(&handle.path.manifest_uri(key)).unwrap();
        assert!(resolved.get_manifests(&[key]).await.unwrap()[0].is_some());
        reader.destroy().await.unwrap();
    }

    // -----------------------------------------------------------------------
    // Erase
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn erase_without_init_removes_everything() {
        let registry = registry_with(vec![
            ("one", InMemoryFactory::new()),
            ("two", InMemoryFactory::new()),
        ]);

        let writer = StorageMuxer::with_registry(registry.clone());
        writer.init().await.unwrap();
        let mut uris = Vec::new();
        for (path, cell) in writer.cells().unwrap() {
            let key = cell.add_manifests(&[record()]).await.unwrap()[0];
            uris.push(path.manifest_uri(key));
        }
        writer.destroy().await.unwrap();

        StorageMuxer::with_registry(registry.clone())
            .erase()
            .await
            .unwrap();

        let reader = StorageMuxer::with_registry(registry);
        reader.init().await.unwrap();
        for uri in &uris {
            let resolved = reader.resolve(uri).unwrap();
            assert!(resolved.get_manifests(&[uri.key()]).await.unwrap()[0].is_none());
        }
        reader.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn erase_tolerates_empty_and_failing_mechanisms() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let registry = registry_with(vec![("memory", InMemoryFactory::new())]);
        registry.register(
            mech("broken"),
            Arc::new(BrokenFactory {
                destroyed: Arc::clone(&destroyed),
            }),
        );
        registry.register(mech("later"), Arc::new(InMemoryFactory::new()));

        let muxer = StorageMuxer::with_registry(registry.clone());
        assert!(muxer.erase().await.is_err());
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);

        registry.unregister(&mech("broken"));
        muxer.erase().await.unwrap();
    }
}
