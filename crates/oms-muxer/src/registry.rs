//! Registry of storage mechanism factories.
//!
//! Registration order matters: it is the order in which a muxer initializes
//! mechanisms and searches them for the active cell.

use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use oms_storage::MechanismFactory;
use oms_types::MechanismId;
use tracing::info;

#[derive(Clone)]
pub(crate) struct Registration {
    pub(crate) id: MechanismId,
    pub(crate) factory: Arc<dyn MechanismFactory>,
}

/// An ordered table of mechanism factories keyed by [`MechanismId`].
///
/// Cloning shares the same table. [`MechanismRegistry::global`] is the
/// process-wide instance used by default; isolated registries are useful in
/// tests and when embedding several independent stores in one process.
#[derive(Clone, Default)]
pub struct MechanismRegistry {
    entries: Arc<RwLock<Vec<Registration>>>,
}

impl MechanismRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static MechanismRegistry {
        static GLOBAL: OnceLock<MechanismRegistry> = OnceLock::new();
        GLOBAL.get_or_init(MechanismRegistry::new)
    }

    /// Register a factory. Re-registering an id replaces its factory but
    /// keeps its position.
    pub fn register(&self, id: MechanismId, factory: Arc<dyn MechanismFactory>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.iter_mut().find(|r| r.id == id) {
            Some(existing) => existing.factory = factory,
            None => entries.push(Registration {
                id: id.clone(),
                factory,
            }),
        }
        info!(mechanism = %id, "storage mechanism registered");
    }

    /// Remove a factory. Returns `true` if it was registered.
    pub fn unregister(&self, id: &MechanismId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|r| &r.id != id);
        before != entries.len()
    }

    /// Registered ids, in registration order.
    pub fn ids(&self) -> Vec<MechanismId> {
        self.snapshot().into_iter().map(|r| r.id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True iff at least one registered factory reports itself supported.
    pub fn support(&self) -> bool {
        self.snapshot().iter().any(|r| r.factory.is_supported())
    }

    pub(crate) fn snapshot(&self) -> Vec<Registration> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl std::fmt::Debug for MechanismRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MechanismRegistry")
            .field("mechanisms", &self.ids())
            .finish()
    }
}
