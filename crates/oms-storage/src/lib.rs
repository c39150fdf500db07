//! Storage contracts for the Offline Manifest Store.
//!
//! A storage *mechanism* is one backend (a platform storage facility). It owns
//! one or more named *cells*, and each cell stores manifest records and
//! segment data under cell-local integer keys.
//!
//! # Traits
//!
//! - [`StorageCell`] -- manifest and segment CRUD inside one partition
//! - [`StorageMechanism`] -- a backend exposing named cells, with init/destroy/erase
//! - [`MechanismFactory`] -- platform support check plus instance creation,
//!   the unit the muxer registry holds
//!
//! # Backends
//!
//! - [`InMemoryFactory`] -- shared in-memory cells for tests and embedding
//!
//! # Design Rules
//!
//! 1. Cells never interpret records; they are keyed stores.
//! 2. Removal is final: a removed key reads back as `None`.
//! 3. Expiration updates on absent keys are no-ops, never upserts.
//! 4. A destroyed mechanism instance rejects every further cell operation.
//! 5. Backend errors are propagated; nothing here retries.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::{InMemoryCell, InMemoryFactory, InMemoryFactoryBuilder, InMemoryMechanism};
pub use traits::{MechanismFactory, RemovedCallback, StorageCell, StorageMechanism};
