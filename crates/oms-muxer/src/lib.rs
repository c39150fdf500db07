//! Storage multiplexing for the Offline Manifest Store.
//!
//! Several storage mechanisms may be available on one platform (a current
//! backend, a legacy one that still holds older content, ...). The
//! [`StorageMuxer`] hides that behind one view: it initializes every
//! registered, supported mechanism, picks a deterministic *active* cell for
//! new content, and resolves `(mechanism, cell)` addresses taken from
//! [`OfflineUri`](oms_types::OfflineUri)s back to live cells.
//!
//! # Modules
//!
//! - [`registry`] -- [`MechanismRegistry`], the ordered factory table
//! - [`muxer`] -- [`StorageMuxer`], [`StorageHandle`], [`StoragePath`]
//! - [`config`] -- [`MuxerConfig`], loaded from TOML
//! - [`error`] -- [`MuxerError`]

pub mod config;
pub mod error;
pub mod muxer;
pub mod registry;

pub use config::MuxerConfig;
pub use error::{MuxerError, MuxerResult};
pub use muxer::{StorageHandle, StorageMuxer, StoragePath};
pub use registry::MechanismRegistry;
