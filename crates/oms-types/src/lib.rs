//! Core types for the Offline Manifest Store.
//!
//! Media manifests stored for offline playback live inside *cells*, which
//! belong to storage *mechanisms* (backends). This crate defines how those
//! places and the records inside them are named and shaped.
//!
//! # Modules
//!
//! - [`error`] -- Error types for id and URI validation
//! - [`ids`] -- Validated [`MechanismId`] and [`CellId`]
//! - [`uri`] -- [`OfflineUri`], the string address of a stored resource
//! - [`manifest`] -- Persisted records: [`ManifestDb`], [`PeriodDb`], [`StreamDb`]

pub mod error;
pub mod ids;
pub mod manifest;
pub mod uri;

pub use error::{Result, TypeError};
pub use ids::{CellId, MechanismId};
pub use manifest::{
    ContentType, DrmInfo, Expiration, InitData, ManifestDb, PeriodDb, SegmentDataDb, SegmentDb,
    StreamDb,
};
pub use uri::{OfflineUri, ResourceKind};
