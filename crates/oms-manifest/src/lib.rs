//! Offline manifest parsing for the Offline Manifest Store.
//!
//! [`OfflineManifestParser`] turns an `offline:manifest/...` URI into a live
//! [`Manifest`] by reading the stored record through a
//! [`StorageMuxer`](oms_muxer::StorageMuxer). While playback runs, DRM
//! sessions report license renewals; the parser writes the new expiration
//! back to the stored record when the session belongs to it.
//!
//! # Modules
//!
//! - [`parser`] -- [`OfflineManifestParser`] and its state machine
//! - [`expiration`] -- [`ExpirationUpdate`], [`ExpirationOutcome`], the channel listener
//! - [`converter`] -- [`ManifestConverter`], stored record to live manifest
//! - [`model`] -- the live [`Manifest`] shape
//! - [`player`] -- [`PlayerContext`], the player's period filter hook
//! - [`error`] -- [`ParserError`] and [`ErrorKind`]
//!
//! # Design Rules
//!
//! 1. A malformed URI fails before any storage is opened.
//! 2. Storage is never held open between calls.
//! 3. An expiration update never recreates a removed record.
//! 4. Once `stop()` returns nothing is written.

pub mod converter;
pub mod error;
pub mod expiration;
pub mod model;
pub mod parser;
pub mod player;

pub use converter::ManifestConverter;
pub use error::{ErrorKind, ParserError, ParserResult};
pub use expiration::{spawn_expiration_listener, ExpirationOutcome, ExpirationUpdate};
pub use model::{Manifest, Period, PresentationTimeline, SegmentReference, Stream, Variant};
pub use parser::{OfflineManifestParser, ParserStatus};
pub use player::{NoopPlayerContext, PlayerContext};
