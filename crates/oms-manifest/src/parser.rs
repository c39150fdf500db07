use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use oms_muxer::{MechanismRegistry, MuxerConfig, MuxerError, StorageMuxer};
use oms_types::{Expiration, ManifestDb, OfflineUri};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::converter::ManifestConverter;
use crate::error::{ParserError, ParserResult};
use crate::expiration::{ExpirationOutcome, ExpirationUpdate};
use crate::model::Manifest;
use crate::player::PlayerContext;

/// Observable parser state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParserStatus {
    Idle,
    Parsing,
    Resolved,
    Stopped,
}

impl ParserStatus {
    fn name(self) -> &'static str {
        match self {
            ParserStatus::Idle => "idle",
            ParserStatus::Parsing => "parsing",
            ParserStatus::Resolved => "resolved",
            ParserStatus::Stopped => "stopped",
        }
    }
}

#[derive(Clone, Debug)]
struct Resolved {
    uri: OfflineUri,
    session_ids: BTreeSet<String>,
}

enum ParserState {
    Idle,
    Parsing,
    Resolved(Resolved),
    Stopped,
}

impl ParserState {
    fn status(&self) -> ParserStatus {
        match self {
            ParserState::Idle => ParserStatus::Idle,
            ParserState::Parsing => ParserStatus::Parsing,
            ParserState::Resolved(_) => ParserStatus::Resolved,
            ParserState::Stopped => ParserStatus::Stopped,
        }
    }
}

/// Resolves offline URIs into live manifests and keeps their stored
/// expiration in sync with DRM license renewals.
///
/// State machine: `Idle -> Parsing -> Resolved -> Stopped`. A failed
/// `start()` returns to `Idle`; `stop()` moves any state to `Stopped`.
///
/// The parser never holds storage open between calls. `start()` opens a
/// muxer, reads the record and releases the muxer before returning; every
/// expiration update opens and releases its own muxer. An update can
/// therefore race with an erase of the store, in which case it finds the
/// record missing and does nothing.
///
/// Expiration writes hold `writes` shared; `stop()` takes it exclusively, so
/// once `stop()` returns no write is in flight and none will start.
pub struct OfflineManifestParser {
    registry: MechanismRegistry,
    config: MuxerConfig,
    state: Mutex<ParserState>,
    writes: RwLock<()>,
}

impl OfflineManifestParser {
    /// A parser over the process-wide mechanism registry.
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
            state: Mutex::new(ParserState::Idle),
            writes: RwLock::new(()),
        }
    }

    pub fn status(&self) -> ParserStatus {
        self.lock().status()
    }

    /// The uri of the resolved manifest, once `start()` has succeeded.
    pub fn resolved_uri(&self) -> Option<OfflineUri> {
        match &*self.lock() {
            ParserState::Resolved(r) => Some(r.uri.clone()),
            _ => None,
        }
    }

    /// Load the manifest stored at `uri`.
    ///
    /// A malformed uri (or one that does not name a manifest) fails with
    /// `MalformedOfflineUri` before any storage is touched. With no usable
    /// storage mechanism at all it fails with `StorageUnavailable`; a
    /// well-formed uri with nothing stored behind it fails with `KeyNotFound`.
    pub async fn start(&self, uri: &str, player: &dyn PlayerContext) -> ParserResult<Manifest> {
        let parsed = OfflineUri::parse(uri).map_err(|e| ParserError::MalformedOfflineUri {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;
        if !parsed.is_manifest() {
            return Err(ParserError::MalformedOfflineUri {
                uri: uri.to_string(),
                reason: format!("expected a manifest uri, found {}", parsed.kind()),
            });
        }

        self.begin_parsing()?;
        debug!(%parsed, "resolving offline manifest");

        let record = match self.load(&parsed).await {
            Ok(record) => record,
            Err(e) => {
                self.abort_parsing();
                return Err(e);
            }
        };

        let mut manifest =
            ManifestConverter::new(parsed.mechanism().clone(), parsed.cell().clone())
                .convert(&record);
        player.filter_all_periods(&mut manifest.periods);

        self.finish_parsing(Resolved {
            uri: parsed,
            session_ids: record.session_ids,
        })?;
        Ok(manifest)
    }

    /// Apply a license-expiration update from a DRM session.
    ///
    /// Writes only when the parser has resolved a manifest, the session
    /// belongs to that manifest, and the record still exists. Every other
    /// case is reported through [`ExpirationOutcome`] without touching
    /// storage. Backend failures are returned as errors.
    pub async fn on_expiration_updated(
        &self,
        update: ExpirationUpdate,
    ) -> ParserResult<ExpirationOutcome> {
        let resolved = match &*self.lock() {
            ParserState::Resolved(r) => r.clone(),
            ParserState::Stopped => return Ok(ExpirationOutcome::Stopped),
            ParserState::Idle | ParserState::Parsing => return Ok(ExpirationOutcome::NotResolved),
        };
        if !resolved.session_ids.contains(&update.session_id) {
            debug!(session = %update.session_id, "expiration update for unrelated session ignored");
            return Ok(ExpirationOutcome::UnknownSession);
        }

        let muxer = self.open_muxer();
        let result = self
            .write_expiration(&muxer, &resolved.uri, update.expiration)
            .await;
        release(&muxer).await;

        if let Ok(outcome) = &result {
            debug!(uri = %resolved.uri, expiration = %update.expiration, %outcome, "expiration update");
        }
        result
    }

    /// Stop the parser. Later expiration updates are no-ops. Safe to call
    /// repeatedly and in any state.
    ///
    /// Waits for an expiration write already in progress to finish.
    pub async fn stop(&self) {
        let _writes = self.writes.write().await;
        let mut state = self.lock();
        if !matches!(*state, ParserState::Stopped) {
            debug!(from = state.status().name(), "offline manifest parser stopped");
        }
        *state = ParserState::Stopped;
    }

    async fn load(&self, uri: &OfflineUri) -> ParserResult<ManifestDb> {
        let muxer = self.open_muxer();
        let result = read_record(&muxer, uri).await;
        release(&muxer).await;
        result
    }

    async fn write_expiration(
        &self,
        muxer: &StorageMuxer,
        uri: &OfflineUri,
        expiration: Expiration,
    ) -> ParserResult<ExpirationOutcome> {
        open_storage(muxer, uri).await?;

        let cell = match muxer.resolve(uri) {
            Ok(cell) => cell,
            Err(MuxerError::MechanismNotFound(_) | MuxerError::CellNotFound { .. }) => {
                return Ok(ExpirationOutcome::RecordMissing)
            }
            Err(e) => return Err(ParserError::from_muxer(e, uri)),
        };

        if self.is_stopped() {
            return Ok(ExpirationOutcome::Stopped);
        }
        let existing = cell.get_manifests(&[uri.key()]).await?;
        if !matches!(existing.first(), Some(Some(_))) {
            return Ok(ExpirationOutcome::RecordMissing);
        }

        let _writing = self.writes.read().await;
        if self.is_stopped() {
            return Ok(ExpirationOutcome::Stopped);
        }
        cell.update_manifest_expiration(uri.key(), expiration)
            .await?;
        Ok(ExpirationOutcome::Updated)
    }

    fn open_muxer(&self) -> StorageMuxer {
        StorageMuxer::with_config(self.registry.clone(), self.config.clone())
    }

    fn begin_parsing(&self) -> ParserResult<()> {
        let mut state = self.lock();
        match *state {
            ParserState::Idle => {
                *state = ParserState::Parsing;
                Ok(())
            }
            ref other => Err(ParserError::InvalidState {
                state: other.status().name(),
                operation: "start",
            }),
        }
    }

    fn abort_parsing(&self) {
        let mut state = self.lock();
        if matches!(*state, ParserState::Parsing) {
            *state = ParserState::Idle;
        }
    }

    fn finish_parsing(&self, resolved: Resolved) -> ParserResult<()> {
        let mut state = self.lock();
        match *state {
            ParserState::Parsing => {
                *state = ParserState::Resolved(resolved);
                Ok(())
            }
            ref other => Err(ParserError::InvalidState {
                state: other.status().name(),
                operation: "finish start",
            }),
        }
    }

    fn is_stopped(&self) -> bool {
        matches!(*self.lock(), ParserState::Stopped)
    }

    fn lock(&self) -> MutexGuard<'_, ParserState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for OfflineManifestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OfflineManifestParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineManifestParser")
            .field("status", &self.status())
            .field("resolved_uri", &self.resolved_uri())
            .finish()
    }
}

/// Initialize `muxer` and require at least one live mechanism.
async fn open_storage(muxer: &StorageMuxer, uri: &OfflineUri) -> ParserResult<()> {
    muxer
        .init()
        .await
        .map_err(|e| ParserError::from_muxer(e, uri))?;
    let live = muxer
        .mechanism_ids()
        .map_err(|e| ParserError::from_muxer(e, uri))?;
    if live.is_empty() {
        return Err(ParserError::StorageUnavailable(
            "no storage mechanisms are available".into(),
        ));
    }
    Ok(())
}

async fn read_record(muxer: &StorageMuxer, uri: &OfflineUri) -> ParserResult<ManifestDb> {
    open_storage(muxer, uri).await?;
    let cell = muxer
        .resolve(uri)
        .map_err(|e| ParserError::from_muxer(e, uri))?;
    let mut found = cell.get_manifests(&[uri.key()]).await?;
    found
        .pop()
        .flatten()
        .ok_or_else(|| ParserError::KeyNotFound {
            uri: uri.to_string(),
            reason: "no record with this key".into(),
        })
}

async fn release(muxer: &StorageMuxer) {
    if let Err(e) = muxer.destroy().await {
        warn!(error = %e, "failed to release storage muxer");
    }
}
