//! License-expiration updates reported by DRM sessions.

use std::fmt;
use std::sync::Arc;

use oms_types::Expiration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::parser::OfflineManifestParser;

/// A DRM session reporting a new license expiration.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpirationUpdate {
    pub session_id: String,
    pub expiration: Expiration,
}

impl ExpirationUpdate {
    pub fn new(session_id: impl Into<String>, expiration: impl Into<Expiration>) -> Self {
        Self {
            session_id: session_id.into(),
            expiration: expiration.into(),
        }
    }
}

/// What an expiration update did. Only [`ExpirationOutcome::Updated`] wrote
/// to storage; every other outcome is a defined no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExpirationOutcome {
    /// The parser has not resolved a manifest yet.
    NotResolved,
    /// The parser was stopped before or during the update.
    Stopped,
    /// The session does not belong to the resolved manifest.
    UnknownSession,
    /// The stored manifest (or its cell) no longer exists.
    RecordMissing,
    /// The stored expiration was overwritten.
    Updated,
}

impl fmt::Display for ExpirationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExpirationOutcome::NotResolved => "not-resolved",
            ExpirationOutcome::Stopped => "stopped",
            ExpirationOutcome::UnknownSession => "unknown-session",
            ExpirationOutcome::RecordMissing => "record-missing",
            ExpirationOutcome::Updated => "updated",
        };
        f.write_str(s)
    }
}

/// Feed updates from a DRM event channel into `parser`.
///
/// The task ends when the channel closes or the parser reports it has been
/// stopped. Storage errors are logged and do not end the task.
pub fn spawn_expiration_listener(
    parser: Arc<OfflineManifestParser>,
    mut updates: mpsc::Receiver<ExpirationUpdate>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            let session_id = update.session_id.clone();
            match parser.on_expiration_updated(update).await {
                Ok(ExpirationOutcome::Stopped) => break,
                Ok(outcome) => debug!(session = %session_id, %outcome, "expiration update handled"),
                Err(e) => warn!(session = %session_id, error = %e, "expiration update failed"),
            }
        }
        debug!("expiration listener finished");
    })
}
