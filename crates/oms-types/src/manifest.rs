//! Persisted manifest records.
//!
//! These are the shapes a storage cell stores and returns. They are plain
//! data: the cell never interprets them, and the manifest converter turns
//! them into live manifests.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// License expiration time in seconds since the Unix epoch.
///
/// [`Expiration::NEVER`] (positive infinity) means the content has no
/// expiration. JSON has no infinity, so that value serializes as `null`.
/// Other non-finite inputs are normalized on construction: `NaN` (an
/// unknown expiration) becomes `NEVER` and negative infinity becomes the
/// epoch, so every value survives a serde round trip.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Expiration(f64);

impl Expiration {
    /// No expiration.
    pub const NEVER: Expiration = Expiration(f64::INFINITY);

    pub fn at(seconds: f64) -> Self {
        if seconds.is_nan() {
            Self::NEVER
        } else if seconds == f64::NEG_INFINITY {
            Self(0.0)
        } else {
            Self(seconds)
        }
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0
    }

    pub fn is_never(self) -> bool {
        self.0 == f64::INFINITY
    }
}

impl Default for Expiration {
    fn default() -> Self {
        Self::NEVER
    }
}

impl fmt::Display for Expiration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_never() {
            f.write_str("never")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<f64> for Expiration {
    fn from(seconds: f64) -> Self {
        Self::at(seconds)
    }
}

impl Serialize for Expiration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_finite() {
            serializer.serialize_some(&self.0)
        } else {
            serializer.serialize_none()
        }
    }
}

impl<'de> Deserialize<'de> for Expiration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<f64>::deserialize(deserializer)?;
        Ok(value.map_or(Self::NEVER, Self::at))
    }
}

/// Media type carried by a stored stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Audio,
    Video,
    Text,
}

/// A stored media segment: its time range and the cell-local key of its bytes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentDb {
    pub start_time: f64,
    pub end_time: f64,
    pub data_key: u64,
}

/// Raw bytes of one stored segment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDataDb {
    pub data: Vec<u8>,
}

/// A stored stream inside a period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamDb {
    pub id: u32,
    pub content_type: ContentType,
    pub mime_type: String,
    pub codecs: String,
    #[serde(default)]
    pub frame_rate: Option<f64>,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub channels_count: Option<u32>,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub key_ids: BTreeSet<String>,
    #[serde(default)]
    pub init_segment_key: Option<u64>,
    #[serde(default)]
    pub segments: Vec<SegmentDb>,
    /// Ids of the variants this stream belongs to. Audio and video streams
    /// sharing an id are paired into one variant.
    #[serde(default)]
    pub variant_ids: Vec<u32>,
}

/// A stored period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeriodDb {
    pub start_time: f64,
    #[serde(default)]
    pub streams: Vec<StreamDb>,
}

/// DRM configuration needed to play stored content.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrmInfo {
    pub key_system: String,
    #[serde(default)]
    pub license_server_uri: String,
    #[serde(default)]
    pub distinctive_identifier_required: bool,
    #[serde(default)]
    pub persistent_state_required: bool,
    #[serde(default)]
    pub audio_robustness: String,
    #[serde(default)]
    pub video_robustness: String,
    #[serde(default)]
    pub server_certificate: Option<Vec<u8>>,
    #[serde(default)]
    pub init_data: Vec<InitData>,
}

/// One DRM initialization-data blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitData {
    pub init_data_type: String,
    pub data: Vec<u8>,
    #[serde(default)]
    pub key_id: Option<String>,
}

/// The persisted manifest record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestDb {
    pub original_manifest_uri: String,
    /// Seconds.
    pub duration: f64,
    /// Bytes.
    pub size: u64,
    #[serde(default)]
    pub expiration: Expiration,
    #[serde(default)]
    pub periods: Vec<PeriodDb>,
    /// DRM sessions whose licenses cover this content.
    #[serde(default)]
    pub session_ids: BTreeSet<String>,
    #[serde(default)]
    pub drm_info: Option<DrmInfo>,
    #[serde(default)]
    pub app_metadata: BTreeMap<String, serde_json::Value>,
}

impl ManifestDb {
    /// A record with no periods, sessions, DRM info or metadata.
    pub fn new(original_manifest_uri: impl Into<String>, duration: f64, size: u64) -> Self {
        Self {
            original_manifest_uri: original_manifest_uri.into(),
            duration,
            size,
            expiration: Expiration::NEVER,
            periods: Vec::new(),
            session_ids: BTreeSet::new(),
            drm_info: None,
            app_metadata: BTreeMap::new(),
        }
    }

    /// Whether `session_id` is one of this record's DRM sessions.
    pub fn has_session(&self, session_id: &str) -> bool {
        self.session_ids.contains(session_id)
    }
}
