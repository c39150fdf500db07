//! The live manifest handed to the player.

use std::collections::{BTreeMap, BTreeSet};

use oms_types::{ContentType, DrmInfo, Expiration, OfflineUri};
use serde::Serialize;

/// A playable manifest reconstructed from stored content.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Manifest {
    pub presentation_timeline: PresentationTimeline,
    pub periods: Vec<Period>,
    /// Persistent DRM sessions that must be loaded to play this content.
    pub offline_session_ids: Vec<String>,
    /// Seconds of content to buffer before starting playback.
    pub min_buffer_time: f64,
    pub expiration: Expiration,
    pub original_uri: String,
    pub app_metadata: BTreeMap<String, serde_json::Value>,
}

/// Offline content is always static (video on demand).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PresentationTimeline {
    pub duration: f64,
    pub is_live: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Period {
    pub start_time: f64,
    pub variants: Vec<Variant>,
    pub text_streams: Vec<Stream>,
}

/// A playable audio/video combination.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Variant {
    pub id: u32,
    pub language: String,
    pub primary: bool,
    pub audio: Option<Stream>,
    pub video: Option<Stream>,
    pub bandwidth: u64,
    pub drm_infos: Vec<DrmInfo>,
    pub allowed_by_application: bool,
    pub allowed_by_key_system: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Stream {
    pub id: u32,
    pub content_type: ContentType,
    pub mime_type: String,
    pub codecs: String,
    pub frame_rate: Option<f64>,
    pub language: String,
    pub label: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub kind: Option<String>,
    pub channels_count: Option<u32>,
    pub encrypted: bool,
    pub key_ids: BTreeSet<String>,
    pub init_segment: Option<OfflineUri>,
    pub segments: Vec<SegmentReference>,
}

impl Stream {
    /// Position of the segment covering `time`, if any.
    pub fn find_segment(&self, time: f64) -> Option<usize> {
        self.segments
            .iter()
            .find(|s| s.start_time <= time && time < s.end_time)
            .map(|s| s.position)
    }

    pub fn segment(&self, position: usize) -> Option<&SegmentReference> {
        self.segments.iter().find(|s| s.position == position)
    }
}

/// Where one segment's bytes are stored.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SegmentReference {
    pub position: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub uri: OfflineUri,
}
