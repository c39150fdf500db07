//! Conversion from stored records to live manifests.

use std::collections::BTreeSet;

use oms_types::{
    CellId, ContentType, DrmInfo, ManifestDb, MechanismId, OfflineUri, PeriodDb, StreamDb,
};

use crate::model::{Manifest, Period, PresentationTimeline, SegmentReference, Stream, Variant};

/// Seconds buffered before playback starts; all data is local.
const MIN_BUFFER_TIME: f64 = 2.0;

/// Builds live manifests for records stored in one cell.
///
/// Segment references point back into the same cell through
/// `offline:segment/...` URIs.
#[derive(Clone, Debug)]
pub struct ManifestConverter {
    mechanism: MechanismId,
    cell: CellId,
}

impl ManifestConverter {
    pub fn new(mechanism: MechanismId, cell: CellId) -> Self {
        Self { mechanism, cell }
    }

    pub fn convert(&self, record: &ManifestDb) -> Manifest {
        let drm = record.drm_info.as_ref();
        Manifest {
            presentation_timeline: PresentationTimeline {
                duration: record.duration,
                is_live: false,
            },
            periods: record
                .periods
                .iter()
                .map(|p| self.convert_period(p, drm))
                .collect(),
            offline_session_ids: record.session_ids.iter().cloned().collect(),
            min_buffer_time: MIN_BUFFER_TIME,
            expiration: record.expiration,
            original_uri: record.original_manifest_uri.clone(),
            app_metadata: record.app_metadata.clone(),
        }
    }

    fn convert_period(&self, period: &PeriodDb, drm: Option<&DrmInfo>) -> Period {
        let of_type = |t: ContentType| period.streams.iter().filter(move |s| s.content_type == t);

        let variant_ids: BTreeSet<u32> = of_type(ContentType::Audio)
            .chain(of_type(ContentType::Video))
            .flat_map(|s| s.variant_ids.iter().copied())
            .collect();

        let variants = variant_ids
            .into_iter()
            .map(|id| {
                let with_id = |t| of_type(t).find(|s| s.variant_ids.contains(&id));
                let audio = with_id(ContentType::Audio).map(|s| self.convert_stream(s));
                let video = with_id(ContentType::Video).map(|s| self.convert_stream(s));
                Variant {
                    id,
                    language: audio.as_ref().map(|a| a.language.clone()).unwrap_or_default(),
                    primary: false,
                    audio,
                    video,
                    bandwidth: 0,
                    drm_infos: drm.into_iter().cloned().collect(),
                    allowed_by_application: true,
                    allowed_by_key_system: true,
                }
            })
            .collect();

        Period {
            start_time: period.start_time,
            variants,
            text_streams: of_type(ContentType::Text)
                .map(|s| self.convert_stream(s))
                .collect(),
        }
    }

    fn convert_stream(&self, stream: &StreamDb) -> Stream {
        Stream {
            id: stream.id,
            content_type: stream.content_type,
            mime_type: stream.mime_type.clone(),
            codecs: stream.codecs.clone(),
            frame_rate: stream.frame_rate,
            language: stream.language.clone(),
            label: stream.label.clone(),
            width: stream.width,
            height: stream.height,
            kind: stream.kind.clone(),
            channels_count: stream.channels_count,
            encrypted: stream.encrypted,
            key_ids: stream.key_ids.clone(),
            init_segment: stream.init_segment_key.map(|key| self.segment_uri(key)),
            segments: stream
                .segments
                .iter()
                .enumerate()
                .map(|(position, s)| SegmentReference {
                    position,
                    start_time: s.start_time,
                    end_time: s.end_time,
                    uri: self.segment_uri(s.data_key),
                })
                .collect(),
        }
    }

    fn segment_uri(&self, key: u64) -> OfflineUri {
        OfflineUri::segment(self.mechanism.clone(), self.cell.clone(), key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oms_types::{Expiration, SegmentDb};

    fn converter() -> ManifestConverter {
        ManifestConverter::new(
            MechanismId::new("memory").unwrap(),
            CellId::new("default").unwrap(),
        )
    }

    fn stream(id: u32, content_type: ContentType, variant_ids: Vec<u32>) -> StreamDb {
        StreamDb {
            id,
            content_type,
            mime_type: match content_type {
                ContentType::Audio => "audio/mp4".into(),
                ContentType::Video => "video/mp4".into(),
                ContentType::Text => "text/vtt".into(),
            },
            codecs: String::new(),
            frame_rate: None,
            language: "en".into(),
            label: None,
            width: None,
            height: None,
            kind: None,
            channels_count: None,
            encrypted: false,
            key_ids: BTreeSet::new(),
            init_segment_key: None,
            segments: Vec::new(),
            variant_ids,
        }
    }

    #[test]
    fn top_level_fields_carry_over() {
        let mut record = ManifestDb::new("https://cdn.example/a.mpd", 600.0, 104_857_600);
        record.session_ids.insert("session-id".into());
        record.expiration = Expiration::at(1000.0);
        record
            .app_metadata
            .insert("title".into(), serde_json::json!("A"));

        let manifest = converter().convert(&record);
        assert_eq!(manifest.presentation_timeline.duration, 600.0);
        assert!(!manifest.presentation_timeline.is_live);
        assert_eq!(manifest.offline_session_ids, vec!["session-id".to_string()]);
        assert_eq!(manifest.expiration, Expiration::at(1000.0));
        assert_eq!(manifest.original_uri, "https://cdn.example/a.mpd");
        assert_eq!(manifest.app_metadata["title"], serde_json::json!("A"));
        assert!(manifest.periods.is_empty());
    }

    #[test]
    fn variants_pair_audio_and_video_by_variant_id() {
        let mut record = ManifestDb::new("a.mpd", 10.0, 1);
        record.drm_info = Some(DrmInfo {
            key_system: "com.widevine.alpha".into(),
            ..DrmInfo::default()
        });
        record.periods.push(PeriodDb {
            start_time: 0.0,
            streams: vec![
                stream(1, ContentType::Audio, vec![10, 11]),
                stream(2, ContentType::Video, vec![10]),
                stream(3, ContentType::Video, vec![11]),
                stream(4, ContentType::Text, vec![]),
            ],
        });

        let manifest = converter().convert(&record);
        let period = &manifest.periods[0];
        assert_eq!(period.variants.len(), 2);

        let first = &period.variants[0];
        assert_eq!(first.id, 10);
        assert_eq!(first.audio.as_ref().unwrap().id, 1);
        assert_eq!(first.video.as_ref().unwrap().id, 2);
        assert_eq!(first.language, "en");
        assert_eq!(first.drm_infos[0].key_system, "com.widevine.alpha");

        let second = &period.variants[1];
        assert_eq!(second.video.as_ref().unwrap().id, 3);

        assert_eq!(period.text_streams.len(), 1);
        assert_eq!(period.text_streams[0].id, 4);
    }

    #[test]
    fn video_only_variant_has_no_audio() {
        let mut record = ManifestDb::new("a.mpd", 10.0, 1);
        record.periods.push(PeriodDb {
            start_time: 5.0,
            streams: vec![stream(7, ContentType::Video, vec![0])],
        });

        let period = &converter().convert(&record).periods[0];
        assert_eq!(period.start_time, 5.0);
        assert!(period.variants[0].audio.is_none());
        assert_eq!(period.variants[0].language, "");
        assert!(period.variants[0].drm_infos.is_empty());
    }

    #[test]
    fn segments_become_offline_segment_uris() {
        let mut video = stream(1, ContentType::Video, vec![0]);
        video.init_segment_key = Some(99);
        video.segments = vec![
            SegmentDb {
                start_time: 0.0,
                end_time: 4.0,
                data_key: 5,
            },
            SegmentDb {
                start_time: 4.0,
                end_time: 8.0,
                data_key: 6,
            },
        ];
        let mut record = ManifestDb::new("a.mpd", 8.0, 1);
        record.periods.push(PeriodDb {
            start_time: 0.0,
            streams: vec![video],
        });

        let manifest = converter().convert(&record);
        let stream = manifest.periods[0].variants[0].video.as_ref().unwrap();
        assert_eq!(
            stream.init_segment.as_ref().unwrap().to_string(),
            "offline:segment/memory/default/99"
        );
        assert_eq!(
            stream.segments[1].uri.to_string(),
            "offline:segment/memory/default/6"
        );
        assert_eq!(stream.find_segment(5.0), Some(1));
        assert_eq!(stream.find_segment(8.0), None);
        assert_eq!(stream.segment(0).unwrap().end_time, 4.0);
    }
}
