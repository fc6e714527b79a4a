//! OTIO -> JSON exporter.
//!
//! Walks a timeline and produces the canonical interchange document. The walk
//! never aborts on a single bad object: unreadable metadata and unusable
//! ranges are recorded inline and the export carries on.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::document::{
    write_document, ClipEntry, FrameRange, GapEntry, ItemEntry, MediaReferenceEntry, Summary,
    TimelineDocument, TimelineHeader, TrackEntry,
};
use super::metadata::{self, ERROR_MARKER};
use crate::core::timeline::{
    read_timeline_file, timeline_from_value, Clip, Gap, Item, MediaReference, TimeRange, Timeline,
    Track,
};
use crate::core::{
    fs, is_valid_rate, CoreResult, FrameRate, DEFAULT_FPS, DOCUMENT_SCHEMA_VERSION,
    OTIO_SCHEMA_VERSION,
};

/// Name used when the timeline has none
pub const UNTITLED_TIMELINE: &str = "Untitled Timeline";

// =============================================================================
// Entry Points
// =============================================================================

/// Exports an OTIO JSON tree, failing with a type mismatch if it is not a timeline.
pub fn export_value(value: &Value) -> CoreResult<TimelineDocument> {
    Ok(export_timeline(&timeline_from_value(value)?))
}

/// Converts a timeline into the interchange document.
pub fn export_timeline(timeline: &Timeline) -> TimelineDocument {
    let fps = effective_fps(timeline);

    let tracks: Vec<TrackEntry> = timeline
        .tracks
        .iter()
        .enumerate()
        .map(|(position, track)| export_track(track, track.index.unwrap_or(position)))
        .collect();

    let timeline_duration_frames = match timeline.duration() {
        Ok(duration) => duration.frames(),
        Err(e) => {
            tracing::warn!(error = %e, "Timeline duration unavailable; reporting 0 frames");
            0
        }
    };

    let summary = Summary {
        total_tracks: timeline.tracks.len(),
        total_clips: tracks.iter().map(TrackEntry::clip_count).sum(),
        timeline_duration_frames,
    };

    let name = if timeline.name.is_empty() {
        UNTITLED_TIMELINE.to_string()
    } else {
        timeline.name.clone()
    };

    TimelineDocument {
        schema_version: DOCUMENT_SCHEMA_VERSION.to_string(),
        otio_schema_version: OTIO_SCHEMA_VERSION.to_string(),
        timeline: TimelineHeader {
            name,
            fps,
            metadata: metadata::extract(&Value::Object(timeline.metadata.clone())),
        },
        tracks,
        summary,
    }
}

/// Converts an `.otio` file, writing the JSON twin next to it unless `output` is given.
pub fn export_file(input: &Path, output: Option<&Path>) -> CoreResult<(PathBuf, TimelineDocument)> {
    let timeline = read_timeline_file(input)?;
    let document = export_timeline(&timeline);
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| fs::with_extension(input, "json"));

    write_document(&output, &document)?;
    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        timeline = %document.timeline.name,
        fps = document.timeline.fps,
        tracks = document.summary.total_tracks,
        clips = document.summary.total_clips,
        duration_frames = document.summary.timeline_duration_frames,
        "Exported timeline to JSON"
    );
    Ok((output, document))
}

// =============================================================================
// Walk
// =============================================================================

/// Rate of the first clip that exposes a source range; mixed-rate timelines
/// silently adopt it.
pub fn effective_fps(timeline: &Timeline) -> FrameRate {
    timeline
        .tracks
        .iter()
        .flat_map(Track::clips)
        .filter_map(|clip| clip.source_range)
        .map(|range| range.rate())
        .find(|rate| is_valid_rate(*rate))
        .unwrap_or(DEFAULT_FPS)
}

fn export_track(track: &Track, track_index: usize) -> TrackEntry {
    let mut clips = Vec::new();
    // Clips and gaps share one running index; other composables are skipped.
    let mut clip_index = 0;
    for item in &track.items {
        match item {
            Item::Clip(clip) => clips.push(ItemEntry::Clip(export_clip(clip, clip_index))),
            Item::Gap(gap) => clips.push(ItemEntry::Gap(export_gap(gap, clip_index))),
            Item::Other(_) => continue,
        }
        clip_index += 1;
    }

    TrackEntry {
        track_index,
        name: default_name(&track.name, "Track", track_index),
        kind: track.kind.as_str().to_string(),
        clips,
        metadata: metadata::extract(&Value::Object(track.metadata.clone())),
    }
}

fn export_clip(clip: &Clip, clip_index: usize) -> ClipEntry {
    let mut entry_metadata = metadata::flatten_map(&clip.metadata);
    let mut problems = Vec::new();

    let source_range = clip
        .source_range
        .and_then(|range| frame_range(&range, "source range", &mut problems));
    let media_reference = clip
        .media_reference
        .as_ref()
        .map(|media| export_media(media, &mut problems));

    if !problems.is_empty() {
        tracing::warn!(clip = %clip.name, problems = ?problems, "Clip exported with degraded fields");
        entry_metadata.insert(ERROR_MARKER.into(), Value::String(problems.join("; ")));
    }

    ClipEntry {
        clip_index,
        name: default_name(&clip.name, "Clip", clip_index),
        metadata: entry_metadata,
        source_range,
        media_reference,
    }
}

fn export_gap(gap: &Gap, clip_index: usize) -> GapEntry {
    GapEntry::new(
        clip_index,
        default_name(&gap.name, "Gap", clip_index),
        gap.duration_frames(),
    )
}

fn export_media(media: &MediaReference, problems: &mut Vec<String>) -> MediaReferenceEntry {
    let target_url = media.target_url().map(str::to_string);
    let filename = target_url.as_deref().and_then(filename_of);
    MediaReferenceEntry {
        reference_type: media.schema_name().to_string(),
        target_url,
        filename,
        available_range: media
            .available_range
            .and_then(|range| frame_range(&range, "available range", problems)),
    }
}

fn frame_range(range: &TimeRange, label: &str, problems: &mut Vec<String>) -> Option<FrameRange> {
    let rate = range.rate();
    if !is_valid_rate(rate) || !range.start_time.value.is_finite() || !range.duration.value.is_finite()
    {
        problems.push(format!("Invalid {label}: rate {rate}"));
        return None;
    }
    Some(FrameRange::new(
        range.start_frame(),
        range.duration_frames(),
        rate,
    ))
}

/// Last path segment of a locator, for plain paths and `file://` URLs alike.
pub fn filename_of(target_url: &str) -> Option<String> {
    let trimmed = target_url.trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

fn default_name(name: &str, label: &str, index: usize) -> String {
    if name.is_empty() {
        format!("{label} {}", index.saturating_add(1))
    } else {
        name.to_string()
    }
}

/// Builds a summary map for logging and status output
pub fn summary_fields(summary: &Summary) -> Map<String, Value> {
    let mut obj = Map::new();
    obj.insert("total_tracks".into(), summary.total_tracks.into());
    obj.insert("total_clips".into(), summary.total_clips.into());
    obj.insert(
        "timeline_duration_frames".into(),
        summary.timeline_duration_frames.into(),
    );
    obj
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::timeline::{RationalTime, TrackKind};
    use serde_json::json;
    use tempfile::TempDir;

    fn video_clip(name: &str, url: &str, start: i64, duration: i64) -> Item {
        Item::Clip(
            Clip::new(name)
                .with_source_range(TimeRange::from_frames(start, duration, 24.0))
                .with_media_reference(
                    MediaReference::external(url)
                        .with_available_range(TimeRange::from_frames(0, 1000, 24.0)),
                ),
        )
    }

    fn sample_timeline() -> Timeline {
        let mut track = Track::new("", TrackKind::Video);
        track.items.push(video_clip("A", "/media/a.mov", 0, 100));
        track.items.push(Item::Gap(Gap::new("", 48, 24.0)));
        track.items.push(Item::Other(json!({"OTIO_SCHEMA": "Transition.1"})));
        track.items.push(video_clip("", "file:///media/b.mp4", 100, 50));
        let mut timeline = Timeline::new("");
        timeline.tracks.push(track);
        timeline
    }

    #[test]
    fn test_gap_entry_and_counts() {
        let doc = export_timeline(&sample_timeline());
        let gap = serde_json::to_value(&doc.tracks[0].clips[1]).unwrap();
        assert_eq!(gap["type"], "gap");
        assert_eq!(gap["source_range"], json!({"duration_frames": 48}));
        assert_eq!(doc.summary.total_clips, 2);
        assert_eq!(doc.summary.total_tracks, 1);
        assert_eq!(doc.summary.timeline_duration_frames, 198);
    }

    #[test]
    fn test_default_names_and_shared_index() {
        let doc = export_timeline(&sample_timeline());
        assert_eq!(doc.timeline.name, UNTITLED_TIMELINE);
        assert_eq!(doc.tracks[0].name, "Track 1");

        let ItemEntry::Clip(last) = &doc.tracks[0].clips[2] else {
            panic!("expected clip");
        };
        assert_eq!(last.clip_index, 2);
        assert_eq!(last.name, "Clip 3");
        let media = last.media_reference.as_ref().unwrap();
        assert_eq!(media.filename.as_deref(), Some("b.mp4"));
        assert_eq!(media.reference_type, "ExternalReference");
    }

    #[test]
    fn test_end_frame_invariant() {
        let doc = export_timeline(&sample_timeline());
        for item in &doc.tracks[0].clips {
            if let ItemEntry::Clip(clip) = item {
                let source = clip.source_range.as_ref().unwrap();
                assert_eq!(source.end_frame, source.start_frame + source.duration_frames - 1);
                let available = clip
                    .media_reference
                    .as_ref()
                    .and_then(|m| m.available_range.as_ref())
                    .unwrap();
                assert!(available.is_consistent());
            }
        }
    }

    #[test]
    fn test_extreme_start_frame_saturates() {
        let mut timeline = sample_timeline();
        if let Item::Clip(clip) = &mut timeline.tracks[0].items[0] {
            clip.source_range = Some(TimeRange::from_frames(i64::MAX - 1, 100, 24.0));
        }
        let doc = export_timeline(&timeline);
        let ItemEntry::Clip(clip) = &doc.tracks[0].clips[0] else {
            panic!("expected clip");
        };
        let source = clip.source_range.as_ref().unwrap();
        assert_eq!(source.end_frame, i64::MAX - 1);
        assert!(source.is_consistent());
    }

    #[test]
    fn test_fps_from_first_clip() {
        let mut timeline = sample_timeline();
        if let Item::Clip(clip) = &mut timeline.tracks[0].items[0] {
            clip.source_range = Some(TimeRange::from_frames(0, 10, 29.97));
        }
        assert_eq!(export_timeline(&timeline).timeline.fps, 29.97);
        assert_eq!(export_timeline(&Timeline::new("empty")).timeline.fps, DEFAULT_FPS);
    }

    #[test]
    fn test_duration_failure_reports_zero() {
        let mut timeline = sample_timeline();
        timeline.tracks[0].items.push(Item::Clip(Clip::new("no range")));
        let doc = export_timeline(&timeline);
        assert_eq!(doc.summary.timeline_duration_frames, 0);
        assert_eq!(doc.summary.total_clips, 3);
    }

    #[test]
    fn test_bad_rate_degrades_single_clip() {
        let mut timeline = sample_timeline();
        if let Item::Clip(clip) = &mut timeline.tracks[0].items[0] {
            clip.source_range = Some(TimeRange::new(
                RationalTime::new(0.0, 0.0),
                RationalTime::new(10.0, 0.0),
            ));
        }
        let doc = export_timeline(&timeline);
        let ItemEntry::Clip(clip) = &doc.tracks[0].clips[0] else {
            panic!("expected clip");
        };
        assert!(clip.source_range.is_none());
        assert!(clip.metadata[ERROR_MARKER]
            .as_str()
            .unwrap()
            .contains("source range"));
        assert_eq!(doc.tracks[0].clips.len(), 3);
    }

    #[test]
    fn test_nested_clip_metadata_is_flattened() {
        let mut timeline = sample_timeline();
        if let Item::Clip(clip) = &mut timeline.tracks[0].items[0] {
            clip.metadata = json!({"Resolve_OTIO": {"Link Group ID": 1}, "text": "hi"})
                .as_object()
                .unwrap()
                .clone();
        }
        let doc = export_timeline(&timeline);
        let ItemEntry::Clip(clip) = &doc.tracks[0].clips[0] else {
            panic!("expected clip");
        };
        assert_eq!(clip.metadata["Resolve_OTIO_Link Group ID"], 1);
        assert_eq!(clip.metadata["text"], "hi");
    }

    #[test]
    fn test_export_file_writes_twin() {
        let dir = TempDir::new().unwrap();
        let otio = dir.path().join("Edit.otio");
        crate::core::timeline::write_timeline_file(&otio, &sample_timeline()).unwrap();

        let (json_path, doc) = export_file(&otio, None).unwrap();
        assert_eq!(json_path, dir.path().join("Edit.json"));
        assert!(json_path.exists());
        assert_eq!(doc.summary.total_clips, 2);
    }

    #[test]
    fn test_non_timeline_input_is_rejected() {
        let err = export_value(&json!({"OTIO_SCHEMA": "Track.1"})).unwrap_err();
        assert!(matches!(err, crate::core::CoreError::TypeMismatch { .. }));
    }

    #[test]
    fn test_filename_of() {
        assert_eq!(filename_of("/a/b/c.mov").as_deref(), Some("c.mov"));
        assert_eq!(filename_of("C:\\clips\\d.mxf").as_deref(), Some("d.mxf"));
        assert_eq!(filename_of(""), None);
    }
}
