//! Canonical interchange document.
//!
//! The JSON shape exchanged between the export stage, the external edit
//! planner and the import stage:
//!
//! ```text
//! { schema_version, otio_schema_version,
//!   timeline: {name, fps, metadata},
//!   tracks: [{track_index, name, kind, clips: [clip | gap], metadata}],
//!   summary: {total_tracks, total_clips, timeline_duration_frames} }
//! ```

use std::path::Path;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{
    fs, CoreError, CoreResult, FrameCount, FrameRate, DEFAULT_FPS, DOCUMENT_SCHEMA_VERSION,
    OTIO_SCHEMA_VERSION,
};

/// Top-level keys every document must carry
pub const REQUIRED_KEYS: [&str; 3] = ["timeline", "tracks", "summary"];

// =============================================================================
// Document
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineDocument {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default = "default_otio_schema_version")]
    pub otio_schema_version: String,
    pub timeline: TimelineHeader,
    pub tracks: Vec<TrackEntry>,
    pub summary: Summary,
}

fn default_schema_version() -> String {
    DOCUMENT_SCHEMA_VERSION.to_string()
}

fn default_otio_schema_version() -> String {
    OTIO_SCHEMA_VERSION.to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineHeader {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_fps", deserialize_with = "de_fps")]
    pub fps: FrameRate,
    #[serde(default, deserialize_with = "de_metadata")]
    pub metadata: Map<String, Value>,
}

fn default_fps() -> FrameRate {
    DEFAULT_FPS
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackEntry {
    pub track_index: usize,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub clips: Vec<ItemEntry>,
    #[serde(default, deserialize_with = "de_metadata")]
    pub metadata: Map<String, Value>,
}

fn default_kind() -> String {
    "Video".to_string()
}

impl TrackEntry {
    pub fn is_audio(&self) -> bool {
        self.kind.eq_ignore_ascii_case("audio")
    }

    pub fn is_video(&self) -> bool {
        self.kind.eq_ignore_ascii_case("video")
    }

    /// Rate of the first real clip with a source range
    pub fn first_clip_fps(&self) -> Option<FrameRate> {
        self.clips.iter().find_map(|item| match item {
            ItemEntry::Clip(clip) => clip.source_range.as_ref().map(|r| r.fps),
            ItemEntry::Gap(_) => None,
        })
    }

    pub fn clip_count(&self) -> usize {
        self.clips.iter().filter(|c| !c.is_gap()).count()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub total_tracks: usize,
    #[serde(default)]
    pub total_clips: usize,
    #[serde(default)]
    pub timeline_duration_frames: FrameCount,
}

// =============================================================================
// Items
// =============================================================================

/// A clips-array entry: a real clip, or a gap tagged `"type": "gap"`
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ItemEntry {
    Gap(GapEntry),
    Clip(ClipEntry),
}

impl ItemEntry {
    pub fn is_gap(&self) -> bool {
        matches!(self, ItemEntry::Gap(_))
    }

    pub fn clip_index(&self) -> usize {
        match self {
            ItemEntry::Gap(gap) => gap.clip_index,
            ItemEntry::Clip(clip) => clip.clip_index,
        }
    }

    /// Frames this entry occupies on its track
    pub fn duration_frames(&self) -> FrameCount {
        match self {
            ItemEntry::Gap(gap) => gap.source_range.duration_frames,
            ItemEntry::Clip(clip) => clip
                .source_range
                .as_ref()
                .map(|r| r.duration_frames)
                .unwrap_or(0),
        }
    }
}

impl<'de> Deserialize<'de> for ItemEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let is_gap = value.get("type").and_then(Value::as_str) == Some("gap");
        if is_gap {
            GapEntry::deserialize(value)
                .map(ItemEntry::Gap)
                .map_err(de::Error::custom)
        } else {
            ClipEntry::deserialize(value)
                .map(ItemEntry::Clip)
                .map_err(de::Error::custom)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipEntry {
    pub clip_index: usize,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "de_metadata")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_range: Option<FrameRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_reference: Option<MediaReferenceEntry>,
}

/// Annotation fields an upstream transcription step may attach to a clip
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transcript {
    pub speaker: Option<String>,
    pub text: Option<String>,
    /// Confidence clamped to [0, 1]
    pub confidence: Option<f64>,
}

impl ClipEntry {
    pub fn transcript(&self) -> Transcript {
        let text_of = |key: &str| {
            self.metadata
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        Transcript {
            speaker: text_of("speaker"),
            text: text_of("text"),
            confidence: self
                .metadata
                .get("confidence")
                .and_then(Value::as_f64)
                .filter(|c| c.is_finite())
                .map(|c| c.clamp(0.0, 1.0)),
        }
    }

    pub fn target_url(&self) -> Option<&str> {
        self.media_reference
            .as_ref()
            .and_then(|m| m.target_url.as_deref())
            .filter(|url| !url.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GapEntry {
    #[serde(rename = "type")]
    pub entry_type: String,
    pub clip_index: usize,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub source_range: GapRange,
}

impl GapEntry {
    pub fn new(clip_index: usize, name: impl Into<String>, duration_frames: FrameCount) -> Self {
        Self {
            entry_type: "gap".to_string(),
            clip_index,
            name: name.into(),
            source_range: GapRange { duration_frames },
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GapRange {
    #[serde(default, deserialize_with = "de_frames")]
    pub duration_frames: FrameCount,
}

/// A source or available range in whole frames
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameRange {
    #[serde(deserialize_with = "de_frames")]
    pub start_frame: FrameCount,
    #[serde(deserialize_with = "de_frames")]
    pub duration_frames: FrameCount,
    /// Derived on export; ignored on import
    #[serde(default, deserialize_with = "de_optional_frames")]
    pub end_frame: FrameCount,
    #[serde(deserialize_with = "de_fps")]
    pub fps: FrameRate,
}

impl FrameRange {
    pub fn new(start_frame: FrameCount, duration_frames: FrameCount, fps: FrameRate) -> Self {
        Self {
            start_frame,
            duration_frames,
            end_frame: last_frame(start_frame, duration_frames),
            fps,
        }
    }

    /// True if `end_frame` agrees with start and duration
    pub fn is_consistent(&self) -> bool {
        self.end_frame == last_frame(self.start_frame, self.duration_frames)
    }
}

/// Inclusive last frame, saturating at the ends of the frame range
fn last_frame(start_frame: FrameCount, duration_frames: FrameCount) -> FrameCount {
    start_frame.saturating_add(duration_frames).saturating_sub(1)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaReferenceEntry {
    #[serde(rename = "type", default = "default_reference_type")]
    pub reference_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_range: Option<FrameRange>,
}

fn default_reference_type() -> String {
    "ExternalReference".to_string()
}

// =============================================================================
// Lenient Numbers
// =============================================================================

// Upstream edit planners emit frame numbers as ints, floats or numeric strings.

fn number_from(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn de_frames<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FrameCount, D::Error> {
    let value = Value::deserialize(deserializer)?;
    match number_from(&value) {
        Some(n) if n.is_finite() => Ok(n.trunc() as FrameCount),
        _ => Err(de::Error::custom(format!(
            "expected a frame number, found {value}"
        ))),
    }
}

fn de_optional_frames<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FrameCount, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(number_from(&value)
        .filter(|n| n.is_finite())
        .map(|n| n.trunc() as FrameCount)
        .unwrap_or_default())
}

fn de_fps<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FrameRate, D::Error> {
    let value = Value::deserialize(deserializer)?;
    match number_from(&value) {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(de::Error::custom(format!(
            "expected a frame rate, found {value}"
        ))),
    }
}

fn de_metadata<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Map<String, Value>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Object(obj) => Ok(obj),
        Value::Null => Ok(Map::new()),
        other => Err(de::Error::custom(format!(
            "metadata must be an object, found {other}"
        ))),
    }
}

// =============================================================================
// Validation & Decoding
// =============================================================================

/// Fails fast if the required top-level keys are missing or mistyped.
pub fn validate_shape(value: &Value) -> CoreResult<()> {
    let obj = value
        .as_object()
        .ok_or_else(|| CoreError::invalid_document("document root must be a JSON object"))?;
    for key in REQUIRED_KEYS {
        if !obj.contains_key(key) {
            return Err(CoreError::invalid_document(format!(
                "missing required field: {key}"
            )));
        }
    }
    if !obj["tracks"].is_array() {
        return Err(CoreError::invalid_document("\"tracks\" must be an array"));
    }
    if !obj["timeline"].is_object() {
        return Err(CoreError::invalid_document("\"timeline\" must be an object"));
    }
    Ok(())
}

/// Decodes one track, defaulting a missing `track_index` to its array position.
pub fn decode_track(value: &Value, position: usize) -> CoreResult<TrackEntry> {
    let mut value = value.clone();
    let obj = value
        .as_object_mut()
        .ok_or_else(|| CoreError::invalid_document(format!("tracks[{position}] is not an object")))?;
    obj.entry("track_index")
        .or_insert_with(|| Value::from(position));
    if let Some(Value::Array(clips)) = obj.get_mut("clips") {
        for (i, clip) in clips.iter_mut().enumerate() {
            if let Value::Object(c) = clip {
                c.entry("clip_index").or_insert_with(|| Value::from(i));
            }
        }
    }
    TrackEntry::deserialize(value)
        .map_err(|e| CoreError::invalid_document(format!("tracks[{position}]: {e}")))
}

/// Decodes one clips-array entry.
pub fn decode_item(value: &Value, location: &str) -> CoreResult<ItemEntry> {
    ItemEntry::deserialize(value).map_err(|e| CoreError::invalid_document(format!("{location}: {e}")))
}

impl TimelineDocument {
    /// Validates and decodes a whole document; any bad field fails the decode.
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        validate_shape(value)?;
        let timeline = TimelineHeader::deserialize(&value["timeline"])
            .map_err(|e| CoreError::invalid_document(format!("timeline: {e}")))?;
        let summary = Summary::deserialize(&value["summary"])
            .map_err(|e| CoreError::invalid_document(format!("summary: {e}")))?;
        let tracks = value["tracks"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .enumerate()
            .map(|(pos, track)| decode_track(track, pos))
            .collect::<CoreResult<Vec<_>>>()?;

        let text = |key: &str, fallback: fn() -> String| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(fallback)
        };
        Ok(Self {
            schema_version: text("schema_version", default_schema_version),
            otio_schema_version: text("otio_schema_version", default_otio_schema_version),
            timeline,
            tracks,
            summary,
        })
    }

    /// Recomputes the track and clip counters from the track list.
    pub fn refresh_counts(&mut self) {
        self.summary.total_tracks = self.tracks.len();
        self.summary.total_clips = self.tracks.iter().map(TrackEntry::clip_count).sum();
    }

    pub fn has_audio_track(&self) -> bool {
        self.tracks.iter().any(TrackEntry::is_audio)
    }

    /// One past the highest track index in use
    pub fn next_track_index(&self) -> usize {
        self.tracks
            .iter()
            .map(|t| t.track_index.saturating_add(1))
            .max()
            .unwrap_or(0)
    }
}

/// Reads a document file as raw JSON, leaving decoding to the caller's strategy.
pub fn read_document_value(path: &Path) -> CoreResult<Value> {
    fs::read_json(path)
}

/// Reads and strictly decodes a document file.
pub fn read_document(path: &Path) -> CoreResult<TimelineDocument> {
    TimelineDocument::from_value(&read_document_value(path)?)
}

/// Writes a document as pretty UTF-8 JSON, atomically.
pub fn write_document(path: &Path, document: &TimelineDocument) -> CoreResult<()> {
    fs::atomic_write_json_pretty(path, document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "schema_version": "1.0",
            "otio_schema_version": "0.17.0",
            "timeline": {"name": "Cut", "fps": 24.0, "metadata": {}},
            "tracks": [{
                "track_index": 0,
                "name": "Video 1",
                "kind": "Video",
                "metadata": {},
                "clips": [
                    {
                        "clip_index": 0,
                        "name": "A",
                        "metadata": {"speaker": "Host", "text": "Welcome back", "confidence": 1.4},
                        "source_range": {"start_frame": 0, "duration_frames": 100, "end_frame": 99, "fps": 24.0},
                        "media_reference": {"type": "ExternalReference", "target_url": "/m/a.mov", "filename": "a.mov"}
                    },
                    {"type": "gap", "clip_index": 1, "name": "Gap 2", "source_range": {"duration_frames": 48}}
                ]
            }],
            "summary": {"total_tracks": 1, "total_clips": 1, "timeline_duration_frames": 148}
        })
    }

    #[test]
    fn test_decodes_clips_and_gaps() {
        let doc = TimelineDocument::from_value(&sample()).unwrap();
        let clips = &doc.tracks[0].clips;
        assert!(matches!(clips[0], ItemEntry::Clip(_)));
        assert!(clips[1].is_gap());
        assert_eq!(clips[1].duration_frames(), 48);
        assert_eq!(doc.tracks[0].clip_count(), 1);
    }

    #[test]
    fn test_missing_tracks_is_rejected() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("tracks");
        let err = TimelineDocument::from_value(&value).unwrap_err();
        assert!(err.to_string().contains("missing required field: tracks"));
    }

    #[test]
    fn test_numeric_strings_are_accepted() {
        let mut value = sample();
        value["tracks"][0]["clips"][0]["source_range"] =
            json!({"start_frame": "10", "duration_frames": 20.0, "fps": "25"});
        let doc = TimelineDocument::from_value(&value).unwrap();
        let ItemEntry::Clip(clip) = &doc.tracks[0].clips[0] else {
            panic!("expected clip");
        };
        let range = clip.source_range.as_ref().unwrap();
        assert_eq!((range.start_frame, range.duration_frames, range.fps), (10, 20, 25.0));
    }

    #[test]
    fn test_garbage_frames_name_location() {
        let mut value = sample();
        value["tracks"][0]["clips"][0]["source_range"]["duration_frames"] = json!("lots");
        let err = TimelineDocument::from_value(&value).unwrap_err();
        assert!(err.to_string().contains("tracks[0]"));
    }

    #[test]
    fn test_missing_indices_default_to_position() {
        let mut value = sample();
        value["tracks"][0].as_object_mut().unwrap().remove("track_index");
        value["tracks"][0]["clips"][1]
            .as_object_mut()
            .unwrap()
            .remove("clip_index");
        let doc = TimelineDocument::from_value(&value).unwrap();
        assert_eq!(doc.tracks[0].track_index, 0);
        assert_eq!(doc.tracks[0].clips[1].clip_index(), 1);
    }

    #[test]
    fn test_gap_serializes_with_type_tag() {
        let gap = ItemEntry::Gap(GapEntry::new(3, "Gap 4", 48));
        assert_eq!(
            serde_json::to_value(&gap).unwrap(),
            json!({"type": "gap", "clip_index": 3, "name": "Gap 4", "source_range": {"duration_frames": 48}})
        );
    }

    #[test]
    fn test_transcript_fields() {
        let doc = TimelineDocument::from_value(&sample()).unwrap();
        let ItemEntry::Clip(clip) = &doc.tracks[0].clips[0] else {
            panic!("expected clip");
        };
        let transcript = clip.transcript();
        assert_eq!(transcript.speaker.as_deref(), Some("Host"));
        assert_eq!(transcript.text.as_deref(), Some("Welcome back"));
        assert_eq!(transcript.confidence, Some(1.0));
    }

    #[test]
    fn test_frame_range_derives_end() {
        let range = FrameRange::new(100, 50, 24.0);
        assert_eq!(range.end_frame, 149);
        assert!(range.is_consistent());
    }
}
