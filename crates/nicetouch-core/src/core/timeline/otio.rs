//! Native OTIO JSON reader and writer.
//!
//! `.otio` files are JSON trees where every object carries an `OTIO_SCHEMA`
//! tag of the form `Name.version`. The reader walks the tree with
//! `serde_json::Value` and keeps every field it does not model in the `extra`
//! maps; the writer emits the current schema versions (`Clip.2` with a
//! `media_references` map) and re-applies those extras.

use std::path::Path;

use serde_json::{json, Map, Value};

use super::models::{
    Clip, Gap, Item, MediaReference, MediaReferenceKind, Metadata, RationalTime, TimeRange,
    Timeline, Track, TrackKind, DEFAULT_MEDIA_KEY,
};
use crate::core::{fs, CoreError, CoreResult};

const SCHEMA_KEY: &str = "OTIO_SCHEMA";

// =============================================================================
// Schema Tags
// =============================================================================

/// Splits `Clip.2` into (`Clip`, Some(2)).
pub fn split_schema(tag: &str) -> (&str, Option<u32>) {
    match tag.rsplit_once('.') {
        Some((name, version)) => (name, version.parse().ok()),
        None => (tag, None),
    }
}

/// Schema name of a JSON object, without version
pub fn schema_name_of(value: &Value) -> Option<&str> {
    value
        .get(SCHEMA_KEY)
        .and_then(Value::as_str)
        .map(|tag| split_schema(tag).0)
}

// =============================================================================
// Reading
// =============================================================================

/// Reads a timeline from an `.otio` file.
pub fn read_timeline_file(path: &Path) -> CoreResult<Timeline> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CoreError::FileNotFound(path.display().to_string()),
        _ => CoreError::IoError(e),
    })?;
    read_timeline_str(&content)
}

/// Parses a timeline from OTIO JSON text.
pub fn read_timeline_str(content: &str) -> CoreResult<Timeline> {
    let value: Value = serde_json::from_str(content)?;
    timeline_from_value(&value)
}

/// Decodes a timeline from an OTIO JSON tree.
///
/// A `SerializableCollection` root resolves to its first timeline child; any
/// other non-timeline root is a type mismatch.
pub fn timeline_from_value(value: &Value) -> CoreResult<Timeline> {
    match schema_name_of(value) {
        Some("Timeline") => parse_timeline(value),
        Some("SerializableCollection") => {
            let children = value
                .get("children")
                .and_then(Value::as_array)
                .ok_or_else(|| CoreError::MalformedOtio("collection has no children".into()))?;
            let first = children
                .iter()
                .find(|c| schema_name_of(c) == Some("Timeline"))
                .ok_or_else(|| CoreError::TypeMismatch {
                    expected: "Timeline".into(),
                    found: "SerializableCollection without a Timeline".into(),
                })?;
            parse_timeline(first)
        }
        other => Err(CoreError::TypeMismatch {
            expected: "Timeline".into(),
            found: other.unwrap_or("untagged JSON").to_string(),
        }),
    }
}

fn parse_timeline(value: &Value) -> CoreResult<Timeline> {
    let obj = as_object(value, "Timeline")?;
    let mut timeline = Timeline::new(str_field(obj, "name"));
    timeline.metadata = metadata_field(obj);
    timeline.global_start_time = match obj.get("global_start_time") {
        Some(v) if !v.is_null() => Some(parse_rational(v, "Timeline.global_start_time")?),
        _ => None,
    };
    timeline.extra = leftovers(obj, &["name", "metadata", "global_start_time", "tracks"]);

    if let Some(stack) = obj.get("tracks").filter(|v| !v.is_null()) {
        let stack_obj = as_object(stack, "Stack")?;
        timeline.stack_extra = leftovers(stack_obj, &["children"]);
        for (index, child) in array_field(stack_obj, "children").iter().enumerate() {
            if schema_name_of(child) == Some("Track") {
                timeline.tracks.push(parse_track(child, index)?);
            } else {
                tracing::warn!(
                    index,
                    schema = schema_name_of(child).unwrap_or("untagged"),
                    "Skipping non-track child of the top-level stack"
                );
            }
        }
    }

    Ok(timeline)
}

fn parse_track(value: &Value, index: usize) -> CoreResult<Track> {
    let obj = as_object(value, "Track")?;
    let kind = obj
        .get("kind")
        .and_then(Value::as_str)
        .map(TrackKind::parse)
        .unwrap_or_default();
    let mut track = Track::new(str_field(obj, "name"), kind);
    track.metadata = metadata_field(obj);
    track.extra = leftovers(obj, &["name", "kind", "metadata", "children"]);

    for (pos, child) in array_field(obj, "children").iter().enumerate() {
        let item = match schema_name_of(child) {
            Some("Clip") => Item::Clip(parse_clip(child, index, pos)?),
            Some("Gap") => Item::Gap(parse_gap(child, index, pos)?),
            _ => Item::Other(child.clone()),
        };
        track.items.push(item);
    }
    Ok(track)
}

fn parse_clip(value: &Value, track: usize, pos: usize) -> CoreResult<Clip> {
    let obj = as_object(value, "Clip")?;
    let at = format!("tracks[{track}].children[{pos}]");
    let mut clip = Clip::new(str_field(obj, "name"));
    clip.metadata = metadata_field(obj);
    clip.source_range = optional_range(obj, "source_range", &at)?;

    let mut extra = leftovers(
        obj,
        &[
            "name",
            "metadata",
            "source_range",
            "media_reference",
            "media_references",
            "active_media_reference_key",
        ],
    );

    match obj.get("media_references").and_then(Value::as_object) {
        Some(refs) => {
            // Clip.2: one active reference plus optional alternates
            let key = obj
                .get("active_media_reference_key")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_MEDIA_KEY)
                .to_string();
            clip.media_reference = match refs.get(&key) {
                Some(v) if !v.is_null() => parse_media_reference(v, &at)?,
                _ => None,
            };
            let alternates: Map<String, Value> = refs
                .iter()
                .filter(|(k, _)| **k != key)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            if !alternates.is_empty() {
                extra.insert("media_references".into(), Value::Object(alternates));
            }
            clip.active_reference_key = key;
        }
        None => {
            clip.media_reference = match obj.get("media_reference") {
                Some(v) if !v.is_null() => parse_media_reference(v, &at)?,
                _ => None,
            };
        }
    }

    clip.extra = extra;
    Ok(clip)
}

fn parse_gap(value: &Value, track: usize, pos: usize) -> CoreResult<Gap> {
    let obj = as_object(value, "Gap")?;
    let at = format!("tracks[{track}].children[{pos}]");
    Ok(Gap {
        name: str_field(obj, "name"),
        source_range: optional_range(obj, "source_range", &at)?,
        metadata: metadata_field(obj),
        extra: leftovers(obj, &["name", "metadata", "source_range"]),
    })
}

fn parse_media_reference(value: &Value, at: &str) -> CoreResult<Option<MediaReference>> {
    let obj = as_object(value, "MediaReference")?;
    let tag = obj.get(SCHEMA_KEY).and_then(Value::as_str).unwrap_or("");
    let kind = match split_schema(tag).0 {
        "ExternalReference" => MediaReferenceKind::External {
            target_url: str_field(obj, "target_url"),
        },
        "MissingReference" => MediaReferenceKind::Missing,
        _ => MediaReferenceKind::Other {
            schema: tag.to_string(),
        },
    };
    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let reference = MediaReference {
        kind,
        name,
        available_range: optional_range(obj, "available_range", &format!("{at}.media"))?,
        metadata: metadata_field(obj),
        extra: leftovers(obj, &["name", "metadata", "available_range", "target_url"]),
    };
    // A bare MissingReference is how OTIO spells "no media".
    Ok((!reference.is_placeholder()).then_some(reference))
}

fn parse_rational(value: &Value, at: &str) -> CoreResult<RationalTime> {
    let num = |key: &str| {
        value.get(key).and_then(Value::as_f64).ok_or_else(|| {
            CoreError::MalformedOtio(format!("{at}: RationalTime is missing numeric {key:?}"))
        })
    };
    Ok(RationalTime::new(num("value")?, num("rate")?))
}

fn optional_range(obj: &Map<String, Value>, key: &str, at: &str) -> CoreResult<Option<TimeRange>> {
    let Some(value) = obj.get(key).filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let at = format!("{at}.{key}");
    let start = value
        .get("start_time")
        .ok_or_else(|| CoreError::MalformedOtio(format!("{at}: missing start_time")))?;
    let duration = value
        .get("duration")
        .ok_or_else(|| CoreError::MalformedOtio(format!("{at}: missing duration")))?;
    Ok(Some(TimeRange::new(
        parse_rational(start, &at)?,
        parse_rational(duration, &at)?,
    )))
}

fn as_object<'a>(value: &'a Value, expected: &str) -> CoreResult<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        CoreError::MalformedOtio(format!("expected a {expected} object, found {value}"))
    })
}

fn str_field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn metadata_field(obj: &Map<String, Value>) -> Metadata {
    obj.get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn array_field<'a>(obj: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    obj.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn leftovers(obj: &Map<String, Value>, consumed: &[&str]) -> Metadata {
    obj.iter()
        .filter(|(k, _)| k.as_str() != SCHEMA_KEY && !consumed.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

// =============================================================================
// Writing
// =============================================================================

/// Writes a timeline to an `.otio` file atomically.
pub fn write_timeline_file(path: &Path, timeline: &Timeline) -> CoreResult<()> {
    fs::atomic_write_json_pretty(path, &timeline_to_value(timeline))
}

/// Serializes a timeline to pretty OTIO JSON text.
pub fn write_timeline_string(timeline: &Timeline) -> CoreResult<String> {
    Ok(serde_json::to_string_pretty(&timeline_to_value(timeline))?)
}

/// Encodes a timeline as an OTIO JSON tree.
pub fn timeline_to_value(timeline: &Timeline) -> Value {
    let mut stack = tagged("Stack.1");
    stack.insert("metadata".into(), json!({}));
    stack.insert("name".into(), json!("tracks"));
    stack.insert("source_range".into(), Value::Null);
    stack.insert("effects".into(), json!([]));
    stack.insert("markers".into(), json!([]));
    stack.insert("enabled".into(), json!(true));
    overlay(&mut stack, &timeline.stack_extra);
    stack.insert(
        "children".into(),
        Value::Array(timeline.tracks.iter().map(track_to_value).collect()),
    );

    let mut root = tagged("Timeline.1");
    root.insert("metadata".into(), Value::Object(timeline.metadata.clone()));
    root.insert("name".into(), json!(timeline.name));
    root.insert(
        "global_start_time".into(),
        timeline
            .global_start_time
            .as_ref()
            .map(rational_to_value)
            .unwrap_or(Value::Null),
    );
    overlay(&mut root, &timeline.extra);
    root.insert("tracks".into(), Value::Object(stack));
    Value::Object(root)
}

fn track_to_value(track: &Track) -> Value {
    let mut obj = item_skeleton("Track.1", &track.name, &track.metadata, None);
    overlay(&mut obj, &track.extra);
    obj.insert(
        "children".into(),
        Value::Array(track.items.iter().map(item_to_value).collect()),
    );
    obj.insert("kind".into(), json!(track.kind.as_str()));
    Value::Object(obj)
}

fn item_to_value(item: &Item) -> Value {
    match item {
        Item::Clip(clip) => clip_to_value(clip),
        Item::Gap(gap) => {
            let mut obj = item_skeleton("Gap.1", &gap.name, &gap.metadata, gap.source_range);
            overlay(&mut obj, &gap.extra);
            Value::Object(obj)
        }
        Item::Other(raw) => raw.clone(),
    }
}

fn clip_to_value(clip: &Clip) -> Value {
    let mut obj = item_skeleton("Clip.2", &clip.name, &clip.metadata, clip.source_range);
    let mut refs = clip
        .extra
        .get("media_references")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let active = clip
        .media_reference
        .clone()
        .unwrap_or_else(MediaReference::missing);
    refs.insert(clip.active_reference_key.clone(), media_to_value(&active));

    let extras: Metadata = clip
        .extra
        .iter()
        .filter(|(k, _)| k.as_str() != "media_references")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    overlay(&mut obj, &extras);
    obj.insert("media_references".into(), Value::Object(refs));
    obj.insert(
        "active_media_reference_key".into(),
        json!(clip.active_reference_key),
    );
    Value::Object(obj)
}

fn media_to_value(media: &MediaReference) -> Value {
    let tag = match &media.kind {
        MediaReferenceKind::External { .. } => "ExternalReference.1",
        MediaReferenceKind::Missing => "MissingReference.1",
        MediaReferenceKind::Other { schema } => schema.as_str(),
    };
    let mut obj = tagged(tag);
    obj.insert("metadata".into(), Value::Object(media.metadata.clone()));
    obj.insert("name".into(), json!(media.name.clone().unwrap_or_default()));
    obj.insert(
        "available_range".into(),
        media
            .available_range
            .as_ref()
            .map(range_to_value)
            .unwrap_or(Value::Null),
    );
    obj.insert("available_image_bounds".into(), Value::Null);
    overlay(&mut obj, &media.extra);
    if let MediaReferenceKind::External { target_url } = &media.kind {
        obj.insert("target_url".into(), json!(target_url));
    }
    Value::Object(obj)
}

fn item_skeleton(
    tag: &str,
    name: &str,
    metadata: &Metadata,
    source_range: Option<TimeRange>,
) -> Map<String, Value> {
    let mut obj = tagged(tag);
    obj.insert("metadata".into(), Value::Object(metadata.clone()));
    obj.insert("name".into(), json!(name));
    obj.insert(
        "source_range".into(),
        source_range
            .as_ref()
            .map(range_to_value)
            .unwrap_or(Value::Null),
    );
    obj.insert("effects".into(), json!([]));
    obj.insert("markers".into(), json!([]));
    obj.insert("enabled".into(), json!(true));
    obj
}

fn range_to_value(range: &TimeRange) -> Value {
    json!({
        SCHEMA_KEY: "TimeRange.1",
        "duration": rational_to_value(&range.duration),
        "start_time": rational_to_value(&range.start_time),
    })
}

fn rational_to_value(time: &RationalTime) -> Value {
    json!({
        SCHEMA_KEY: "RationalTime.1",
        "rate": time.rate,
        "value": time.value,
    })
}

fn tagged(tag: &str) -> Map<String, Value> {
    let mut obj = Map::new();
    obj.insert(SCHEMA_KEY.into(), json!(tag));
    obj
}

fn overlay(obj: &mut Map<String, Value>, extra: &Metadata) {
    for (key, value) in extra {
        obj.insert(key.clone(), value.clone());
    }
}
