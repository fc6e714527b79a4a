//! JSON -> OTIO rebuilder, "patch a reference" strategy.
//!
//! Applies an edited document to a deep copy of a reference timeline, usually
//! the one just exported from the NLE. Unlike the from-scratch rebuilder this
//! strategy tolerates a partly broken document: bad tracks and clips are
//! reported as warnings and skipped while the rest of the patch proceeds. Only
//! a document that fails top-level shape validation is fatal.
//!
//! Matching rules:
//! - tracks by `track_index`; an index past the reference's track count is skipped
//! - clips by `clip_index` against the track's clips and gaps, by position
//! - an index past the existing items creates a new item at the end of the track
//!
//! Reference tracks are never removed.

use std::path::Path;

use serde_json::{Map, Value};

use super::document::{decode_item, validate_shape, ClipEntry, GapEntry, ItemEntry};
use super::metadata::{unflatten, MetadataWritePolicy, UnflattenRules};
use super::rebuild::{build_clip, build_gap, build_media, checked_range};
use crate::core::timeline::{
    read_timeline_file, write_timeline_file, Clip, Gap, Item, Timeline, TimeRange, Track,
};
use crate::core::{is_valid_rate, CoreResult, FrameRate, DEFAULT_FPS};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatchOptions {
    pub metadata_policy: MetadataWritePolicy,
    pub unflatten: UnflattenRules,
}

impl PatchOptions {
    pub fn with_metadata_policy(mut self, policy: MetadataWritePolicy) -> Self {
        self.metadata_policy = policy;
        self
    }
}

/// Patched timeline plus an account of what was and was not applied
#[derive(Clone, Debug)]
pub struct PatchOutcome {
    pub timeline: Timeline,
    pub warnings: Vec<String>,
    pub modified: usize,
    pub created: usize,
    /// Entries that could not be applied (bad create or bad modification)
    pub dropped: usize,
    pub skipped_tracks: usize,
    pub skipped_metadata_writes: usize,
}

impl PatchOutcome {
    fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            warnings: Vec::new(),
            modified: 0,
            created: 0,
            dropped: 0,
            skipped_tracks: 0,
            skipped_metadata_writes: 0,
        }
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Lenient patch strategy
pub struct Patcher {
    options: PatchOptions,
}

impl Patcher {
    pub fn new(options: PatchOptions) -> Self {
        Self { options }
    }

    /// Applies `document` to a copy of `reference`. The reference is never modified.
    pub fn patch(&self, reference: &Timeline, document: &Value) -> CoreResult<PatchOutcome> {
        validate_shape(document)?;

        let mut outcome = PatchOutcome::new(reference.clone());
        self.patch_header(&mut outcome, &document["timeline"]);

        let document_fps = document["timeline"]
            .get("fps")
            .and_then(Value::as_f64)
            .filter(|r| is_valid_rate(*r));
        let tracks = document["tracks"].as_array().map(Vec::as_slice).unwrap_or(&[]);
        for (position, track_value) in tracks.iter().enumerate() {
            self.patch_track(&mut outcome, track_value, position, document_fps);
        }

        tracing::info!(
            modified = outcome.modified,
            created = outcome.created,
            dropped = outcome.dropped,
            skipped_tracks = outcome.skipped_tracks,
            warnings = outcome.warnings.len(),
            "Patched reference timeline"
        );
        Ok(outcome)
    }

    fn patch_header(&self, outcome: &mut PatchOutcome, header: &Value) {
        if let Some(name) = header.get("name").and_then(Value::as_str) {
            if !name.trim().is_empty() {
                outcome.timeline.name = name.to_string();
            }
        }
        if let Some(metadata) = header.get("metadata").and_then(Value::as_object) {
            let mut target = std::mem::take(&mut outcome.timeline.metadata);
            self.write_metadata(outcome, &mut target, metadata.clone(), "timeline");
            outcome.timeline.metadata = target;
        }
    }

    fn patch_track(
        &self,
        outcome: &mut PatchOutcome,
        value: &Value,
        position: usize,
        document_fps: Option<FrameRate>,
    ) {
        let Some(obj) = value.as_object() else {
            outcome.warn(format!("tracks[{position}] is not an object; skipped"));
            outcome.skipped_tracks += 1;
            return;
        };
        let track_index = match index_field(obj, "track_index") {
            Ok(index) => index.unwrap_or(position),
            Err(raw) => {
                outcome.warn(format!("tracks[{position}] has invalid track_index {raw}; skipped"));
                outcome.skipped_tracks += 1;
                return;
            }
        };
        if track_index >= outcome.timeline.tracks.len() {
            outcome.warn(format!(
                "Track index {track_index} exceeds reference track count {}; skipped",
                outcome.timeline.tracks.len()
            ));
            outcome.skipped_tracks += 1;
            return;
        }

        let mut track = std::mem::replace(
            &mut outcome.timeline.tracks[track_index],
            Track::new("", Default::default()),
        );

        if let Some(name) = obj.get("name").and_then(Value::as_str) {
            if !name.is_empty() {
                track.name = name.to_string();
            }
        }
        if let Some(metadata) = obj.get("metadata").and_then(Value::as_object) {
            self.write_metadata(
                outcome,
                &mut track.metadata,
                metadata.clone(),
                &format!("track {track_index}"),
            );
        }

        let gap_fps = first_clip_rate(&track)
            .or(document_fps)
            .unwrap_or(DEFAULT_FPS);
        let clips = obj.get("clips").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]);
        for (i, clip_value) in clips.iter().enumerate() {
            let location = format!("tracks[{track_index}].clips[{i}]");
            let clip_index = match clip_value.as_object().map(|c| index_field(c, "clip_index")) {
                Some(Err(raw)) => {
                    outcome.warn(format!("Skipped {location}: invalid clip_index {raw}"));
                    outcome.dropped += 1;
                    continue;
                }
                Some(Ok(Some(index))) => index,
                _ => i,
            };
            self.patch_item(outcome, &mut track, clip_value, clip_index, &location, gap_fps);
        }

        outcome.timeline.tracks[track_index] = track;
    }

    fn patch_item(
        &self,
        outcome: &mut PatchOutcome,
        track: &mut Track,
        value: &Value,
        clip_index: usize,
        location: &str,
        gap_fps: FrameRate,
    ) {
        let positions = track.exportable_positions();
        let existing = positions.get(clip_index).copied();

        let entry = match decode_item(value, location) {
            Ok(entry) => entry,
            Err(e) => {
                let verb = if existing.is_some() { "modification" } else { "creation" };
                outcome.warn(format!("Skipped {verb} at {location}: {e}"));
                outcome.dropped += 1;
                return;
            }
        };

        let Some(slot) = existing else {
            match self.create_item(outcome, &entry, location, gap_fps) {
                Some(item) => {
                    track.items.push(item);
                    outcome.created += 1;
                }
                None => outcome.dropped += 1,
            }
            return;
        };

        let same_kind = matches!(
            (&track.items[slot], &entry),
            (Item::Clip(_), ItemEntry::Clip(_)) | (Item::Gap(_), ItemEntry::Gap(_))
        );
        let applied = if same_kind {
            match (&mut track.items[slot], &entry) {
                (Item::Clip(clip), ItemEntry::Clip(patch)) => {
                    self.modify_clip(outcome, clip, patch, location)
                }
                (Item::Gap(gap), ItemEntry::Gap(patch)) => {
                    modify_gap(outcome, gap, patch, location, gap_fps)
                }
                _ => false,
            }
        } else {
            // Clip where a gap was (or the reverse): replace the item outright.
            match self.create_item(outcome, &entry, location, gap_fps) {
                Some(item) => {
                    track.items[slot] = item;
                    true
                }
                None => false,
            }
        };
        if applied {
            outcome.modified += 1;
        } else {
            outcome.dropped += 1;
        }
    }

    fn create_item(
        &self,
        outcome: &mut PatchOutcome,
        entry: &ItemEntry,
        location: &str,
        gap_fps: FrameRate,
    ) -> Option<Item> {
        match entry {
            ItemEntry::Gap(gap) => match build_gap(gap, gap_fps) {
                Some(gap) => Some(Item::Gap(gap)),
                None => {
                    outcome.warn(format!("Dropped empty gap at {location}"));
                    None
                }
            },
            ItemEntry::Clip(clip_entry) => {
                match build_clip(clip_entry, &self.options.unflatten, location) {
                    Ok(mut clip) => {
                        let metadata = std::mem::take(&mut clip.metadata);
                        let filtered = self.options.metadata_policy.filter(metadata);
                        match filtered.accepted {
                            Some(accepted) => clip.metadata = accepted,
                            None => {
                                outcome.skipped_metadata_writes += 1;
                                outcome.warn(format!(
                                    "Metadata write skipped for new clip at {location}: {}",
                                    describe_bad_keys(&filtered.rejected)
                                ));
                            }
                        }
                        Some(Item::Clip(clip))
                    }
                    Err(e) => {
                        outcome.warn(format!("Dropped clip creation at {location}: {e}"));
                        None
                    }
                }
            }
        }
    }

    /// Applies a clip entry to an existing clip; nothing is changed if any range is invalid.
    fn modify_clip(
        &self,
        outcome: &mut PatchOutcome,
        clip: &mut Clip,
        patch: &ClipEntry,
        location: &str,
    ) -> bool {
        let source_range = match &patch.source_range {
            Some(range) => match checked_range(range, &format!("{location}.source_range"), false) {
                Ok(range) => Some(range),
                Err(e) => {
                    outcome.warn(format!("Skipped modification at {location}: {e}"));
                    return false;
                }
            },
            None => None,
        };
        let media = match &patch.media_reference {
            Some(entry) => match build_media(entry, &format!("{location}.media_reference")) {
                Ok(media) => Some((media, entry.available_range.is_some())),
                Err(e) => {
                    outcome.warn(format!("Skipped modification at {location}: {e}"));
                    return false;
                }
            },
            None => None,
        };

        if !patch.name.is_empty() {
            clip.name = patch.name.clone();
        }
        if source_range.is_some() {
            clip.source_range = source_range;
        }
        if let Some((incoming, has_range)) = media {
            match clip.media_reference.as_mut() {
                Some(current) => {
                    current.kind = incoming.kind;
                    if has_range {
                        current.available_range = incoming.available_range;
                    }
                }
                None => clip.media_reference = Some(incoming),
            }
        }

        let metadata = unflatten(&patch.metadata, &self.options.unflatten);
        if !metadata.is_empty() {
            self.write_metadata(outcome, &mut clip.metadata, metadata, location);
        }
        true
    }

    /// Filters a metadata write and merges the accepted keys over `target`.
    fn write_metadata(
        &self,
        outcome: &mut PatchOutcome,
        target: &mut Map<String, Value>,
        incoming: Map<String, Value>,
        owner: &str,
    ) {
        let filtered = self.options.metadata_policy.filter(incoming);
        if !filtered.rejected.is_empty() {
            outcome.warn(format!(
                "Rejected metadata keys on {owner}: {}",
                describe_bad_keys(&filtered.rejected)
            ));
        }
        match filtered.accepted {
            Some(accepted) => merge_metadata(target, accepted),
            None => outcome.skipped_metadata_writes += 1,
        }
    }
}

fn modify_gap(
    outcome: &mut PatchOutcome,
    gap: &mut Gap,
    patch: &GapEntry,
    location: &str,
    gap_fps: FrameRate,
) -> bool {
    let frames = patch.source_range.duration_frames;
    if frames <= 0 {
        outcome.warn(format!("Skipped gap modification at {location}: {frames} frames"));
        return false;
    }
    let rate = gap
        .source_range
        .map(|r| r.duration.rate)
        .filter(|r| is_valid_rate(*r))
        .unwrap_or(gap_fps);
    let start = gap.source_range.map(|r| r.start_frame()).unwrap_or(0);
    gap.source_range = Some(TimeRange::from_frames(start, frames, rate));
    if !patch.name.is_empty() {
        gap.name = patch.name.clone();
    }
    true
}

/// Merges one level deep so namespaced keys update rather than replace their parent.
fn merge_metadata(target: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(children)) => {
                for (child, child_value) in children {
                    existing.insert(child, child_value);
                }
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

fn first_clip_rate(track: &Track) -> Option<FrameRate> {
    track
        .clips()
        .filter_map(|c| c.source_range)
        .map(|r| r.rate())
        .find(|r| is_valid_rate(*r))
}

/// A missing index is `Ok(None)`; anything but a non-negative integer is an error.
fn index_field<'v>(obj: &'v Map<String, Value>, key: &str) -> Result<Option<usize>, &'v Value> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => raw
            .as_u64()
            .and_then(|i| usize::try_from(i).ok())
            .map(Some)
            .ok_or(raw),
    }
}

fn describe_bad_keys(keys: &[super::metadata::BadKey]) -> String {
    keys.iter()
        .map(|k| format!("{:?} ({})", k.path, k.problem))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Patches a reference `.otio` with a document file and writes the result.
pub fn patch_file(
    patcher: &Patcher,
    reference: &Path,
    document: &Path,
    output: &Path,
) -> CoreResult<PatchOutcome> {
    let reference_timeline = read_timeline_file(reference)?;
    let value = super::document::read_document_value(document)?;
    let outcome = patcher.patch(&reference_timeline, &value)?;
    write_timeline_file(output, &outcome.timeline)?;
    tracing::info!(
        reference = %reference.display(),
        output = %output.display(),
        "Wrote patched timeline"
    );
    Ok(outcome)
}
