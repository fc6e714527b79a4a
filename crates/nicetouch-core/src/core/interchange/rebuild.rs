//! JSON -> OTIO rebuilder, "from scratch" strategy.
//!
//! Builds a brand-new timeline from an interchange document. This strategy is
//! strict: a missing top-level key, a malformed number or a non-positive clip
//! duration fails the whole rebuild and no timeline is returned.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::audio::{synthesize_audio_tracks, AudioSynthesisOptions};
use super::document::{
    read_document_value, ClipEntry, FrameRange, GapEntry, ItemEntry, MediaReferenceEntry,
    TimelineDocument, TrackEntry,
};
use super::metadata::{unflatten, UnflattenRules};
use super::project::{ProjectMetadataSource, FALLBACK_TIMELINE_NAME};
use crate::core::timeline::{
    write_timeline_file, Clip, Gap, Item, MediaReference, TimeRange, Timeline, Track, TrackKind,
};
use crate::core::{fs, is_valid_rate, CoreError, CoreResult, FrameRate, DEFAULT_FPS};

// =============================================================================
// Strategy Selection
// =============================================================================

/// The two ways an edited document becomes a timeline
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RebuildStrategy {
    /// Build a new timeline; all-or-nothing
    #[default]
    FromScratch,
    /// Apply the document to a copy of a reference timeline; per-clip failures are skipped
    PatchReference,
}

// =============================================================================
// Options
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RebuildOptions {
    pub audio: AudioSynthesisOptions,
    pub unflatten: UnflattenRules,
}

impl RebuildOptions {
    pub fn with_audio(mut self, audio: AudioSynthesisOptions) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_unflatten(mut self, rules: UnflattenRules) -> Self {
        self.unflatten = rules;
        self
    }
}

// =============================================================================
// Rebuilder
// =============================================================================

/// Strict "from scratch" rebuilder
pub struct Rebuilder<'a> {
    options: RebuildOptions,
    project: &'a dyn ProjectMetadataSource,
}

impl<'a> Rebuilder<'a> {
    pub fn new(options: RebuildOptions, project: &'a dyn ProjectMetadataSource) -> Self {
        Self { options, project }
    }

    /// Rebuilds a timeline from raw document JSON.
    pub fn rebuild(&self, value: &Value) -> CoreResult<Timeline> {
        self.rebuild_document(TimelineDocument::from_value(value)?)
    }

    /// Rebuilds a timeline from a decoded document.
    pub fn rebuild_document(&self, mut document: TimelineDocument) -> CoreResult<Timeline> {
        if document.timeline.name.trim().is_empty() {
            let title = self
                .project
                .project_title()
                .unwrap_or_else(|| FALLBACK_TIMELINE_NAME.to_string());
            tracing::info!(name = %title, "Timeline name backfilled from project data");
            document.timeline.name = title;
        }

        let added = synthesize_audio_tracks(&mut document, &self.options.audio);
        if added > 0 {
            tracing::info!(added, "No audio tracks in document; generated matching audio tracks");
        }

        // track_index is authoritative, not array position.
        document.tracks.sort_by_key(|t| t.track_index);

        let document_fps = Some(document.timeline.fps).filter(|r| is_valid_rate(*r));
        let mut timeline = Timeline::new(document.timeline.name.clone());
        timeline.metadata = document.timeline.metadata.clone();
        for (position, entry) in document.tracks.iter().enumerate() {
            timeline
                .tracks
                .push(self.build_track(entry, position, document_fps)?);
        }

        tracing::debug!(
            timeline = %timeline.name,
            tracks = timeline.tracks.len(),
            clips = timeline.clip_count(),
            "Rebuilt timeline from scratch"
        );
        Ok(timeline)
    }

    fn build_track(
        &self,
        entry: &TrackEntry,
        position: usize,
        document_fps: Option<FrameRate>,
    ) -> CoreResult<Track> {
        let name = if entry.name.is_empty() {
            format!("Track {}", position + 1)
        } else {
            entry.name.clone()
        };
        let mut track = Track::new(name, TrackKind::parse(&entry.kind)).with_index(entry.track_index);
        track.metadata = entry.metadata.clone();

        let gap_fps = entry
            .first_clip_fps()
            .filter(|r| is_valid_rate(*r))
            .or(document_fps)
            .unwrap_or(DEFAULT_FPS);

        for (i, item) in entry.clips.iter().enumerate() {
            let location = format!("tracks[{}].clips[{i}]", entry.track_index);
            match item {
                ItemEntry::Gap(gap) => {
                    if let Some(gap) = build_gap(gap, gap_fps) {
                        track.items.push(Item::Gap(gap));
                    }
                }
                ItemEntry::Clip(clip) => {
                    track
                        .items
                        .push(Item::Clip(build_clip(clip, &self.options.unflatten, &location)?));
                }
            }
        }
        Ok(track)
    }
}

// =============================================================================
// Item Builders
// =============================================================================

/// Zero-length gaps are dropped
pub(crate) fn build_gap(entry: &GapEntry, fps: FrameRate) -> Option<Gap> {
    let frames = entry.source_range.duration_frames;
    if frames <= 0 {
        tracing::debug!(clip_index = entry.clip_index, frames, "Skipping empty gap");
        return None;
    }
    let name = if entry.name.is_empty() {
        "Gap".to_string()
    } else {
        entry.name.clone()
    };
    Some(Gap::new(name, frames, fps))
}

pub(crate) fn build_clip(
    entry: &ClipEntry,
    rules: &UnflattenRules,
    location: &str,
) -> CoreResult<Clip> {
    let name = if entry.name.is_empty() {
        "Clip".to_string()
    } else {
        entry.name.clone()
    };
    let mut clip = Clip::new(name);
    if let Some(range) = &entry.source_range {
        clip.source_range = Some(checked_range(range, &format!("{location}.source_range"), false)?);
    }
    if let Some(media) = &entry.media_reference {
        clip.media_reference = Some(build_media(media, &format!("{location}.media_reference"))?);
    }
    clip.metadata = unflatten(&entry.metadata, rules);
    Ok(clip)
}

pub(crate) fn build_media(entry: &MediaReferenceEntry, location: &str) -> CoreResult<MediaReference> {
    let mut media = if entry.reference_type == "MissingReference" {
        MediaReference::missing()
    } else {
        MediaReference::external(entry.target_url.clone().unwrap_or_default())
    };
    if let Some(range) = &entry.available_range {
        media.available_range = Some(checked_range(
            range,
            &format!("{location}.available_range"),
            true,
        )?);
    }
    Ok(media)
}

/// Converts a frame range, enforcing a usable rate and a positive duration.
pub(crate) fn checked_range(
    range: &FrameRange,
    location: &str,
    allow_empty: bool,
) -> CoreResult<TimeRange> {
    if !is_valid_rate(range.fps) {
        return Err(CoreError::invalid_range(
            location,
            format!("fps must be positive, got {}", range.fps),
        ));
    }
    let too_short = if allow_empty {
        range.duration_frames < 0
    } else {
        range.duration_frames <= 0
    };
    if too_short {
        return Err(CoreError::InvalidDuration {
            location: location.to_string(),
            frames: range.duration_frames,
        });
    }
    Ok(TimeRange::from_frames(
        range.start_frame,
        range.duration_frames,
        range.fps,
    ))
}

// =============================================================================
// File Conversion
// =============================================================================

/// Rebuilds `input` and writes `<stem>.otio` next to it unless `output` is given.
pub fn convert_document_file(
    rebuilder: &Rebuilder<'_>,
    input: &Path,
    output: Option<&Path>,
) -> CoreResult<(PathBuf, Timeline)> {
    let value = read_document_value(input)?;
    let timeline = rebuilder.rebuild(&value)?;
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| fs::with_extension(input, "otio"));
    if output.exists() {
        tracing::info!(path = %output.display(), "Overwriting existing OTIO file");
    }
    write_timeline_file(&output, &timeline)?;
    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        timeline = %timeline.name,
        tracks = timeline.tracks.len(),
        clips = timeline.clip_count(),
        "Rebuilt OTIO from JSON"
    );
    Ok((output, timeline))
}
