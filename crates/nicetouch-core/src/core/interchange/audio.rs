//! Audio track synthesis for video-only documents.
//!
//! Upstream planners often emit only video tracks. When a document has no
//! audio track at all, each video track whose clips point at files that
//! normally carry sound gets a companion audio track. Companion clips mirror
//! the video clips' ranges and share a Resolve link group id so the NLE can
//! re-link picture and sound on import.
//!
//! The decision is a filename-extension guess, so the whole step sits behind
//! [`AudioSynthesisOptions::enabled`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::document::{ClipEntry, GapEntry, ItemEntry, TimelineDocument, TrackEntry};

/// Flat metadata key carrying the video/audio link group
pub const LINK_GROUP_KEY: &str = "Resolve_OTIO_Link Group ID";

/// Flat metadata key describing the stereo channel mapping
pub const CHANNELS_KEY: &str = "Resolve_OTIO_Channels";

const STEREO_CHANNELS: &str =
    "[{'Source Channel ID': 0, 'Source Track ID': 0}, {'Source Channel ID': 1, 'Source Track ID': 0}]";

/// Policy knob for audio synthesis
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSynthesisOptions {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Lowercase extensions (with dot) treated as audio-bearing
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

pub fn default_video_extensions() -> Vec<String> {
    [".mp4", ".mov", ".avi", ".mkv", ".mxf", ".mts", ".m2ts"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for AudioSynthesisOptions {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            video_extensions: default_video_extensions(),
        }
    }
}

impl AudioSynthesisOptions {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// True if the locator looks like a file with a sound stream
    pub fn carries_audio(&self, target_url: &str) -> bool {
        let lower = target_url.to_ascii_lowercase();
        self.video_extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
    }
}

/// Adds companion audio tracks to a document with no audio tracks.
///
/// Returns the number of tracks added. Does nothing if synthesis is disabled,
/// if any audio track already exists, or if no video clip qualifies. Summary
/// counters are refreshed when tracks are added.
pub fn synthesize_audio_tracks(
    document: &mut TimelineDocument,
    options: &AudioSynthesisOptions,
) -> usize {
    if !options.enabled || document.has_audio_track() {
        return 0;
    }

    let video_positions: Vec<usize> = document
        .tracks
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_video())
        .map(|(pos, _)| pos)
        .collect();
    if video_positions.is_empty() {
        return 0;
    }

    let mut next_index = document.next_track_index();
    let mut added = Vec::new();
    for pos in video_positions {
        let number = added.len() + 1;
        let Some(audio) = companion_track(&mut document.tracks[pos], next_index, number, options)
        else {
            continue;
        };
        tracing::info!(
            video_track = %document.tracks[pos].name,
            audio_track = %audio.name,
            audio_clips = audio.clip_count(),
            "Synthesized companion audio track"
        );
        added.push(audio);
        next_index = next_index.saturating_add(1);
    }

    let count = added.len();
    if count > 0 {
        document.tracks.extend(added);
        document.refresh_counts();
    }
    count
}

fn companion_track(
    video: &mut TrackEntry,
    track_index: usize,
    number: usize,
    options: &AudioSynthesisOptions,
) -> Option<TrackEntry> {
    let mut items = Vec::new();
    let mut linked = 0;

    for (i, item) in video.clips.iter_mut().enumerate() {
        let clip_index = items.len();
        match item {
            ItemEntry::Gap(gap) => items.push(ItemEntry::Gap(GapEntry::new(
                clip_index,
                gap.name.clone(),
                gap.source_range.duration_frames,
            ))),
            ItemEntry::Clip(clip) => {
                let sound = clip.target_url().is_some_and(|url| options.carries_audio(url));
                if sound {
                    let link_group = link_group_of(clip, i + 1);
                    clip.metadata.insert(LINK_GROUP_KEY.into(), link_group.clone());
                    items.push(ItemEntry::Clip(audio_twin(clip, clip_index, link_group)));
                    linked += 1;
                } else {
                    // Hold the slot so later audio stays in sync with picture.
                    let duration = clip.source_range.as_ref().map(|r| r.duration_frames);
                    if let Some(frames) = duration.filter(|f| *f > 0) {
                        items.push(ItemEntry::Gap(GapEntry::new(clip_index, "Gap", frames)));
                    }
                }
            }
        }
    }

    if linked == 0 {
        return None;
    }
    while items.last().is_some_and(ItemEntry::is_gap) {
        items.pop();
    }

    Some(TrackEntry {
        track_index,
        name: format!("Audio {number}"),
        kind: "Audio".to_string(),
        clips: items,
        metadata: stereo_track_metadata(),
    })
}

fn link_group_of(clip: &ClipEntry, fallback: usize) -> Value {
    clip.metadata
        .get(LINK_GROUP_KEY)
        .filter(|v| !v.is_null())
        .cloned()
        .unwrap_or_else(|| Value::from(fallback))
}

fn audio_twin(video: &ClipEntry, clip_index: usize, link_group: Value) -> ClipEntry {
    let mut audio = video.clone();
    audio.clip_index = clip_index;
    audio
        .metadata
        .insert(CHANNELS_KEY.into(), Value::String(STEREO_CHANNELS.into()));
    audio.metadata.insert(LINK_GROUP_KEY.into(), link_group);
    audio
}

fn stereo_track_metadata() -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert(
        "Resolve_OTIO".into(),
        json!({"Audio Type": "Stereo", "Locked": false, "SoloOn": false}),
    );
    metadata
}
