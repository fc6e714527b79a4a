//! Timeline Model Definitions
//!
//! Defines Timeline, Track, Clip, Gap and the rational-time primitives they are
//! built from. Mirrors the subset of the OpenTimelineIO object model that the
//! interchange pipeline reads and writes. Fields this model does not interpret
//! are carried in `extra` so a reference timeline survives a patch round trip.

use std::fmt;

use serde_json::{Map, Value};

use crate::core::{is_valid_rate, to_frames, CoreError, CoreResult, FrameCount, FrameRate};

/// Free-form metadata mapping (string keys to arbitrary JSON values)
pub type Metadata = Map<String, Value>;

// =============================================================================
// Rational Time
// =============================================================================

/// A point or length in time expressed as `value` frames at `rate` frames per second
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RationalTime {
    pub value: f64,
    pub rate: FrameRate,
}

impl RationalTime {
    pub fn new(value: f64, rate: FrameRate) -> Self {
        Self { value, rate }
    }

    /// Creates a time from a whole frame number
    pub fn from_frames(frames: FrameCount, rate: FrameRate) -> Self {
        Self::new(frames as f64, rate)
    }

    /// Whole frames, truncated toward zero
    pub fn frames(&self) -> FrameCount {
        to_frames(self.value)
    }

    /// Expresses this time at another rate
    pub fn rescaled_to(&self, rate: FrameRate) -> Self {
        if self.rate == rate || !is_valid_rate(self.rate) {
            return Self::new(self.value, rate);
        }
        Self::new(self.value * rate / self.rate, rate)
    }

    /// Adds two times; mixed rates are summed at the higher rate.
    pub fn add(&self, other: &RationalTime) -> Self {
        if self.rate == other.rate {
            return Self::new(self.value + other.value, self.rate);
        }
        let rate = self.rate.max(other.rate);
        Self::new(
            self.rescaled_to(rate).value + other.rescaled_to(rate).value,
            rate,
        )
    }

    pub fn to_seconds(&self) -> f64 {
        if is_valid_rate(self.rate) {
            self.value / self.rate
        } else {
            0.0
        }
    }
}

// =============================================================================
// Time Range
// =============================================================================

/// A span of time: a start point and a duration
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeRange {
    pub start_time: RationalTime,
    pub duration: RationalTime,
}

impl TimeRange {
    pub fn new(start_time: RationalTime, duration: RationalTime) -> Self {
        Self {
            start_time,
            duration,
        }
    }

    /// Creates a range from whole frames sharing one rate
    pub fn from_frames(start: FrameCount, duration: FrameCount, rate: FrameRate) -> Self {
        Self::new(
            RationalTime::from_frames(start, rate),
            RationalTime::from_frames(duration, rate),
        )
    }

    /// Creates a range starting at zero, as gaps use
    pub fn of_duration(duration: FrameCount, rate: FrameRate) -> Self {
        Self::from_frames(0, duration, rate)
    }

    pub fn start_frame(&self) -> FrameCount {
        self.start_time.frames()
    }

    pub fn duration_frames(&self) -> FrameCount {
        self.duration.frames()
    }

    /// Last frame covered by the range (inclusive)
    pub fn end_frame_inclusive(&self) -> FrameCount {
        to_frames(self.start_time.value + self.duration.value - 1.0)
    }

    /// Rate of the start time, which is what the interchange document reports
    pub fn rate(&self) -> FrameRate {
        self.start_time.rate
    }
}

// =============================================================================
// Track Kind
// =============================================================================

/// Track kind; anything other than video or audio is preserved verbatim
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TrackKind {
    #[default]
    Video,
    Audio,
    Other(String),
}

impl TrackKind {
    /// Parses a kind label case-insensitively
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "video" => TrackKind::Video,
            "audio" => TrackKind::Audio,
            _ => TrackKind::Other(label.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TrackKind::Video => "Video",
            TrackKind::Audio => "Audio",
            TrackKind::Other(label) => label,
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, TrackKind::Audio)
    }

    pub fn is_video(&self) -> bool {
        matches!(self, TrackKind::Video)
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Media Reference
// =============================================================================

/// What a media reference points at
#[derive(Clone, Debug, PartialEq)]
pub enum MediaReferenceKind {
    /// A file or URL on disk
    External { target_url: String },
    /// Placeholder for media the NLE could not resolve
    Missing,
    /// Any other reference schema, kept with its full `OTIO_SCHEMA` tag
    Other { schema: String },
}

/// Media backing a clip
#[derive(Clone, Debug, PartialEq)]
pub struct MediaReference {
    pub kind: MediaReferenceKind,
    pub name: Option<String>,
    pub available_range: Option<TimeRange>,
    pub metadata: Metadata,
    pub extra: Metadata,
}

impl MediaReference {
    pub fn external(target_url: impl Into<String>) -> Self {
        Self {
            kind: MediaReferenceKind::External {
                target_url: target_url.into(),
            },
            name: None,
            available_range: None,
            metadata: Metadata::new(),
            extra: Metadata::new(),
        }
    }

    pub fn missing() -> Self {
        Self {
            kind: MediaReferenceKind::Missing,
            ..Self::external("")
        }
    }

    pub fn with_available_range(mut self, range: TimeRange) -> Self {
        self.available_range = Some(range);
        self
    }

    /// Schema name without version, e.g. `ExternalReference`
    pub fn schema_name(&self) -> &str {
        match &self.kind {
            MediaReferenceKind::External { .. } => "ExternalReference",
            MediaReferenceKind::Missing => "MissingReference",
            MediaReferenceKind::Other { schema } => {
                schema.split('.').next().unwrap_or(schema.as_str())
            }
        }
    }

    pub fn target_url(&self) -> Option<&str> {
        match &self.kind {
            MediaReferenceKind::External { target_url } if !target_url.is_empty() => {
                Some(target_url)
            }
            _ => None,
        }
    }

    /// True when this is a bare missing reference carrying no information
    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind, MediaReferenceKind::Missing)
            && self.name.as_deref().unwrap_or("").is_empty()
            && self.available_range.is_none()
            && self.metadata.is_empty()
    }
}

// =============================================================================
// Clip / Gap / Item
// =============================================================================

/// Key OTIO uses for a clip's primary media reference
pub const DEFAULT_MEDIA_KEY: &str = "DEFAULT_MEDIA";

/// A segment of media placed on a track
#[derive(Clone, Debug, PartialEq)]
pub struct Clip {
    pub name: String,
    pub source_range: Option<TimeRange>,
    pub media_reference: Option<MediaReference>,
    pub metadata: Metadata,
    /// Key of the active entry in OTIO's multi-reference map
    pub active_reference_key: String,
    /// Uninterpreted fields (effects, markers, enabled, alternate references, ...)
    pub extra: Metadata,
}

impl Clip {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_range: None,
            media_reference: None,
            metadata: Metadata::new(),
            active_reference_key: DEFAULT_MEDIA_KEY.to_string(),
            extra: Metadata::new(),
        }
    }

    pub fn with_source_range(mut self, range: TimeRange) -> Self {
        self.source_range = Some(range);
        self
    }

    pub fn with_media_reference(mut self, media: MediaReference) -> Self {
        self.media_reference = Some(media);
        self
    }

    /// Range the clip occupies: its source range, else the media's available range
    pub fn trimmed_range(&self) -> Option<TimeRange> {
        self.source_range.or_else(|| {
            self.media_reference
                .as_ref()
                .and_then(|m| m.available_range)
        })
    }
}

/// A deliberate empty interval on a track
#[derive(Clone, Debug, PartialEq)]
pub struct Gap {
    pub name: String,
    pub source_range: Option<TimeRange>,
    pub metadata: Metadata,
    pub extra: Metadata,
}

impl Gap {
    pub fn new(name: impl Into<String>, duration: FrameCount, rate: FrameRate) -> Self {
        Self {
            name: name.into(),
            source_range: Some(TimeRange::of_duration(duration, rate)),
            metadata: Metadata::new(),
            extra: Metadata::new(),
        }
    }

    pub fn duration_frames(&self) -> FrameCount {
        self.source_range.map(|r| r.duration_frames()).unwrap_or(0)
    }
}

/// A child of a track
#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    Clip(Clip),
    Gap(Gap),
    /// Transitions, nested stacks and other composables, carried through untouched
    Other(Value),
}

impl Item {
    pub fn as_clip(&self) -> Option<&Clip> {
        match self {
            Item::Clip(clip) => Some(clip),
            _ => None,
        }
    }

    /// True for the items the interchange document enumerates
    pub fn is_exportable(&self) -> bool {
        matches!(self, Item::Clip(_) | Item::Gap(_))
    }

    /// Length this item contributes to its track.
    ///
    /// Transitions and other composables are treated as zero length.
    pub fn duration(&self) -> CoreResult<Option<RationalTime>> {
        match self {
            Item::Clip(clip) => clip
                .trimmed_range()
                .map(|r| Some(r.duration))
                .ok_or_else(|| {
                    CoreError::DurationUnavailable(format!(
                        "clip {:?} has neither a source range nor an available range",
                        clip.name
                    ))
                }),
            Item::Gap(gap) => Ok(gap.source_range.map(|r| r.duration)),
            Item::Other(_) => Ok(None),
        }
    }
}

// =============================================================================
// Track
// =============================================================================

/// An ordered lane of clips and gaps
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub name: String,
    pub kind: TrackKind,
    pub items: Vec<Item>,
    pub metadata: Metadata,
    pub extra: Metadata,
    /// Interchange index this track was rebuilt from; not written to OTIO
    pub index: Option<usize>,
}

impl Track {
    pub fn new(name: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            name: name.into(),
            kind,
            items: Vec::new(),
            metadata: Metadata::new(),
            extra: Metadata::new(),
            index: None,
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn clips(&self) -> impl Iterator<Item = &Clip> {
        self.items.iter().filter_map(Item::as_clip)
    }

    pub fn clip_count(&self) -> usize {
        self.clips().count()
    }

    /// Positions in `items` of the clips and gaps, in order
    pub fn exportable_positions(&self) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.is_exportable())
            .map(|(pos, _)| pos)
            .collect()
    }

    /// Sum of the item durations
    pub fn duration(&self) -> CoreResult<RationalTime> {
        let mut total: Option<RationalTime> = None;
        for item in &self.items {
            if let Some(d) = item.duration()? {
                total = Some(match total {
                    Some(acc) => acc.add(&d),
                    None => d,
                });
            }
        }
        Ok(total.unwrap_or_else(|| RationalTime::new(0.0, crate::core::DEFAULT_FPS)))
    }
}

// =============================================================================
// Timeline
// =============================================================================

/// Root of the model
#[derive(Clone, Debug, PartialEq)]
pub struct Timeline {
    pub name: String,
    pub global_start_time: Option<RationalTime>,
    pub metadata: Metadata,
    pub tracks: Vec<Track>,
    /// Uninterpreted timeline fields
    pub extra: Metadata,
    /// Uninterpreted fields of the top-level stack
    pub stack_extra: Metadata,
}

impl Timeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            global_start_time: None,
            metadata: Metadata::new(),
            tracks: Vec::new(),
            extra: Metadata::new(),
            stack_extra: Metadata::new(),
        }
    }

    /// Length of the longest track
    pub fn duration(&self) -> CoreResult<RationalTime> {
        let mut longest: Option<RationalTime> = None;
        for track in &self.tracks {
            let d = track.duration()?;
            if longest.is_none_or(|l| d.to_seconds() > l.to_seconds()) {
                longest = Some(d);
            }
        }
        Ok(longest.unwrap_or_else(|| RationalTime::new(0.0, crate::core::DEFAULT_FPS)))
    }

    pub fn has_audio_track(&self) -> bool {
        self.tracks.iter().any(|t| t.kind.is_audio())
    }

    pub fn clip_count(&self) -> usize {
        self.tracks.iter().map(Track::clip_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(name: &str, start: FrameCount, duration: FrameCount) -> Item {
        Item::Clip(Clip::new(name).with_source_range(TimeRange::from_frames(start, duration, 24.0)))
    }

    #[test]
    fn test_end_frame_is_inclusive() {
        let range = TimeRange::from_frames(100, 50, 24.0);
        assert_eq!(range.start_frame(), 100);
        assert_eq!(range.duration_frames(), 50);
        assert_eq!(range.end_frame_inclusive(), 149);
    }

    #[test]
    fn test_mixed_rate_addition_uses_higher_rate() {
        let a = RationalTime::new(24.0, 24.0);
        let b = RationalTime::new(48.0, 48.0);
        let sum = a.add(&b);
        assert_eq!(sum.rate, 48.0);
        assert_eq!(sum.value, 96.0);
    }

    #[test]
    fn test_track_kind_parsing_is_case_insensitive() {
        assert_eq!(TrackKind::parse("video"), TrackKind::Video);
        assert_eq!(TrackKind::parse("AUDIO"), TrackKind::Audio);
        assert_eq!(
            TrackKind::parse("Subtitle"),
            TrackKind::Other("Subtitle".to_string())
        );
        assert_eq!(TrackKind::parse("Subtitle").as_str(), "Subtitle");
    }

    #[test]
    fn test_timeline_duration_is_longest_track() {
        let mut timeline = Timeline::new("Cut");
        let mut v1 = Track::new("V1", TrackKind::Video);
        v1.items.push(clip("a", 0, 100));
        v1.items.push(Item::Gap(Gap::new("g", 20, 24.0)));
        v1.items.push(clip("b", 100, 50));
        let mut v2 = Track::new("V2", TrackKind::Video);
        v2.items.push(clip("c", 0, 10));
        timeline.tracks = vec![v1, v2];

        assert_eq!(timeline.duration().unwrap().frames(), 170);
    }

    #[test]
    fn test_clip_without_range_fails_duration() {
        let mut timeline = Timeline::new("Cut");
        let mut track = Track::new("V1", TrackKind::Video);
        track.items.push(Item::Clip(Clip::new("loose")));
        timeline.tracks.push(track);

        assert!(matches!(
            timeline.duration(),
            Err(CoreError::DurationUnavailable(_))
        ));
    }

    #[test]
    fn test_clip_falls_back_to_available_range() {
        let clip = Clip::new("a").with_media_reference(
            MediaReference::external("/media/a.mov")
                .with_available_range(TimeRange::from_frames(0, 240, 24.0)),
        );
        assert_eq!(clip.trimmed_range().unwrap().duration_frames(), 240);
    }

    #[test]
    fn test_placeholder_reference() {
        assert!(MediaReference::missing().is_placeholder());
        assert!(!MediaReference::external("/a.mov").is_placeholder());
        assert_eq!(MediaReference::missing().schema_name(), "MissingReference");
    }
}
