//! End-to-end properties of the OTIO <-> JSON interchange.

use serde_json::{json, Map, Value};
use tempfile::TempDir;

use nicetouch_core::core::interchange::{
    export_file, export_timeline, NoProjectMetadata, PatchOptions, Patcher, RebuildOptions,
    Rebuilder,
};
use nicetouch_core::core::timeline::{
    read_timeline_file, write_timeline_file, Clip, Gap, Item, MediaReference, TimeRange, Timeline,
    Track, TrackKind,
};
use nicetouch_core::CoreError;

fn metadata(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn clip(name: &str, url: &str, start: i64, duration: i64, meta: Value) -> Item {
    let mut clip = Clip::new(name)
        .with_source_range(TimeRange::from_frames(start, duration, 24.0))
        .with_media_reference(
            MediaReference::external(url).with_available_range(TimeRange::from_frames(0, 2400, 24.0)),
        );
    clip.metadata = metadata(meta);
    Item::Clip(clip)
}

/// Video plus audio, flat metadata, one gap
fn edit() -> Timeline {
    let mut video = Track::new("V1", TrackKind::Video);
    video.items.push(clip("Intro", "/media/intro.mov", 0, 100, json!({"speaker": "Host", "take": 3})));
    video.items.push(Item::Gap(Gap::new("", 48, 24.0)));
    video.items.push(clip("Answer", "/media/answer.mov", 240, 60, json!({"speaker": "Guest"})));

    let mut audio = Track::new("A1", TrackKind::Audio);
    audio.items.push(clip("Intro", "/media/intro.mov", 0, 100, json!({})));

    let mut timeline = Timeline::new("Interview");
    timeline.tracks.push(video);
    timeline.tracks.push(audio);
    timeline
}

fn rebuild(value: &Value) -> Result<Timeline, CoreError> {
    Rebuilder::new(RebuildOptions::default(), &NoProjectMetadata).rebuild(value)
}

fn as_value(timeline: &Timeline) -> Value {
    serde_json::to_value(export_timeline(timeline)).unwrap()
}

#[test]
fn round_trip_preserves_structure_ranges_and_media() {
    let original = edit();
    let rebuilt = rebuild(&as_value(&original)).unwrap();

    assert_eq!(rebuilt.name, original.name);
    assert_eq!(rebuilt.tracks.len(), original.tracks.len());
    for (before, after) in original.tracks.iter().zip(&rebuilt.tracks) {
        assert_eq!(before.kind, after.kind);
        assert_eq!(before.items.len(), after.items.len());
        for (a, b) in before.items.iter().zip(&after.items) {
            match (a, b) {
                (Item::Clip(a), Item::Clip(b)) => {
                    assert_eq!(a.name, b.name);
                    assert_eq!(
                        a.source_range.map(|r| (r.start_frame(), r.duration_frames(), r.rate())),
                        b.source_range.map(|r| (r.start_frame(), r.duration_frames(), r.rate()))
                    );
                    let (ma, mb) = (a.media_reference.as_ref().unwrap(), b.media_reference.as_ref().unwrap());
                    assert_eq!(ma.target_url(), mb.target_url());
                    assert_eq!(
                        ma.available_range.map(|r| (r.start_frame(), r.duration_frames())),
                        mb.available_range.map(|r| (r.start_frame(), r.duration_frames()))
                    );
                    assert_eq!(a.metadata, b.metadata);
                }
                (Item::Gap(a), Item::Gap(b)) => assert_eq!(a.duration_frames(), b.duration_frames()),
                other => panic!("item kinds differ: {other:?}"),
            }
        }
    }
}

#[test]
fn text_metadata_is_not_rebuilt() {
    let mut timeline = edit();
    if let Item::Clip(c) = &mut timeline.tracks[0].items[0] {
        c.metadata.insert("text".into(), json!("Welcome back to the show"));
    }

    let exported = as_value(&timeline);
    assert_eq!(exported["tracks"][0]["clips"][0]["metadata"]["text"], "Welcome back to the show");

    let rebuilt = rebuild(&exported).unwrap();
    let first = rebuilt.tracks[0].items[0].as_clip().unwrap();
    assert!(!first.metadata.contains_key("text"));
    assert_eq!(first.metadata["speaker"], "Host");
}

#[test]
fn exported_ranges_satisfy_end_frame_arithmetic() {
    let exported = as_value(&edit());
    for track in exported["tracks"].as_array().unwrap() {
        for entry in track["clips"].as_array().unwrap() {
            if entry["type"] == "gap" {
                continue;
            }
            for key in ["source_range", "/media_reference/available_range"] {
                let range = if key.starts_with('/') {
                    entry.pointer(key)
                } else {
                    entry.get(key)
                };
                let Some(range) = range.filter(|r| !r.is_null()) else {
                    continue;
                };
                let start = range["start_frame"].as_i64().unwrap();
                let duration = range["duration_frames"].as_i64().unwrap();
                assert_eq!(range["end_frame"].as_i64().unwrap(), start + duration - 1);
            }
        }
    }
}

#[test]
fn gap_is_exported_and_not_counted() {
    let exported = as_value(&edit());
    let gap = &exported["tracks"][0]["clips"][1];
    assert_eq!(gap["type"], "gap");
    assert_eq!(gap["source_range"]["duration_frames"], 48);
    assert_eq!(exported["summary"]["total_clips"], 3);
}

#[test]
fn patch_never_mutates_reference_and_skips_unknown_tracks() {
    let reference = edit();
    let before = reference.clone();
    let document = json!({
        "timeline": {"name": "Interview (tight)", "fps": 24.0},
        "tracks": [
            {"track_index": 0, "clips": [
                {"clip_index": 0, "name": "Intro (trim)", "source_range": {"start_frame": 10, "duration_frames": 80, "fps": 24.0}},
                {"clip_index": 9, "name": "Outro", "source_range": {"start_frame": 0, "duration_frames": 24, "fps": 24.0}}
            ]},
            {"track_index": 7, "clips": []}
        ],
        "summary": {}
    });

    let outcome = Patcher::new(PatchOptions::default())
        .patch(&reference, &document)
        .unwrap();

    assert_eq!(reference, before);
    assert_eq!(outcome.timeline.tracks.len(), reference.tracks.len());
    assert_eq!(outcome.skipped_tracks, 1);
    assert!(!outcome.warnings.is_empty());
    assert_eq!(outcome.timeline.name, "Interview (tight)");
    assert_eq!(outcome.timeline.tracks[0].clip_count(), 3);
}

#[test]
fn explicit_audio_tracks_block_more_synthesis() {
    let exported = as_value(&edit());
    let once = rebuild(&exported).unwrap();
    let twice = rebuild(&as_value(&once)).unwrap();

    let audio_tracks = |t: &Timeline| t.tracks.iter().filter(|t| t.kind.is_audio()).count();
    assert_eq!(audio_tracks(&once), 1);
    assert_eq!(audio_tracks(&twice), 1);
}

#[test]
fn video_only_document_gains_mirrored_audio_track() {
    let document = json!({
        "timeline": {"name": "Cut", "fps": 24.0, "metadata": {}},
        "tracks": [{
            "track_index": 0, "name": "Video 1", "kind": "Video", "metadata": {},
            "clips": [
                {"clip_index": 0, "name": "A", "metadata": {},
                 "source_range": {"start_frame": 0, "duration_frames": 100, "end_frame": 99, "fps": 24.0},
                 "media_reference": {"type": "ExternalReference", "target_url": "/m/a.mp4"}},
                {"clip_index": 1, "name": "B", "metadata": {},
                 "source_range": {"start_frame": 100, "duration_frames": 50, "end_frame": 149, "fps": 24.0},
                 "media_reference": {"type": "ExternalReference", "target_url": "/m/b.mp4"}}
            ]
        }],
        "summary": {"total_tracks": 1, "total_clips": 2, "timeline_duration_frames": 150}
    });

    let timeline = rebuild(&document).unwrap();
    assert_eq!(timeline.tracks.len(), 2);
    let audio = &timeline.tracks[1];
    assert!(audio.kind.is_audio());
    let ranges: Vec<(i64, i64)> = audio
        .clips()
        .filter_map(|c| c.source_range.map(|r| (r.start_frame(), r.end_frame_inclusive())))
        .collect();
    assert_eq!(ranges, vec![(0, 99), (100, 149)]);
}

#[test]
fn missing_tracks_key_fails_both_strategies() {
    let document = json!({"timeline": {"name": "Cut", "fps": 24.0}, "summary": {}});

    assert!(matches!(rebuild(&document), Err(CoreError::DocumentInvalid(_))));
    let patched = Patcher::new(PatchOptions::default()).patch(&edit(), &document);
    assert!(matches!(patched, Err(CoreError::DocumentInvalid(_))));
}

#[test]
fn files_round_trip_through_disk() {
    let dir = TempDir::new().unwrap();
    let otio = dir.path().join("interview.otio");
    write_timeline_file(&otio, &edit()).unwrap();

    let (json_path, document) = export_file(&otio, None).unwrap();
    assert_eq!(json_path, dir.path().join("interview.json"));
    assert_eq!(document.summary.total_tracks, 2);

    let reread = read_timeline_file(&otio).unwrap();
    assert_eq!(reread.clip_count(), 3);
}

#[test]
fn sparse_track_indices_survive_rebuild_and_export() {
    let document = json!({
        "timeline": {"name": "Cut", "fps": 24.0},
        "tracks": [
            {"track_index": 3, "name": "V4", "kind": "Video", "clips": []},
            {"track_index": 0, "name": "V1", "kind": "Video", "clips": [
                {"clip_index": 0, "name": "A",
                 "source_range": {"start_frame": 0, "duration_frames": 24, "fps": 24.0},
                 "media_reference": {"type": "ExternalReference", "target_url": "/m/a.mov"}}
            ]}
        ],
        "summary": {}
    });

    let indices = |value: &Value| -> Vec<(String, u64)> {
        value["tracks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| (t["name"].as_str().unwrap().to_string(), t["track_index"].as_u64().unwrap()))
            .collect()
    };
    let expected = vec![
        ("V1".to_string(), 0),
        ("V4".to_string(), 3),
        ("Audio 1".to_string(), 4),
    ];

    let exported = as_value(&rebuild(&document).unwrap());
    assert_eq!(indices(&exported), expected);

    let again = as_value(&rebuild(&exported).unwrap());
    assert_eq!(indices(&again), expected);
}

#[test]
fn extreme_start_frame_exports_without_overflow() {
    let mut timeline = edit();
    timeline.tracks[1].items[0] = clip("Far", "/media/far.mov", i64::MAX - 1, 100, json!({}));
    let exported = as_value(&timeline);
    let range = &exported["tracks"][1]["clips"][0]["source_range"];
    assert_eq!(range["end_frame"].as_i64(), Some(i64::MAX - 1));
}

#[test]
fn invalid_track_index_is_skipped_not_redirected() {
    let reference = edit();
    let document = json!({
        "timeline": {"name": "Interview", "fps": 24.0},
        "tracks": [{"track_index": -1, "name": "Hijacked", "clips": []}],
        "summary": {}
    });

    let outcome = Patcher::new(PatchOptions::default())
        .patch(&reference, &document)
        .unwrap();
    assert_eq!(outcome.skipped_tracks, 1);
    assert_eq!(outcome.timeline.tracks[0].name, "V1");
}
