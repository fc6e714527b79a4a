//! Command handlers.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nicetouch_core::core::interchange::document::{read_document, ItemEntry};
use nicetouch_core::core::interchange::export::summary_fields;
use nicetouch_core::core::interchange::{
    convert_document_file, export_file, patch_file, AudioSynthesisOptions, Patcher,
    ProjectDataFile, Rebuilder,
};
use nicetouch_core::core::pipeline::{LogObserver, StageReport, Workflow};
use nicetouch_core::core::resolve::ScriptBridge;
use nicetouch_core::core::settings::PipelineConfig;

/// Everything a command needs from the global flags
pub struct AppContext {
    pub project_root: PathBuf,
    pub config: PipelineConfig,
}

impl AppContext {
    fn workflow(&self) -> Workflow {
        let bridge = ScriptBridge::from_settings(&self.config.bridge, &self.project_root);
        Workflow::new(
            &self.project_root,
            &self.config,
            Arc::new(bridge),
            Arc::new(LogObserver),
        )
    }
}

// =============================================================================
// Conversion
// =============================================================================

pub fn to_json(input: &Path, output: Option<&Path>) -> Result<bool> {
    let (path, document) = export_file(input, output)
        .with_context(|| format!("Failed to export {}", input.display()))?;
    println!(
        "Wrote {} ({} tracks, {} clips, {} frames)",
        path.display(),
        document.summary.total_tracks,
        document.summary.total_clips,
        document.summary.timeline_duration_frames
    );
    Ok(true)
}

pub fn to_otio(ctx: &AppContext, input: &Path, output: Option<&Path>, no_audio: bool) -> Result<bool> {
    let mut options = ctx.config.rebuild_options();
    if no_audio {
        options = options.with_audio(AudioSynthesisOptions::disabled());
    }
    let project = ProjectDataFile::new(ctx.config.paths.project_data_file(&ctx.project_root));
    let rebuilder = Rebuilder::new(options, &project);

    let (path, timeline) = convert_document_file(&rebuilder, input, output)
        .with_context(|| format!("Failed to rebuild {}", input.display()))?;
    println!(
        "Wrote {} ('{}', {} tracks, {} clips)",
        path.display(),
        timeline.name,
        timeline.tracks.len(),
        timeline.clip_count()
    );
    Ok(true)
}

pub fn patch(ctx: &AppContext, reference: &Path, document: &Path, output: Option<&Path>) -> Result<bool> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| document.with_extension("otio"));
    let patcher = Patcher::new(ctx.config.patch_options());
    let outcome = patch_file(&patcher, reference, document, &output)
        .with_context(|| format!("Failed to patch {}", reference.display()))?;

    for warning in &outcome.warnings {
        println!("warning: {warning}");
    }
    println!(
        "Wrote {} (modified {}, created {}, dropped {}, skipped tracks {}, skipped metadata writes {})",
        output.display(),
        outcome.modified,
        outcome.created,
        outcome.dropped,
        outcome.skipped_tracks,
        outcome.skipped_metadata_writes
    );
    Ok(true)
}

pub fn describe(document: &Path, as_json: bool) -> Result<bool> {
    let doc = read_document(document)
        .with_context(|| format!("Failed to read {}", document.display()))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary_fields(&doc.summary))?);
        return Ok(true);
    }

    println!(
        "{} @ {} fps: {} tracks, {} clips, {} frames",
        doc.timeline.name,
        doc.timeline.fps,
        doc.summary.total_tracks,
        doc.summary.total_clips,
        doc.summary.timeline_duration_frames
    );
    for track in &doc.tracks {
        println!("[{}] {} ({})", track.track_index, track.name, track.kind);
        for item in &track.clips {
            match item {
                ItemEntry::Gap(gap) => println!(
                    "  {:>3} gap  {} frames",
                    gap.clip_index, gap.source_range.duration_frames
                ),
                ItemEntry::Clip(clip) => {
                    let range = clip
                        .source_range
                        .as_ref()
                        .map(|r| format!("{}-{}", r.start_frame, r.end_frame))
                        .unwrap_or_else(|| "no range".to_string());
                    println!("  {:>3} clip {} [{}]", clip.clip_index, clip.name, range);
                    let transcript = clip.transcript();
                    if let Some(text) = transcript.text {
                        let speaker = transcript.speaker.unwrap_or_else(|| "?".to_string());
                        println!("        {speaker}: {text}");
                    }
                }
            }
        }
    }
    Ok(true)
}

// =============================================================================
// Pipeline
// =============================================================================

fn print_report(report: &StageReport) -> bool {
    for artifact in &report.artifacts {
        println!("  -> {}", artifact.display());
    }
    if report.success {
        println!("{} stage succeeded: {}", report.stage, report.message);
    } else {
        eprintln!("{} stage failed: {}", report.stage, report.message);
    }
    report.success
}

pub async fn pipeline_export(ctx: &AppContext, timeline: Option<&str>) -> Result<bool> {
    let mut workflow = ctx.workflow();
    Ok(print_report(&workflow.export_stage(timeline).await))
}

pub fn pipeline_clear(ctx: &AppContext) -> Result<bool> {
    let mut workflow = ctx.workflow();
    Ok(print_report(&workflow.clear_stage()))
}

pub async fn pipeline_import(
    ctx: &AppContext,
    timeline: Option<&str>,
    import_source_clips: bool,
) -> Result<bool> {
    let mut workflow = ctx.workflow();
    let source_clips = import_source_clips.then_some(true);
    Ok(print_report(&workflow.import_stage(timeline, source_clips).await))
}

pub fn pipeline_status(ctx: &AppContext, as_json: bool) -> Result<bool> {
    let status = ctx.workflow().status();
    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(true);
    }

    println!("state: {}", status.state);
    for (label, dir) in [("reference", &status.staging.reference), ("edited", &status.staging.edited)] {
        if !dir.exists {
            println!("{label}: {} (missing)", dir.path.display());
            continue;
        }
        println!("{label}: {} ({} files)", dir.path.display(), dir.file_count);
        for file in &dir.files {
            let modified = file
                .modified
                .map(|m| m.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("  {:<40} {:>10} bytes  {}", file.name, file.size_bytes, modified);
        }
    }
    Ok(true)
}

pub fn pipeline_copy_ref(ctx: &AppContext) -> Result<bool> {
    let target = ctx
        .workflow()
        .copy_reference_to_edited()
        .context("Failed to copy reference JSON")?;
    println!("Copied reference JSON to {}", target.display());
    Ok(true)
}
