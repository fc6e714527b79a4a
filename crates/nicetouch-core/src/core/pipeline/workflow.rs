//! Three-stage round trip through the NLE.
//!
//! 1. **Export**: the NLE writes the current timeline into the reference
//!    directory and a JSON twin is produced next to it.
//! 2. **Clear**: the edited directory is emptied for the next edit.
//! 3. **Import**: the newest edited JSON is rebuilt into OTIO and handed to
//!    the NLE as a new timeline.
//!
//! Each stage runs once per call and reports a [`StageReport`]; retrying is
//! up to the caller.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::core::interchange::document::read_document;
use crate::core::interchange::{
    convert_document_file, export_file, patch_file, Patcher, ProjectDataFile, RebuildStrategy,
    Rebuilder, TimelineDocument,
};
use crate::core::resolve::{sanitize_filename, ExportRequest, ImportRequest, NleBridge};
use crate::core::settings::PipelineConfig;
use crate::core::{fs as core_fs, CoreError, CoreResult};

use super::observer::StepObserver;
use super::staging::{clear_dir, newest_with_extension, PipelineStatus, StagingArea};
use super::state::{Stage, WorkflowState};

// =============================================================================
// Reports
// =============================================================================

/// Outcome of one stage call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub stage: Stage,
    pub success: bool,
    pub message: String,
    /// Narrated steps in order
    pub steps: Vec<String>,
    /// Files produced by the stage
    pub artifacts: Vec<PathBuf>,
}

/// Current state plus directory snapshot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    pub state: WorkflowState,
    pub staging: PipelineStatus,
}

struct StepLog {
    observer: Arc<dyn StepObserver>,
    steps: Vec<String>,
}

impl StepLog {
    fn new(observer: Arc<dyn StepObserver>) -> Self {
        Self {
            observer,
            steps: Vec::new(),
        }
    }

    fn step(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.observer.on_step(&message);
        self.steps.push(message);
    }

    fn finish(self, stage: Stage, result: CoreResult<(String, Vec<PathBuf>)>) -> StageReport {
        match result {
            Ok((message, artifacts)) => StageReport {
                stage,
                success: true,
                message,
                steps: self.steps,
                artifacts,
            },
            Err(e) => StageReport {
                stage,
                success: false,
                message: e.to_string(),
                steps: self.steps,
                artifacts: Vec::new(),
            },
        }
    }
}

// =============================================================================
// Workflow
// =============================================================================

/// Drives the export / clear / import stages
pub struct Workflow {
    project_root: PathBuf,
    config: PipelineConfig,
    staging: StagingArea,
    project_data: ProjectDataFile,
    bridge: Arc<dyn NleBridge>,
    observer: Arc<dyn StepObserver>,
    state: WorkflowState,
}

impl Workflow {
    /// Creates a workflow; the initial state is inferred from the staging directories.
    pub fn new(
        project_root: &Path,
        config: &PipelineConfig,
        bridge: Arc<dyn NleBridge>,
        observer: Arc<dyn StepObserver>,
    ) -> Self {
        let staging = StagingArea::from_settings(&config.paths, project_root);
        let state = WorkflowState::infer(&staging.status());
        Self {
            project_root: project_root.to_path_buf(),
            config: config.clone(),
            project_data: ProjectDataFile::new(config.paths.project_data_file(project_root)),
            staging,
            bridge,
            observer,
            state,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    pub fn status(&self) -> WorkflowStatus {
        WorkflowStatus {
            state: self.state.clone(),
            staging: self.staging.status(),
        }
    }

    fn enter(&mut self, stage: Stage, next: WorkflowState) -> CoreResult<()> {
        self.state.transition(next).map_err(|e| {
            warn!("Cannot start {} stage: {}", stage, e);
            e
        })
    }

    fn settle(&mut self, stage: Stage, result: &CoreResult<(String, Vec<PathBuf>)>, done: WorkflowState) {
        let next = match result {
            Ok(_) => done,
            Err(e) => {
                if e.is_data_error() {
                    warn!("{} stage rejected its input document: {}", stage, e);
                } else {
                    warn!("{} stage failed: {}", stage, e);
                }
                WorkflowState::Failed {
                    stage,
                    reason: e.to_string(),
                }
            }
        };
        if let Err(e) = self.state.transition(next) {
            warn!("Workflow state not updated: {}", e);
        }
    }

    // =========================================================================
    // Export
    // =========================================================================

    /// Exports a timeline from the NLE into the reference directory.
    ///
    /// `timeline_name` selects the timeline; the NLE's current one is used when None.
    pub async fn export_stage(&mut self, timeline_name: Option<&str>) -> StageReport {
        let mut log = StepLog::new(self.observer.clone());
        if let Err(e) = self.enter(Stage::Export, WorkflowState::Exporting) {
            return log.finish(Stage::Export, Err(e));
        }

        let result = self.run_export(timeline_name, &mut log).await;
        self.settle(Stage::Export, &result, WorkflowState::AwaitingExternalEdit);
        log.finish(Stage::Export, result)
    }

    async fn run_export(
        &self,
        timeline_name: Option<&str>,
        log: &mut StepLog,
    ) -> CoreResult<(String, Vec<PathBuf>)> {
        let reference_dir = &self.staging.reference_dir;
        log.step(format!("Clearing reference directory {}", reference_dir.display()));
        let removed = clear_dir(reference_dir)?;
        if removed > 0 {
            info!(removed, "Cleared previous reference files");
        }

        let timeline_name = timeline_name.map(str::trim).filter(|n| !n.is_empty());
        let stem = sanitize_filename(timeline_name.unwrap_or(&self.config.export.fallback_name));
        let output = reference_dir.join(format!("{stem}.otio"));

        let mut request = ExportRequest::new(&output);
        if let Some(name) = timeline_name {
            request = request.with_timeline_name(name);
        }
        log.step(format!(
            "Exporting {} from the NLE via {} bridge",
            timeline_name.unwrap_or("current timeline"),
            self.bridge.name()
        ));
        if !self.bridge.export_timeline(&request).await? {
            return Err(CoreError::ExportFailed("NLE reported export failure".into()));
        }

        let otio_path = if output.is_file() {
            output
        } else {
            newest_with_extension(reference_dir, "otio").map_err(|_| {
                CoreError::ExportFailed(format!("No OTIO file was written to {}", reference_dir.display()))
            })?
        };

        log.step("Verifying exported file");
        let head = core_fs::read_head(&otio_path, self.config.export.header_sniff_bytes)?;
        if !(head.contains("OTIO_SCHEMA") || head.contains("Timeline")) {
            return Err(CoreError::ExportFailed(format!(
                "{} does not look like an OTIO timeline",
                otio_path.display()
            )));
        }

        log.step("Converting OTIO to JSON");
        let (json_path, document) = export_file(&otio_path, None)?;
        let message = format!(
            "Exported '{}': {} tracks, {} clips, {} frames",
            document.timeline.name,
            document.summary.total_tracks,
            document.summary.total_clips,
            document.summary.timeline_duration_frames
        );
        log.step(message.clone());
        Ok((message, vec![otio_path, json_path]))
    }

    // =========================================================================
    // Clear
    // =========================================================================

    /// Empties the edited directory. The workflow state is left as is on success.
    pub fn clear_stage(&mut self) -> StageReport {
        let mut log = StepLog::new(self.observer.clone());
        let edited_dir = self.staging.edited_dir.clone();
        log.step(format!("Clearing edited directory {}", edited_dir.display()));

        let result = clear_dir(&edited_dir)
            .map(|removed| (format!("Removed {removed} file(s) from edited directory"), Vec::new()));
        if let Err(e) = &result {
            warn!("clear stage failed: {}", e);
            self.state = WorkflowState::Failed {
                stage: Stage::Clear,
                reason: e.to_string(),
            };
        }
        log.finish(Stage::Clear, result)
    }

    // =========================================================================
    // Import
    // =========================================================================

    /// Rebuilds the newest edited JSON and imports it into the NLE.
    ///
    /// `timeline_name` defaults to the JSON file stem; `import_source_clips`
    /// defaults to the configured value.
    pub async fn import_stage(
        &mut self,
        timeline_name: Option<&str>,
        import_source_clips: Option<bool>,
    ) -> StageReport {
        let mut log = StepLog::new(self.observer.clone());
        if let Err(e) = self.enter(Stage::Import, WorkflowState::Importing) {
            return log.finish(Stage::Import, Err(e));
        }

        let result = self
            .run_import(timeline_name, import_source_clips, &mut log)
            .await;
        self.settle(Stage::Import, &result, WorkflowState::Idle);
        log.finish(Stage::Import, result)
    }

    async fn run_import(
        &self,
        timeline_name: Option<&str>,
        import_source_clips: Option<bool>,
        log: &mut StepLog,
    ) -> CoreResult<(String, Vec<PathBuf>)> {
        let edited_dir = &self.staging.edited_dir;
        log.step(format!("Locating edited JSON in {}", edited_dir.display()));
        let json_path = newest_with_extension(edited_dir, "json")?;
        let stem = json_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.config.export.fallback_name.clone());
        let otio_path = edited_dir.join(format!("{stem}.otio"));

        match self.config.import.strategy {
            RebuildStrategy::FromScratch => {
                log.step(format!("Rebuilding timeline from {}", json_path.display()));
                let rebuilder = Rebuilder::new(self.config.rebuild_options(), &self.project_data);
                convert_document_file(&rebuilder, &json_path, Some(&otio_path))?;
            }
            RebuildStrategy::PatchReference => {
                let reference = newest_with_extension(&self.staging.reference_dir, "otio")?;
                log.step(format!(
                    "Patching reference {} with {}",
                    reference.display(),
                    json_path.display()
                ));
                let patcher = Patcher::new(self.config.patch_options());
                let outcome = patch_file(&patcher, &reference, &json_path, &otio_path)?;
                for warning in &outcome.warnings {
                    warn!("Patch: {}", warning);
                }
                if !outcome.is_clean() {
                    log.step(format!("Patch finished with {} warning(s)", outcome.warnings.len()));
                }
            }
        }

        let name = timeline_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| stem.clone());
        let with_source_clips = import_source_clips.unwrap_or(self.config.import.import_source_clips);
        let request = ImportRequest::new(&otio_path, &name)
            .with_source_clips(with_source_clips)
            .with_source_clips_path(
                self.config
                    .import
                    .source_clips_path
                    .as_ref()
                    .map(|p| self.project_root.join(p)),
            )
            .with_source_clips_folders(self.config.import.source_clips_folders.clone());

        log.step(format!("Importing '{}' into the NLE via {} bridge", name, self.bridge.name()));
        let mut imported = self.bridge.import_timeline(&request).await?;
        if !imported && !with_source_clips && self.config.import.fallback_to_source_clips {
            log.step("Import failed; retrying with source clips");
            imported = self
                .bridge
                .import_timeline(&request.clone().with_source_clips(true))
                .await?;
        }
        if !imported {
            return Err(CoreError::ImportFailed(format!(
                "NLE rejected {}",
                otio_path.display()
            )));
        }

        let message = format!("Imported '{name}' from {}", otio_path.display());
        log.step(message.clone());
        Ok((message, vec![otio_path]))
    }

    // =========================================================================
    // Staged Documents
    // =========================================================================

    /// The newest JSON document in the reference directory
    pub fn reference_json(&self) -> CoreResult<TimelineDocument> {
        read_document(&newest_with_extension(&self.staging.reference_dir, "json")?)
    }

    /// The newest JSON document in the edited directory
    pub fn edited_json(&self) -> CoreResult<TimelineDocument> {
        read_document(&newest_with_extension(&self.staging.edited_dir, "json")?)
    }

    /// Copies the reference JSON into the edited directory as `<stem>_<unix-ts>.json`.
    pub fn copy_reference_to_edited(&self) -> CoreResult<PathBuf> {
        let source = newest_with_extension(&self.staging.reference_dir, "json")?;
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.config.export.fallback_name.clone());
        let target = self
            .staging
            .edited_dir
            .join(format!("{stem}_{}.json", chrono::Utc::now().timestamp()));

        std::fs::create_dir_all(&self.staging.edited_dir)?;
        std::fs::copy(&source, &target)?;
        info!(from = %source.display(), to = %target.display(), "Copied reference JSON for editing");
        Ok(target)
    }
}
