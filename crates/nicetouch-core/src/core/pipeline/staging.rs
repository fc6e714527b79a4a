//! Staging directories shared with the NLE.
//!
//! The reference directory holds what the NLE exported; the edited directory
//! holds what goes back. Stages find their inputs by extension and recency
//! only, so a stray extra file is picked over silently except for a warning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::core::settings::PathSettings;
use crate::core::{CoreError, CoreResult};

/// The two staging directories
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagingArea {
    pub reference_dir: PathBuf,
    pub edited_dir: PathBuf,
}

/// One staged file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedFile {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Snapshot of one staging directory
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryStatus {
    pub path: PathBuf,
    pub exists: bool,
    pub file_count: usize,
    pub files: Vec<StagedFile>,
}

impl DirectoryStatus {
    pub fn has_extension(&self, extension: &str) -> bool {
        self.files.iter().any(|f| has_extension(&f.path, extension))
    }
}

/// Snapshot of both staging directories
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    pub reference: DirectoryStatus,
    pub edited: DirectoryStatus,
}

impl StagingArea {
    pub fn new(reference_dir: impl Into<PathBuf>, edited_dir: impl Into<PathBuf>) -> Self {
        Self {
            reference_dir: reference_dir.into(),
            edited_dir: edited_dir.into(),
        }
    }

    pub fn from_settings(paths: &PathSettings, project_root: &Path) -> Self {
        Self::new(paths.reference_dir(project_root), paths.edited_dir(project_root))
    }

    /// Creates both directories if missing
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        fs::create_dir_all(&self.reference_dir)?;
        fs::create_dir_all(&self.edited_dir)?;
        Ok(())
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            reference: directory_status(&self.reference_dir),
            edited: directory_status(&self.edited_dir),
        }
    }
}

/// Removes every regular file in `dir`, creating it if missing.
///
/// Subdirectories are left alone. Returns the number of files removed.
pub fn clear_dir(dir: &Path) -> CoreResult<usize> {
    fs::create_dir_all(dir)?;
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            fs::remove_file(&path)?;
            debug!("Removed staged file {:?}", path);
            removed += 1;
        }
    }
    Ok(removed)
}

/// Files in `dir` with `extension`, newest first.
pub fn list_with_extension(dir: &Path, extension: &str) -> CoreResult<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<(PathBuf, SystemTime)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || !has_extension(&path, extension) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((path, modified));
    }
    files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(files.into_iter().map(|(path, _)| path).collect())
}

/// The most recently modified file with `extension`; warns when there are several.
pub fn newest_with_extension(dir: &Path, extension: &str) -> CoreResult<PathBuf> {
    let files = list_with_extension(dir, extension)?;
    if files.len() > 1 {
        warn!(
            count = files.len(),
            "Multiple .{} files in {:?}; using the most recent",
            extension,
            dir
        );
    }
    files
        .into_iter()
        .next()
        .ok_or_else(|| CoreError::StagedFileMissing {
            dir: dir.display().to_string(),
            extension: format!(".{extension}"),
        })
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension.trim_start_matches('.')))
}

fn directory_status(dir: &Path) -> DirectoryStatus {
    let mut status = DirectoryStatus {
        path: dir.to_path_buf(),
        exists: dir.is_dir(),
        ..DirectoryStatus::default()
    };
    if !status.exists {
        return status;
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to read staging directory {:?}: {}", dir, e);
            return status;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        status.files.push(StagedFile {
            name: entry.file_name().to_string_lossy().into_owned(),
            path,
            size_bytes: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        });
    }
    status.files.sort_by(|a, b| a.name.cmp(&b.name));
    status.file_count = status.files.len();
    status
}
