//! Project metadata lookup used to name untitled timelines.

use std::path::{Path, PathBuf};

use serde_json::Value;

/// Name given to a rebuilt timeline when neither the document nor the project names it
pub const FALLBACK_TIMELINE_NAME: &str = "Timeline";

/// Supplies project-level values to the rebuilder
pub trait ProjectMetadataSource: Send + Sync {
    /// Title of the current project, if known
    fn project_title(&self) -> Option<String>;
}

/// Source that knows nothing; untitled timelines get the fallback name
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProjectMetadata;

impl ProjectMetadataSource for NoProjectMetadata {
    fn project_title(&self) -> Option<String> {
        None
    }
}

/// Reads `projectTitle` from the app's `projectdata.json`.
///
/// A missing or unreadable file is not an error; it just yields no title.
#[derive(Debug, Clone)]
pub struct ProjectDataFile {
    path: PathBuf,
}

impl ProjectDataFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProjectMetadataSource for ProjectDataFile {
    fn project_title(&self) -> Option<String> {
        if !self.path.exists() {
            tracing::warn!(path = %self.path.display(), "Project data not found");
            return None;
        }
        let value: Value = match crate::core::fs::read_json(&self.path) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Could not load project data");
                return None;
            }
        };
        value
            .get("projectTitle")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map(str::to_string)
    }
}
