//! NLE Bridge Trait
//!
//! Defines the interface to the non-linear editor that produces and consumes
//! OTIO files. The workflow only ever talks to this trait, so the real
//! scripting bridge and test fakes are interchangeable.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::core::CoreResult;

// =============================================================================
// Requests
// =============================================================================

/// Ask the NLE to write a timeline out as OTIO
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportRequest {
    /// Where the OTIO file should be written
    pub output_path: PathBuf,
    /// Timeline to export; the NLE's current timeline when None
    pub timeline_name: Option<String>,
}

impl ExportRequest {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            timeline_name: None,
        }
    }

    pub fn with_timeline_name(mut self, name: impl Into<String>) -> Self {
        self.timeline_name = Some(name.into());
        self
    }
}

/// Ask the NLE to load an OTIO file as a new timeline
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportRequest {
    pub input_path: PathBuf,
    pub timeline_name: String,
    /// Also import the referenced media into the media pool
    pub import_source_clips: bool,
    pub source_clips_path: Option<PathBuf>,
    pub source_clips_folders: Vec<String>,
}

impl ImportRequest {
    pub fn new(input_path: impl Into<PathBuf>, timeline_name: impl Into<String>) -> Self {
        Self {
            input_path: input_path.into(),
            timeline_name: timeline_name.into(),
            import_source_clips: false,
            source_clips_path: None,
            source_clips_folders: Vec::new(),
        }
    }

    pub fn with_source_clips(mut self, enabled: bool) -> Self {
        self.import_source_clips = enabled;
        self
    }

    pub fn with_source_clips_path(mut self, path: Option<PathBuf>) -> Self {
        self.source_clips_path = path;
        self
    }

    pub fn with_source_clips_folders(mut self, folders: Vec<String>) -> Self {
        self.source_clips_folders = folders;
        self
    }
}

// =============================================================================
// Bridge Trait
// =============================================================================

/// Connection to a scriptable NLE
///
/// Both calls return `Ok(false)` when the NLE ran but reported failure, and
/// `Err` when the bridge itself could not be run.
#[async_trait]
pub trait NleBridge: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Writes a timeline to `request.output_path`
    async fn export_timeline(&self, request: &ExportRequest) -> CoreResult<bool>;

    /// Creates a timeline from `request.input_path`
    async fn import_timeline(&self, request: &ImportRequest) -> CoreResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let export = ExportRequest::new("/tmp/ref/cut.otio").with_timeline_name("Cut");
        assert_eq!(export.timeline_name.as_deref(), Some("Cut"));

        let import = ImportRequest::new("/tmp/edit/cut.otio", "cut")
            .with_source_clips(true)
            .with_source_clips_path(Some(PathBuf::from("/media")));
        assert!(import.import_source_clips);
        assert_eq!(import.source_clips_path, Some(PathBuf::from("/media")));
        assert!(import.source_clips_folders.is_empty());
    }
}
