//! NiceTouch Core Library
//!
//! Converts OpenTimelineIO timelines to a flat, editor-friendly JSON document
//! and back, and drives the export / edit / import round trip with an NLE.

pub mod core;

pub use crate::core::interchange::{
    export_file, export_timeline, patch_file, Patcher, RebuildStrategy, Rebuilder, TimelineDocument,
};
pub use crate::core::pipeline::{StageReport, Workflow, WorkflowState};
pub use crate::core::settings::{ConfigManager, PipelineConfig};
pub use crate::core::{CoreError, CoreResult};
