//! NLE Bridge Module
//!
//! How the pipeline asks the editing application to export and import
//! OTIO timelines.

pub mod bridge;
pub mod naming;
pub mod script;

pub use bridge::{ExportRequest, ImportRequest, NleBridge};
pub use naming::sanitize_filename;
pub use script::ScriptBridge;
