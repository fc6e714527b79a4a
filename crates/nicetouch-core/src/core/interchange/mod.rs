//! Interchange Module
//!
//! Conversion between the timeline model and the flat JSON document handed to
//! the external edit planner.

pub mod audio;
pub mod document;
pub mod export;
pub mod metadata;
pub mod patch;
pub mod project;
pub mod rebuild;

pub use audio::{synthesize_audio_tracks, AudioSynthesisOptions};
pub use document::{validate_shape, TimelineDocument};
pub use export::{export_file, export_timeline, export_value};
pub use metadata::{MetadataWritePolicy, UnflattenRules};
pub use patch::{patch_file, PatchOptions, PatchOutcome, Patcher};
pub use project::{NoProjectMetadata, ProjectDataFile, ProjectMetadataSource};
pub use rebuild::{convert_document_file, RebuildOptions, RebuildStrategy, Rebuilder};
