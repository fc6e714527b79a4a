//! NiceTouch Core Engine
//!
//! Timeline interchange engine.
//! Handles OTIO reading and writing, the JSON document format, rebuild
//! strategies, the NLE bridge and the staging pipeline.

pub mod fs;
pub mod interchange;
pub mod pipeline;
pub mod process;
pub mod resolve;
pub mod settings;
pub mod timeline;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;
