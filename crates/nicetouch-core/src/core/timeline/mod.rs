//! Timeline Module
//!
//! In-memory timeline tree and its OTIO JSON encoding.

pub mod models;
pub mod otio;

pub use models::*;
pub use otio::{
    read_timeline_file, read_timeline_str, timeline_from_value, timeline_to_value,
    write_timeline_file, write_timeline_string,
};
