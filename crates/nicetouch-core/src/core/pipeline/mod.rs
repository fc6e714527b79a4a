//! Pipeline Module
//!
//! Staging directories, the workflow state machine and the stage runner
//! that moves timelines between the NLE and the JSON document format.

pub mod observer;
pub mod staging;
pub mod state;
pub mod workflow;

pub use observer::{ChannelObserver, LogObserver, NullObserver, StepEvent, StepObserver};
pub use staging::{DirectoryStatus, PipelineStatus, StagedFile, StagingArea};
pub use state::{Stage, WorkflowState};
pub use workflow::{StageReport, Workflow, WorkflowStatus};
