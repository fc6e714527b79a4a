//! Workflow state machine.
//!
//! `Idle -> Exporting -> AwaitingExternalEdit -> Importing -> Idle`, with
//! `Failed` reachable from any state on a hard error. A failed stage can be
//! retried directly and a waiting workflow can be exported again.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::{CoreError, CoreResult};

use super::staging::PipelineStatus;

/// The three pipeline stages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Export,
    Clear,
    Import,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Export => "export",
            Stage::Clear => "clear",
            Stage::Import => "import",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the workflow currently is
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum WorkflowState {
    #[default]
    Idle,
    Exporting,
    AwaitingExternalEdit,
    Importing,
    Failed { stage: Stage, reason: String },
}

impl WorkflowState {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::Exporting => "exporting",
            WorkflowState::AwaitingExternalEdit => "awaitingExternalEdit",
            WorkflowState::Importing => "importing",
            WorkflowState::Failed { .. } => "failed",
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, WorkflowState::Exporting | WorkflowState::Importing)
    }

    pub fn can_transition_to(&self, next: &WorkflowState) -> bool {
        use WorkflowState::*;
        matches!(
            (self, next),
            (_, Failed { .. })
                | (Idle, Exporting)
                | (Exporting, AwaitingExternalEdit)
                | (AwaitingExternalEdit, Exporting)
                | (AwaitingExternalEdit, Importing)
                | (Importing, Idle)
                | (Failed { .. }, Idle)
                | (Failed { .. }, Exporting)
                | (Failed { .. }, Importing)
        )
    }

    /// Validates and performs a transition.
    pub fn transition(&mut self, next: WorkflowState) -> CoreResult<()> {
        if !self.can_transition_to(&next) {
            return Err(CoreError::InvalidTransition {
                from: self.name().to_string(),
                to: next.name().to_string(),
            });
        }
        tracing::debug!(from = self.name(), to = next.name(), "Workflow transition");
        *self = next;
        Ok(())
    }

    /// Best guess for a process that starts with staged files already on disk.
    ///
    /// Anything staged in either directory means an export already happened.
    pub fn infer(status: &PipelineStatus) -> WorkflowState {
        if status.reference.has_extension("otio") || status.edited.has_extension("json") {
            WorkflowState::AwaitingExternalEdit
        } else {
            WorkflowState::Idle
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Failed { stage, reason } => write!(f, "failed ({stage}): {reason}"),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::staging::{DirectoryStatus, StagedFile};
    use std::path::PathBuf;

    fn failed(stage: Stage) -> WorkflowState {
        WorkflowState::Failed {
            stage,
            reason: "boom".into(),
        }
    }

    #[test]
    fn test_happy_path_cycle() {
        let mut state = WorkflowState::default();
        state.transition(WorkflowState::Exporting).unwrap();
        state.transition(WorkflowState::AwaitingExternalEdit).unwrap();
        state.transition(WorkflowState::Importing).unwrap();
        state.transition(WorkflowState::Idle).unwrap();
        assert_eq!(state, WorkflowState::Idle);
    }

    #[test]
    fn test_rejects_skipping_export() {
        let mut state = WorkflowState::Idle;
        let err = state.transition(WorkflowState::Importing).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { ref from, ref to } if from == "idle" && to == "importing"));
        assert_eq!(state, WorkflowState::Idle);
    }

    #[test]
    fn test_failure_and_retry() {
        let mut state = WorkflowState::Exporting;
        state.transition(failed(Stage::Export)).unwrap();
        assert!(!state.is_busy());
        assert_eq!(state.to_string(), "failed (export): boom");
        state.transition(WorkflowState::Exporting).unwrap();

        let mut idle = WorkflowState::Idle;
        idle.transition(failed(Stage::Clear)).unwrap();
        assert!(idle.transition(WorkflowState::AwaitingExternalEdit).is_err());
    }

    #[test]
    fn test_infer_from_staged_files() {
        let mut status = PipelineStatus::default();
        assert_eq!(WorkflowState::infer(&status), WorkflowState::Idle);

        status.reference = DirectoryStatus {
            path: PathBuf::from("/ref"),
            exists: true,
            file_count: 1,
            files: vec![StagedFile {
                name: "cut.otio".into(),
                path: PathBuf::from("/ref/cut.otio"),
                size_bytes: 10,
                modified: None,
            }],
        };
        assert_eq!(WorkflowState::infer(&status), WorkflowState::AwaitingExternalEdit);
    }

    #[test]
    fn test_serializes_with_state_tag() {
        let json = serde_json::to_value(failed(Stage::Import)).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["stage"], "import");
    }
}
