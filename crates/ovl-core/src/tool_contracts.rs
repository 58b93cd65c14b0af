use crate::RunState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    #[default]
    Idle,
    Planning,
    Executing,
    Done,
    Failed,
}

impl ToolStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Unified run-state this status projects onto. `Idle` projects nothing.
    pub fn run_state(self) -> Option<RunState> {
        match self {
            Self::Idle => None,
            Self::Planning => Some(RunState::Planning),
            Self::Executing => Some(RunState::Executing),
            Self::Done => Some(RunState::Done),
            Self::Failed => Some(RunState::Error),
        }
    }

    pub fn is_finished(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanStepStatus {
    #[default]
    Pending,
    InProgress,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanStep {
    pub id: usize,
    pub description: String,
    #[serde(default)]
    pub status: PlanStepStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolPlan {
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub current_step: usize,
}

/// Tool-based session (protocol v2). Identified on the wire by `task` and
/// the absence of `original_command`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolSession {
    pub id: String,
    pub task: String,
    #[serde(default, alias = "status")]
    pub state: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<ToolPlan>,
    #[serde(default)]
    pub step_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_projects_onto_run_state() {
        assert_eq!(ToolStatus::Done.run_state(), Some(RunState::Done));
        assert_eq!(ToolStatus::Failed.run_state(), Some(RunState::Error));
        assert_eq!(ToolStatus::Executing.run_state(), Some(RunState::Executing));
        assert_eq!(ToolStatus::Planning.run_state(), Some(RunState::Planning));
        assert_eq!(ToolStatus::Idle.run_state(), None);
    }

    #[test]
    fn plan_parses_steps_and_cursor() {
        let plan: ToolPlan = serde_json::from_value(serde_json::json!({
            "task": "search rust",
            "steps": [
                {"id": 0, "description": "Open Safari", "status": "done"},
                {"id": 1, "description": "Search", "status": "in_progress"}
            ],
            "current_step": 1
        }))
        .expect("parse plan");
        assert_eq!(plan.current_step, 1);
        assert_eq!(plan.steps[0].status, PlanStepStatus::Done);
        assert_eq!(plan.steps[1].status, PlanStepStatus::InProgress);
    }
}
