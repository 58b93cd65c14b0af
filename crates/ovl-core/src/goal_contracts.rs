use serde::{Deserialize, Serialize};

pub const DEFAULT_GOAL_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_MAX_TOTAL_ACTIONS: u32 = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Decomposing,
    Observing,
    Thinking,
    Acting,
    Verifying,
    Complete,
    Error,
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Decomposing => "decomposing",
            Self::Observing => "observing",
            Self::Thinking => "thinking",
            Self::Acting => "acting",
            Self::Verifying => "verifying",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl GoalStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Goals only move pending -> in_progress -> completed/failed.
    pub fn can_advance_to(self, next: GoalStatus) -> bool {
        self == next || (next.rank() > self.rank() && !self.is_settled())
    }

    pub fn is_settled(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Goal {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub success_criteria: String,
    #[serde(default)]
    pub status: GoalStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default = "default_goal_max_attempts")]
    pub max_attempts: u32,
}

impl Goal {
    pub fn within_budget(&self) -> bool {
        self.attempts <= self.max_attempts
    }
}

fn default_goal_max_attempts() -> u32 {
    DEFAULT_GOAL_MAX_ATTEMPTS
}

fn default_max_total_actions() -> u32 {
    DEFAULT_MAX_TOTAL_ACTIONS
}

/// Goal-pipeline session (protocol v1). Identified on the wire by
/// `original_command` and the absence of `task`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoalSession {
    pub id: String,
    pub original_command: String,
    #[serde(default)]
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub current_goal_index: usize,
    #[serde(default, alias = "status")]
    pub state: AgentStatus,
    #[serde(default)]
    pub total_actions: u32,
    #[serde(default = "default_max_total_actions")]
    pub max_total_actions: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_observation: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_action: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GoalSession {
    pub fn current_goal(&self) -> Option<&Goal> {
        self.goals.get(self.current_goal_index)
    }

    pub fn goal_by_id(&self, goal_id: &str) -> Option<&Goal> {
        self.goals.iter().find(|goal| goal.id == goal_id)
    }

    pub fn actions_exhausted(&self) -> bool {
        self.total_actions >= self.max_total_actions
    }

    /// Keeps goal statuses monotonic against an earlier report of the same
    /// session: a goal the new report moves backward keeps its previous
    /// status. Returns the ids of the goals that were held.
    pub fn hold_progress(&mut self, previous: &GoalSession) -> Vec<String> {
        if previous.id != self.id {
            return Vec::new();
        }
        let mut held = Vec::new();
        for goal in &mut self.goals {
            let Some(before) = previous.goal_by_id(&goal.id) else {
                continue;
            };
            if !before.status.can_advance_to(goal.status) {
                goal.status = before.status;
                held.push(goal.id.clone());
            }
        }
        held
    }

    /// Goals whose attempt counter ran past their budget.
    pub fn over_budget(&self) -> impl Iterator<Item = &Goal> {
        self.goals.iter().filter(|goal| !goal.within_budget())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    #[default]
    Observing,
    Thinking,
    Acting,
    Verifying,
    Done,
}

impl PipelineStep {
    /// Pipeline step implied by a session-level agent status, if any.
    pub fn from_agent_status(status: AgentStatus) -> Option<Self> {
        match status {
            AgentStatus::Observing => Some(Self::Observing),
            AgentStatus::Thinking => Some(Self::Thinking),
            AgentStatus::Acting => Some(Self::Acting),
            AgentStatus::Verifying => Some(Self::Verifying),
            AgentStatus::Complete => Some(Self::Done),
            AgentStatus::Idle | AgentStatus::Decomposing | AgentStatus::Error => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Success,
    Failed,
}

impl ActionOutcome {
    pub fn from_success(success: bool) -> Self {
        if success {
            Self::Success
        } else {
            Self::Failed
        }
    }
}

/// Per-goal think/act/verify sub-status, presentation only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GoalPipelineState {
    pub step: PipelineStep,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_params: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_result: Option<ActionOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
}

impl GoalPipelineState {
    pub fn observing() -> Self {
        Self::default()
    }

    /// Optional rows a pipeline card shows below its step line.
    pub fn detail_rows(&self) -> u32 {
        [
            self.observation.is_some(),
            self.action_type.is_some(),
            self.action_result.is_some(),
            self.verification.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count() as u32
    }

    /// Shallow merge; `None` leaves a field as it is.
    pub fn apply(&mut self, patch: &PipelinePatch) {
        if let Some(step) = patch.step {
            self.step = step;
        }
        if let Some(observation) = &patch.observation {
            self.observation = Some(observation.clone());
        }
        if let Some(action_type) = &patch.action_type {
            self.action_type = Some(action_type.clone());
        }
        if let Some(action_params) = &patch.action_params {
            self.action_params = Some(action_params.clone());
        }
        if let Some(action_rationale) = &patch.action_rationale {
            self.action_rationale = Some(action_rationale.clone());
        }
        if let Some(action_result) = patch.action_result {
            self.action_result = Some(action_result);
        }
        if let Some(action_error) = &patch.action_error {
            self.action_error = action_error.clone();
        }
        if let Some(verification) = &patch.verification {
            self.verification = Some(verification.clone());
        }
        if let Some(verified) = patch.verified {
            self.verified = Some(verified);
        }
    }
}

/// Partial pipeline update. `action_error` is doubly optional so an action
/// result can clear a stale error.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelinePatch {
    pub step: Option<PipelineStep>,
    pub observation: Option<String>,
    pub action_type: Option<String>,
    pub action_params: Option<String>,
    pub action_rationale: Option<String>,
    pub action_result: Option<ActionOutcome>,
    pub action_error: Option<Option<String>>,
    pub verification: Option<String>,
    pub verified: Option<bool>,
}

impl PipelinePatch {
    pub fn step(step: PipelineStep) -> Self {
        Self {
            step: Some(step),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecompositionMethod {
    Pattern,
    Llm,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecompositionInfo {
    pub method: DecompositionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_name: Option<String>,
    #[serde(default)]
    pub original_command: String,
}
