//! Inbound status events emitted by the agent runtime.
//!
//! Every event arrives as a name plus a JSON payload. [`InboundEvent::decode`]
//! turns that pair into a typed event; the `agent_session` payload is
//! classified into one of the two session protocols on every occurrence,
//! before anything downstream can look at it.

use crate::goal_contracts::{DecompositionInfo, GoalSession};
use crate::llm_trace::{LlmPrompt, LlmResponse};
use crate::tool_contracts::ToolSession;
use crate::{ActionParams, ActionPlan, ActionType};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("invalid {event} payload: {reason}")]
    InvalidPayload { event: &'static str, reason: String },
    #[error("agent_session payload matches neither protocol (task: {has_task}, original_command: {has_original_command})")]
    UndiscriminatedSession {
        has_task: bool,
        has_original_command: bool,
    },
}

/// Which session protocol an `agent_session` payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionProtocol {
    /// Goal pipeline, carries `original_command`.
    Goals,
    /// Tool based, carries `task`.
    Tools,
}

/// Classifies an `agent_session` payload by field presence.
pub fn discriminate_session(payload: &Value) -> Result<SessionProtocol, EventError> {
    let has_field = |key: &str| {
        payload
            .as_object()
            .map(|map| map.get(key).is_some_and(|value| !value.is_null()))
            .unwrap_or(false)
    };
    let has_task = has_field("task");
    let has_original_command = has_field("original_command");
    match (has_task, has_original_command) {
        (true, false) => Ok(SessionProtocol::Tools),
        (false, true) => Ok(SessionProtocol::Goals),
        _ => Err(EventError::UndiscriminatedSession {
            has_task,
            has_original_command,
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentSessionPayload {
    Goals(GoalSession),
    Tools(ToolSession),
}

impl AgentSessionPayload {
    pub fn protocol(&self) -> SessionProtocol {
        match self {
            Self::Goals(_) => SessionProtocol::Goals,
            Self::Tools(_) => SessionProtocol::Tools,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepStarted {
    #[serde(alias = "stepIndex")]
    pub step_index: usize,
    #[serde(default, alias = "debugText")]
    pub debug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepCompleted {
    #[serde(alias = "stepIndex")]
    pub step_index: usize,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionDone {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `{message}` or a bare string; some emitters send the summary directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "MessageRepr")]
pub struct MessagePayload {
    pub message: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessageRepr {
    Bare(String),
    Object {
        #[serde(default)]
        message: Option<String>,
    },
}

impl From<MessageRepr> for MessagePayload {
    fn from(repr: MessageRepr) -> Self {
        match repr {
            MessageRepr::Bare(message) => Self {
                message: Some(message),
            },
            MessageRepr::Object { message } => Self { message },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GoalIndex {
    #[serde(alias = "goalIndex")]
    pub goal_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Observation {
    pub description: String,
    #[serde(default, alias = "goalId", skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_app: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionPlanned {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(alias = "actionType", alias = "type")]
    pub action_type: String,
    pub params: ActionParams,
    #[serde(default, alias = "rationale", alias = "actionRationale")]
    pub reasoning: String,
    #[serde(default, alias = "goalId", skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
}

impl ActionPlanned {
    pub fn params_text(&self) -> String {
        let action_type = self.action_type.parse::<ActionType>().ok();
        self.params.clone().for_action(action_type).display_text()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionCompleted {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    pub success: bool,
    #[serde(
        default,
        alias = "errorMessage",
        alias = "error",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_message: Option<String>,
    #[serde(default, alias = "goalId", skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Verification {
    #[serde(default, alias = "goalId", skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    #[serde(default)]
    pub observation: String,
    #[serde(alias = "goalAchieved")]
    pub goal_achieved: bool,
    #[serde(default, alias = "progressMade")]
    pub progress_made: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub tool: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    PlanReady(ActionPlan),
    StepStarted(StepStarted),
    StepCompleted(StepCompleted),
    ExecutionDone(ExecutionDone),
    Error(MessagePayload),
    Decomposition(DecompositionInfo),
    GoalsReady,
    AgentSession(AgentSessionPayload),
    GoalStarted(GoalIndex),
    GoalCompleted(GoalIndex),
    Observation(Observation),
    ActionPlanned(ActionPlanned),
    ActionCompleted(ActionCompleted),
    Verification(Verification),
    SessionComplete,
    AgentError(MessagePayload),
    AgentDone(MessagePayload),
    AgentFailed(MessagePayload),
    ToolResult(ToolResult),
    LlmPrompt(LlmPrompt),
    LlmResponse(LlmResponse),
}

impl InboundEvent {
    pub fn decode(name: &str, payload: Value) -> Result<Self, EventError> {
        let event = match name {
            "plan_ready" => {
                let plan: ActionPlan = parse("plan_ready", payload)?;
                InboundEvent::PlanReady(plan.normalized())
            }
            "step_started" => InboundEvent::StepStarted(parse("step_started", payload)?),
            "step_completed" => InboundEvent::StepCompleted(parse("step_completed", payload)?),
            "execution_done" => InboundEvent::ExecutionDone(parse("execution_done", payload)?),
            "error" => InboundEvent::Error(parse_message("error", payload)?),
            "decomposition" => InboundEvent::Decomposition(parse("decomposition", payload)?),
            "goals_ready" => InboundEvent::GoalsReady,
            "agent_session" => InboundEvent::AgentSession(decode_agent_session(payload)?),
            "goal_started" => InboundEvent::GoalStarted(parse("goal_started", payload)?),
            "goal_completed" => InboundEvent::GoalCompleted(parse("goal_completed", payload)?),
            "observation" => InboundEvent::Observation(parse("observation", payload)?),
            "action_planned" => InboundEvent::ActionPlanned(parse("action_planned", payload)?),
            "action_completed" => {
                InboundEvent::ActionCompleted(parse("action_completed", payload)?)
            }
            "verification" => InboundEvent::Verification(parse("verification", payload)?),
            "session_complete" => InboundEvent::SessionComplete,
            "agent_error" => InboundEvent::AgentError(parse_message("agent_error", payload)?),
            "agent_done" => InboundEvent::AgentDone(parse_message("agent_done", payload)?),
            "agent_failed" => InboundEvent::AgentFailed(parse_message("agent_failed", payload)?),
            "tool_result" => InboundEvent::ToolResult(parse("tool_result", payload)?),
            "llm_prompt" => InboundEvent::LlmPrompt(parse("llm_prompt", payload)?),
            "llm_response" => InboundEvent::LlmResponse(parse("llm_response", payload)?),
            other => return Err(EventError::UnknownEvent(other.to_string())),
        };
        Ok(event)
    }

    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::PlanReady(_) => "plan_ready",
            InboundEvent::StepStarted(_) => "step_started",
            InboundEvent::StepCompleted(_) => "step_completed",
            InboundEvent::ExecutionDone(_) => "execution_done",
            InboundEvent::Error(_) => "error",
            InboundEvent::Decomposition(_) => "decomposition",
            InboundEvent::GoalsReady => "goals_ready",
            InboundEvent::AgentSession(_) => "agent_session",
            InboundEvent::GoalStarted(_) => "goal_started",
            InboundEvent::GoalCompleted(_) => "goal_completed",
            InboundEvent::Observation(_) => "observation",
            InboundEvent::ActionPlanned(_) => "action_planned",
            InboundEvent::ActionCompleted(_) => "action_completed",
            InboundEvent::Verification(_) => "verification",
            InboundEvent::SessionComplete => "session_complete",
            InboundEvent::AgentError(_) => "agent_error",
            InboundEvent::AgentDone(_) => "agent_done",
            InboundEvent::AgentFailed(_) => "agent_failed",
            InboundEvent::ToolResult(_) => "tool_result",
            InboundEvent::LlmPrompt(_) => "llm_prompt",
            InboundEvent::LlmResponse(_) => "llm_response",
        }
    }
}

fn decode_agent_session(payload: Value) -> Result<AgentSessionPayload, EventError> {
    match discriminate_session(&payload)? {
        SessionProtocol::Goals => Ok(AgentSessionPayload::Goals(parse("agent_session", payload)?)),
        SessionProtocol::Tools => Ok(AgentSessionPayload::Tools(parse("agent_session", payload)?)),
    }
}

fn parse<T: DeserializeOwned>(event: &'static str, payload: Value) -> Result<T, EventError> {
    serde_json::from_value(payload).map_err(|err| EventError::InvalidPayload {
        event,
        reason: err.to_string(),
    })
}

fn parse_message(event: &'static str, payload: Value) -> Result<MessagePayload, EventError> {
    if payload.is_null() {
        return Ok(MessagePayload::default());
    }
    parse(event, payload)
}
