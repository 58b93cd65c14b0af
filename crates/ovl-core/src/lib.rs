use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod agent_events;
pub mod event_ipc;
pub mod goal_contracts;
pub mod llm_trace;
pub mod tool_contracts;

pub use agent_events::{
    discriminate_session, AgentSessionPayload, EventError, InboundEvent, MessagePayload,
    SessionProtocol,
};
pub use event_ipc::{
    decode_frame, encode_frame, CommandResult, CommandStatus, ControlFrame, EventFrame,
    FrameBatch, FrameError, InboundFrame, NdjsonFrameDecoder, OutboundCommand, OutboundFrame,
    DEFAULT_MAX_FRAME_BYTES,
};
pub use goal_contracts::{
    ActionOutcome, AgentStatus, DecompositionInfo, DecompositionMethod, Goal, GoalPipelineState,
    GoalSession, GoalStatus, PipelinePatch, PipelineStep,
};
pub use llm_trace::{LlmCallEntry, LlmCallStatus, LlmCallType, LlmPrompt, LlmResponse};
pub use tool_contracts::{PlanStep, PlanStepStatus, ToolPlan, ToolSession, ToolStatus};

/// Coarse status shown regardless of which session protocol is active.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Planning,
    Executing,
    Done,
    Error,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which session protocol the overlay interprets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// Single action plan executed step by step.
    #[default]
    Legacy,
    /// Goal pipeline (observe, think, act, verify per goal).
    Goals,
    /// Tool based plan runner.
    Tools,
}

impl AgentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Goals => "goals",
            Self::Tools => "tools",
        }
    }
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentMode {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "legacy" | "plan" => Ok(AgentMode::Legacy),
            "goals" | "goal" | "v1" | "agent" => Ok(AgentMode::Goals),
            "tools" | "tool" | "v2" => Ok(AgentMode::Tools),
            other => Err(format!("Unknown agent mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    OpenApp,
    TypeText,
    PressKey,
    MouseClick,
    MouseMove,
    Wait,
    FindAndClick,
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim() {
            "open_app" => Ok(ActionType::OpenApp),
            "type_text" => Ok(ActionType::TypeText),
            "press_key" => Ok(ActionType::PressKey),
            "mouse_click" => Ok(ActionType::MouseClick),
            "mouse_move" => Ok(ActionType::MouseMove),
            "wait" => Ok(ActionType::Wait),
            "find_and_click" => Ok(ActionType::FindAndClick),
            other => Err(format!("Unknown action type: {other}")),
        }
    }
}

/// Action parameters, discriminated by which fields are present.
///
/// `{x, y}` alone matches [`ActionParams::MouseClick`]; callers that know
/// the action type use [`ActionParams::for_action`] to recover a move.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ActionParams {
    OpenApp {
        app_name: String,
    },
    TypeText {
        text: String,
    },
    PressKey {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        modifiers: Option<Vec<String>>,
    },
    MouseClick {
        x: i32,
        y: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        button: Option<String>,
    },
    MouseMove {
        x: i32,
        y: i32,
    },
    Wait {
        ms: u64,
    },
    FindAndClick {
        element: String,
    },
}

impl ActionParams {
    pub fn for_action(self, action_type: Option<ActionType>) -> Self {
        match (self, action_type) {
            (ActionParams::MouseClick { x, y, button: None }, Some(ActionType::MouseMove)) => {
                ActionParams::MouseMove { x, y }
            }
            (params, _) => params,
        }
    }

    /// Short human readable form shown next to a planned action.
    pub fn display_text(&self) -> String {
        match self {
            ActionParams::OpenApp { app_name } => app_name.clone(),
            ActionParams::TypeText { text } => format!("\"{text}\""),
            ActionParams::PressKey { key, modifiers } => {
                let mods = modifiers
                    .as_ref()
                    .map(|mods| mods.join("+"))
                    .unwrap_or_default();
                if mods.is_empty() {
                    key.clone()
                } else {
                    format!("{mods}+{key}")
                }
            }
            ActionParams::MouseClick { x, y, .. } | ActionParams::MouseMove { x, y } => {
                format!("({x}, {y})")
            }
            ActionParams::Wait { ms } => format!("{ms}ms"),
            ActionParams::FindAndClick { element } => element.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionStep {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub description: String,
    pub params: ActionParams,
}

/// Single-plan session emitted by `plan_ready`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionPlan {
    pub id: String,
    #[serde(default)]
    pub original_command: String,
    #[serde(default)]
    pub steps: Vec<ActionStep>,
    #[serde(default)]
    pub requires_confirmation: bool,
}

impl ActionPlan {
    /// Re-resolves pointer params against each step's declared type.
    pub fn normalized(mut self) -> Self {
        for step in &mut self.steps {
            step.params = step.params.clone().for_action(Some(step.action_type));
        }
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}
