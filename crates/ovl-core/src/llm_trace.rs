use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LlmCallType {
    Decomposition,
    ScreenDescription,
    ActionDecision,
    Verification,
    FindElement,
}

impl LlmCallType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Decomposition => "decomposition",
            Self::ScreenDescription => "screen_description",
            Self::ActionDecision => "action_decision",
            Self::Verification => "verification",
            Self::FindElement => "find_element",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LlmCallStatus {
    #[default]
    Pending,
    Success,
    Error,
}

/// `llm_prompt` payload: a model call was issued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LlmPrompt {
    #[serde(alias = "call_id", alias = "callId")]
    pub id: String,
    #[serde(alias = "callType")]
    pub call_type: LlmCallType,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub prompt: String,
    /// Milliseconds since the unix epoch.
    #[serde(default)]
    pub timestamp: i64,
}

/// `llm_response` payload, correlated to a prompt by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmResponse {
    #[serde(alias = "call_id", alias = "callId")]
    pub id: String,
    #[serde(default, alias = "rawResponse")]
    pub raw_response: String,
    #[serde(default, alias = "parsedResult", skip_serializing_if = "Option::is_none")]
    pub parsed_result: Option<Value>,
    #[serde(default, alias = "durationMs")]
    pub duration_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Debug trace of one model call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmCallEntry {
    pub id: String,
    pub call_type: LlmCallType,
    pub model: String,
    pub prompt: String,
    pub timestamp: i64,
    pub status: LlmCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LlmCallEntry {
    pub fn pending(prompt: &LlmPrompt) -> Self {
        Self {
            id: prompt.id.clone(),
            call_type: prompt.call_type,
            model: prompt.model.clone(),
            prompt: prompt.prompt.clone(),
            timestamp: prompt.timestamp,
            status: LlmCallStatus::Pending,
            raw_response: None,
            parsed_result: None,
            duration_ms: None,
            success: None,
            error: None,
        }
    }

    /// Merges response fields; the status follows the success flag. A call
    /// settles once: returns `false` and leaves the entry alone when it is
    /// no longer pending.
    pub fn complete(&mut self, response: &LlmResponse) -> bool {
        if self.status != LlmCallStatus::Pending {
            return false;
        }
        self.raw_response = Some(response.raw_response.clone());
        self.parsed_result = response.parsed_result.clone();
        self.duration_ms = Some(response.duration_ms);
        self.success = Some(response.success);
        self.error = response.error.clone();
        self.status = if response.success {
            LlmCallStatus::Success
        } else {
            LlmCallStatus::Error
        };
        true
    }
}
