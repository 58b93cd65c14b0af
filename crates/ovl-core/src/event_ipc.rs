use crate::agent_events::{EventError, InboundEvent};
use crate::{ActionPlan, WindowSize};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::marker::PhantomData;
use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;

/// `{"event": name, "payload": ...}` as emitted by the agent runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
            timestamp: None,
        }
    }

    pub fn into_event(self) -> Result<InboundEvent, EventError> {
        InboundEvent::decode(&self.event, self.payload)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    #[serde(alias = "success")]
    Ok,
    #[serde(alias = "failed")]
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResult {
    pub request_id: String,
    pub command: String,
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandResult {
    /// Failure text for an error result, `None` when the command succeeded.
    pub fn failure(&self) -> Option<String> {
        match self.status {
            CommandStatus::Ok => None,
            CommandStatus::Error => Some(
                self.message
                    .clone()
                    .unwrap_or_else(|| format!("{} failed", self.command)),
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    CommandResult(CommandResult),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum InboundFrame {
    Event(EventFrame),
    Control(ControlFrame),
}

/// Commands the overlay issues to the agent runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundCommand {
    PlanCommand { command: String },
    ExecutePlan(ActionPlan),
    CancelExecution,
    HideWindow,
    StartAgent { command: String },
    StartAgentV2 { command: String },
    CancelAgent,
}

impl OutboundCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlanCommand { .. } => "plan_command",
            Self::ExecutePlan(_) => "execute_plan",
            Self::CancelExecution => "cancel_execution",
            Self::HideWindow => "hide_window",
            Self::StartAgent { .. } => "start_agent",
            Self::StartAgentV2 { .. } => "start_agent_v2",
            Self::CancelAgent => "cancel_agent",
        }
    }

    pub fn args(&self) -> Value {
        match self {
            Self::PlanCommand { command }
            | Self::StartAgent { command }
            | Self::StartAgentV2 { command } => json!({ "command": command }),
            Self::ExecutePlan(plan) => json!({ "plan": plan }),
            Self::CancelExecution | Self::HideWindow | Self::CancelAgent => json!({}),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Command {
        request_id: String,
        timestamp: DateTime<Utc>,
        command: String,
        #[serde(default)]
        args: Value,
    },
    WindowSize {
        width: u32,
        height: u32,
    },
    WindowHidden,
}

impl OutboundFrame {
    pub fn command(request_id: impl Into<String>, command: &OutboundCommand) -> Self {
        Self::Command {
            request_id: request_id.into(),
            timestamp: Utc::now(),
            command: command.name().to_string(),
            args: command.args(),
        }
    }

    pub fn window_size(size: WindowSize) -> Self {
        Self::WindowSize {
            width: size.width,
            height: size.height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("unterminated line exceeds max size: {size} > {max}")]
    OversizedBuffer { size: usize, max: usize },
    #[error("frame encode failed: {0}")]
    Encode(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
}

/// Frames and per-line errors produced by one decoder call.
#[derive(Debug, Clone)]
pub struct FrameBatch<T> {
    pub frames: Vec<T>,
    pub errors: Vec<FrameError>,
}

impl<T> Default for FrameBatch<T> {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl<T> FrameBatch<T> {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty() && self.errors.is_empty()
    }
}

pub fn encode_frame<T: Serialize>(
    value: &T,
    max_frame_bytes: usize,
) -> Result<Vec<u8>, FrameError> {
    let mut line =
        serde_json::to_vec(value).map_err(|err| FrameError::Encode(err.to_string()))?;
    if line.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: line.len(),
            max: max_frame_bytes,
        });
    }
    line.push(b'\n');
    Ok(line)
}

pub fn decode_frame<T: DeserializeOwned>(
    bytes: &[u8],
    max_frame_bytes: usize,
) -> Result<T, FrameError> {
    let line = trim_line_ending(bytes);
    if line.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: line.len(),
            max: max_frame_bytes,
        });
    }
    serde_json::from_slice(line).map_err(|err| FrameError::Decode(err.to_string()))
}

fn trim_line_ending(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    bytes.strip_suffix(b"\r").unwrap_or(bytes)
}

/// Incremental NDJSON decoder. A bad line is reported and skipped; the
/// lines after it still decode.
pub struct NdjsonFrameDecoder<T> {
    max_frame_bytes: usize,
    pending: Vec<u8>,
    marker: PhantomData<T>,
}

impl<T> NdjsonFrameDecoder<T> {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes,
            pending: Vec::new(),
            marker: PhantomData,
        }
    }
}

impl<T> Default for NdjsonFrameDecoder<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl<T: DeserializeOwned> NdjsonFrameDecoder<T> {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> FrameBatch<T> {
        let mut batch = FrameBatch::default();
        self.pending.extend_from_slice(chunk);

        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = trim_line_ending(&raw);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            self.decode_line(line, &mut batch);
        }

        if self.pending.len() > self.max_frame_bytes {
            batch.errors.push(FrameError::OversizedBuffer {
                size: self.pending.len(),
                max: self.max_frame_bytes,
            });
            self.pending.clear();
        }

        batch
    }

    /// Decodes a trailing line that was never newline-terminated.
    pub fn finish(&mut self) -> FrameBatch<T> {
        let mut batch = FrameBatch::default();
        let rest = std::mem::take(&mut self.pending);
        let line = trim_line_ending(&rest);
        if !line.iter().all(u8::is_ascii_whitespace) {
            self.decode_line(line, &mut batch);
        }
        batch
    }

    fn decode_line(&self, line: &[u8], batch: &mut FrameBatch<T>) {
        if line.len() > self.max_frame_bytes {
            batch.errors.push(FrameError::OversizedFrame {
                size: line.len(),
                max: self.max_frame_bytes,
            });
            return;
        }
        match serde_json::from_slice(line) {
            Ok(frame) => batch.frames.push(frame),
            Err(err) => batch.errors.push(FrameError::Decode(err.to_string())),
        }
    }
}
