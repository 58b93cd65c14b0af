//! Outbound side of the agent runtime: issuing commands, and the socket
//! connection that carries both directions.

use crate::actor::ActorInput;
use futures_util::future::BoxFuture;
use ovl_core::{ControlFrame, InboundFrame, OutboundCommand, OutboundFrame};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("agent runtime is not connected")]
    Disconnected,
    #[error("{command} rejected: {message}")]
    Rejected { command: String, message: String },
}

impl RuntimeError {
    /// Text for the error row.
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Commands the overlay can issue. Each invocation resolves once the
/// runtime accepted (or refused) the command.
pub trait AgentRuntime: Send + Sync + 'static {
    fn invoke(&self, command: OutboundCommand) -> BoxFuture<'static, Result<(), RuntimeError>>;
}

/// Queues command frames for the socket connection.
#[derive(Clone)]
pub struct SocketRuntime {
    frames: mpsc::Sender<OutboundFrame>,
}

impl SocketRuntime {
    pub fn new(frames: mpsc::Sender<OutboundFrame>) -> Self {
        Self { frames }
    }
}

impl AgentRuntime for SocketRuntime {
    fn invoke(&self, command: OutboundCommand) -> BoxFuture<'static, Result<(), RuntimeError>> {
        let frames = self.frames.clone();
        Box::pin(async move {
            let request_id = Uuid::new_v4().to_string();
            debug!(event = "command_queued", command = command.name(), request_id = %request_id);
            frames
                .send(OutboundFrame::command(request_id, &command))
                .await
                .map_err(|_| RuntimeError::Disconnected)
        })
    }
}

/// Keeps every command it is handed. Used by `replay`, where nothing is
/// executed, and by tests.
#[derive(Clone, Default)]
pub struct RecordingRuntime {
    commands: Arc<Mutex<Vec<OutboundCommand>>>,
    rejections: Arc<Mutex<Vec<(&'static str, String)>>>,
}

impl RecordingRuntime {
    /// Makes every later invocation of `command` fail with `message`.
    #[cfg(test)]
    pub fn reject(&self, command: &'static str, message: impl Into<String>) {
        if let Ok(mut rejections) = self.rejections.lock() {
            rejections.push((command, message.into()));
        }
    }

    pub fn commands(&self) -> Vec<OutboundCommand> {
        self.commands
            .lock()
            .map(|commands| commands.clone())
            .unwrap_or_default()
    }
}

impl AgentRuntime for RecordingRuntime {
    fn invoke(&self, command: OutboundCommand) -> BoxFuture<'static, Result<(), RuntimeError>> {
        let rejection = self.rejections.lock().ok().and_then(|rejections| {
            rejections
                .iter()
                .find(|(name, _)| *name == command.name())
                .map(|(_, message)| message.clone())
        });
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command.clone());
        }
        Box::pin(async move {
            match rejection {
                Some(message) => Err(RuntimeError::Rejected {
                    command: command.name().to_string(),
                    message,
                }),
                None => Ok(()),
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub socket_path: PathBuf,
    pub max_frame_bytes: usize,
}

/// Turns one decoded inbound frame into actor input. Undiscriminable or
/// malformed events are logged and dropped here.
pub fn route_frame(frame: InboundFrame) -> Option<ActorInput> {
    match frame {
        InboundFrame::Event(frame) => {
            let name = frame.event.clone();
            match frame.into_event() {
                Ok(event) => Some(ActorInput::Event(event)),
                Err(err) => {
                    error!(event = "inbound_event_rejected", name = %name, error = %err);
                    None
                }
            }
        }
        InboundFrame::Control(ControlFrame::CommandResult(result)) => match result.failure() {
            Some(message) => Some(ActorInput::CommandFailed {
                command: result.command,
                message,
            }),
            None => {
                debug!(
                    event = "command_ok",
                    command = %result.command,
                    request_id = %result.request_id
                );
                None
            }
        },
    }
}

#[cfg(not(unix))]
pub async fn connection_loop(
    config: ConnectionConfig,
    _inputs: mpsc::Sender<ActorInput>,
    mut frames: mpsc::Receiver<OutboundFrame>,
) {
    warn!(event = "agent_socket_unsupported", path = %config.socket_path.display());
    while frames.recv().await.is_some() {}
}

#[cfg(unix)]
pub async fn connection_loop(
    config: ConnectionConfig,
    inputs: mpsc::Sender<ActorInput>,
    mut frames: mpsc::Receiver<OutboundFrame>,
) {
    use ovl_core::{encode_frame, NdjsonFrameDecoder};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixStream;

    let mut backoff = Duration::from_secs(1);
    loop {
        let stream = match UnixStream::connect(&config.socket_path).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(
                    event = "agent_connect_error",
                    path = %config.socket_path.display(),
                    error = %err
                );
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
                continue;
            }
        };
        backoff = Duration::from_secs(1);
        info!(event = "agent_connected", path = %config.socket_path.display());

        let (mut reader, mut writer) = stream.into_split();
        let mut decoder = NdjsonFrameDecoder::<InboundFrame>::new(config.max_frame_bytes);
        let mut read_buf = [0u8; 8192];

        loop {
            tokio::select! {
                read = reader.read(&mut read_buf) => {
                    let read = match read {
                        Ok(0) => break,
                        Ok(read) => read,
                        Err(err) => {
                            warn!(event = "agent_read_error", error = %err);
                            break;
                        }
                    };
                    let batch = decoder.push_chunk(&read_buf[..read]);
                    for err in batch.errors {
                        warn!(event = "agent_frame_error", error = %err);
                    }
                    for frame in batch.frames {
                        if let Some(input) = route_frame(frame) {
                            if inputs.send(input).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                outbound = frames.recv() => {
                    let Some(frame) = outbound else {
                        return;
                    };
                    let line = match encode_frame(&frame, config.max_frame_bytes) {
                        Ok(line) => line,
                        Err(err) => {
                            warn!(event = "agent_encode_error", error = %err);
                            continue;
                        }
                    };
                    if let Err(err) = writer.write_all(&line).await {
                        warn!(event = "agent_write_error", error = %err);
                        break;
                    }
                }
            }
        }

        let tail = decoder.finish();
        for err in tail.errors {
            warn!(event = "agent_frame_error", error = %err);
        }
        info!(event = "agent_disconnected");
        tokio::time::sleep(backoff).await;
        backoff = next_backoff(backoff);
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(Duration::from_secs(10))
}
