use crate::runtime::AgentRuntime;
use crate::surface::WindowSurface;
use ovl_core::{AgentMode, InboundEvent, OutboundCommand, WindowSize};
use ovl_session::{derive_window_size, LayoutMetrics, Reconciled, Reconciler, StoreReader};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const MAILBOX_CAPACITY: usize = 256;
const MAX_BATCH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum ActorInput {
    Event(InboundEvent),
    Submit(String),
    Cancel,
    AcknowledgeError,
    HideWindow,
    SelectLlmCall(Option<String>),
    ClearLlmCalls,
    CommandFailed { command: String, message: String },
    SetMode(AgentMode),
}

/// Sending half of the actor mailbox plus a reader on its store.
#[derive(Clone)]
pub struct ActorHandle {
    sender: mpsc::Sender<ActorInput>,
    reader: StoreReader,
}

impl ActorHandle {
    /// Returns `false` once the actor has stopped.
    pub async fn send(&self, input: ActorInput) -> bool {
        self.sender.send(input).await.is_ok()
    }

    pub fn sender(&self) -> mpsc::Sender<ActorInput> {
        self.sender.clone()
    }

    pub fn reader(&self) -> StoreReader {
        self.reader.clone()
    }
}

/// Sole writer of the session store. Inputs are drained in batches; the
/// window is resized once per batch, after every queued input has been
/// reconciled.
pub struct StatusActor<R, S> {
    reconciler: Reconciler,
    runtime: Arc<R>,
    surface: S,
    metrics: LayoutMetrics,
    mailbox: mpsc::Receiver<ActorInput>,
    feedback: mpsc::WeakSender<ActorInput>,
    last_size: Option<WindowSize>,
}

impl<R: AgentRuntime, S: WindowSurface> StatusActor<R, S> {
    pub fn new(
        reconciler: Reconciler,
        runtime: Arc<R>,
        surface: S,
        metrics: LayoutMetrics,
    ) -> (Self, ActorHandle) {
        let (sender, mailbox) = mpsc::channel(MAILBOX_CAPACITY);
        let handle = ActorHandle {
            sender: sender.clone(),
            reader: reconciler.subscribe(),
        };
        let actor = Self {
            reconciler,
            runtime,
            surface,
            metrics,
            mailbox,
            feedback: sender.downgrade(),
            last_size: None,
        };
        (actor, handle)
    }

    /// Runs until every handle is dropped, then gives the surface back.
    pub async fn run(mut self) -> S {
        self.relayout();
        while let Some(first) = self.mailbox.recv().await {
            let mut relayout = self.handle(first);
            let mut batched = 1;
            while batched < MAX_BATCH {
                let Ok(input) = self.mailbox.try_recv() else {
                    break;
                };
                relayout |= self.handle(input);
                batched += 1;
            }
            debug!(event = "batch_reconciled", inputs = batched, relayout);
            if relayout {
                self.relayout();
            }
        }
        info!(event = "actor_stopped");
        self.surface
    }

    fn handle(&mut self, input: ActorInput) -> bool {
        let reconciled = match input {
            ActorInput::Event(event) => self.reconciler.apply(&event),
            ActorInput::Submit(command) => self.reconciler.submit(&command),
            ActorInput::Cancel => self.reconciler.cancel(),
            ActorInput::AcknowledgeError => self.reconciler.acknowledge_error(),
            ActorInput::CommandFailed { command, message } => {
                self.reconciler.command_failed(&command, &message)
            }
            ActorInput::SetMode(mode) => self.reconciler.set_mode(mode),
            ActorInput::HideWindow => {
                if let Err(err) = self.surface.hide() {
                    warn!(event = "window_hide_error", error = %err);
                }
                self.dispatch(OutboundCommand::HideWindow);
                return false;
            }
            ActorInput::SelectLlmCall(id) => {
                self.reconciler.store().select_llm_call(id);
                return false;
            }
            ActorInput::ClearLlmCalls => {
                self.reconciler.store().clear_llm_calls();
                return false;
            }
        };
        self.run_effects(reconciled)
    }

    fn run_effects(&mut self, reconciled: Reconciled) -> bool {
        for effect in reconciled.effects {
            self.dispatch(effect.into_command());
        }
        reconciled.relayout
    }

    /// Hands the command to the runtime without waiting on it. A rejection
    /// comes back through the mailbox as `CommandFailed`.
    fn dispatch(&self, command: OutboundCommand) {
        let name = command.name();
        let invocation = self.runtime.invoke(command);
        let feedback = self.feedback.clone();
        tokio::spawn(async move {
            match invocation.await {
                Ok(()) => debug!(event = "command_sent", command = name),
                Err(err) => {
                    warn!(event = "command_rejected", command = name, error = %err);
                    let Some(sender) = feedback.upgrade() else {
                        return;
                    };
                    let _ = sender
                        .send(ActorInput::CommandFailed {
                            command: name.to_string(),
                            message: err.user_message(),
                        })
                        .await;
                }
            }
        });
    }

    fn relayout(&mut self) {
        let size = {
            let snapshot = self.reconciler.store().snapshot();
            derive_window_size(&snapshot, &self.metrics)
        };
        if self.last_size == Some(size) {
            return;
        }
        match self.surface.resize(size) {
            Ok(()) => {
                debug!(event = "window_resized", width = size.width, height = size.height);
                self.last_size = Some(size);
            }
            Err(err) => warn!(event = "window_resize_error", error = %err),
        }
    }
}
