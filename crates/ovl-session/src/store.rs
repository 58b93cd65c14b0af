//! Single-writer session store.
//!
//! [`SessionStore`] owns the sending half of a `watch` channel holding the
//! current [`SessionSnapshot`]. Every mutation goes through
//! `send_if_modified`, so writing a value the snapshot already holds does
//! not wake observers. Readers hold a [`StoreReader`].

use ovl_core::{
    ActionPlan, AgentMode, DecompositionInfo, GoalPipelineState, GoalSession, LlmCallEntry,
    LlmCallStatus, LlmResponse, PipelinePatch, RunState, ToolSession,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::watch;

/// Model-call traces keyed by call id. Append-only until cleared.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LlmCalls(BTreeMap<String, LlmCallEntry>);

impl LlmCalls {
    pub fn get(&self, id: &str) -> Option<&LlmCallEntry> {
        self.0.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in issue order, ties broken by id.
    pub fn ordered(&self) -> Vec<&LlmCallEntry> {
        let mut entries: Vec<&LlmCallEntry> = self.0.values().collect();
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        entries
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub mode: AgentMode,
    pub run_state: RunState,
    pub error: Option<String>,
    pub plan: Option<ActionPlan>,
    pub current_step: Option<usize>,
    pub step_debug: BTreeMap<usize, String>,
    pub goal_session: Option<GoalSession>,
    pub goal_pipeline: BTreeMap<String, GoalPipelineState>,
    pub decomposition: Option<DecompositionInfo>,
    pub tool_session: Option<ToolSession>,
    pub llm_calls: LlmCalls,
    pub selected_llm_call: Option<String>,
}

impl SessionSnapshot {
    pub fn with_mode(mode: AgentMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// True when every session-scoped field holds its initial value.
    pub fn is_pristine(&self) -> bool {
        *self == Self::with_mode(self.mode)
    }

    /// Id of the goal at the v1 cursor, if there is one.
    pub fn current_goal_id(&self) -> Option<&str> {
        self.goal_session
            .as_ref()
            .and_then(|session| session.current_goal())
            .map(|goal| goal.id.as_str())
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

pub struct SessionStore {
    tx: watch::Sender<SessionSnapshot>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(AgentMode::default())
    }
}

impl SessionStore {
    pub fn new(mode: AgentMode) -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::with_mode(mode));
        Self { tx }
    }

    pub fn subscribe(&self) -> StoreReader {
        StoreReader {
            rx: self.tx.subscribe(),
        }
    }

    pub fn snapshot(&self) -> watch::Ref<'_, SessionSnapshot> {
        self.tx.borrow()
    }

    fn commit(&self, mutate: impl FnOnce(&mut SessionSnapshot) -> bool) -> bool {
        self.tx.send_if_modified(mutate)
    }

    pub fn set_mode(&self, mode: AgentMode) -> bool {
        self.commit(|snapshot| replace_if_changed(&mut snapshot.mode, mode))
    }

    /// Any state other than `error` also clears the error text.
    pub fn set_run_state(&self, state: RunState) -> bool {
        self.commit(|snapshot| {
            let mut changed = replace_if_changed(&mut snapshot.run_state, state);
            if state != RunState::Error {
                changed |= replace_if_changed(&mut snapshot.error, None);
            }
            changed
        })
    }

    pub fn set_error(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        self.commit(|snapshot| {
            let error_changed = replace_if_changed(&mut snapshot.error, Some(message));
            replace_if_changed(&mut snapshot.run_state, RunState::Error) | error_changed
        })
    }

    /// Returns every session-scoped field to its initial value. The
    /// configured mode is kept.
    pub fn reset(&self) -> bool {
        self.commit(|snapshot| {
            let fresh = SessionSnapshot::with_mode(snapshot.mode);
            replace_if_changed(snapshot, fresh)
        })
    }

    pub fn replace_legacy_plan(&self, plan: ActionPlan) -> bool {
        self.commit(|snapshot| {
            let mut changed = replace_if_changed(&mut snapshot.plan, Some(plan));
            changed |= replace_if_changed(&mut snapshot.current_step, None);
            if !snapshot.step_debug.is_empty() {
                snapshot.step_debug.clear();
                changed = true;
            }
            changed
        })
    }

    pub fn set_legacy_cursor(&self, index: usize) -> bool {
        self.commit(|snapshot| replace_if_changed(&mut snapshot.current_step, Some(index)))
    }

    pub fn annotate_step(&self, index: usize, text: impl Into<String>) -> bool {
        let text = text.into();
        self.commit(|snapshot| {
            if snapshot.step_debug.get(&index) == Some(&text) {
                return false;
            }
            snapshot.step_debug.insert(index, text);
            true
        })
    }

    pub fn set_goal_session(&self, session: GoalSession) -> bool {
        self.commit(|snapshot| replace_if_changed(&mut snapshot.goal_session, Some(session)))
    }

    /// Merges into the goal's entry, creating an `observing` entry first
    /// when there is none.
    pub fn merge_goal_pipeline(&self, goal_id: &str, patch: &PipelinePatch) -> bool {
        self.commit(|snapshot| {
            let current = snapshot.goal_pipeline.get(goal_id);
            let mut next = current.cloned().unwrap_or_else(GoalPipelineState::observing);
            next.apply(patch);
            if current == Some(&next) {
                return false;
            }
            snapshot.goal_pipeline.insert(goal_id.to_string(), next);
            true
        })
    }

    /// Like [`Self::merge_goal_pipeline`] but never creates an entry.
    pub fn merge_existing_goal_pipeline(&self, goal_id: &str, patch: &PipelinePatch) -> bool {
        self.commit(|snapshot| {
            let Some(entry) = snapshot.goal_pipeline.get_mut(goal_id) else {
                return false;
            };
            let before = entry.clone();
            entry.apply(patch);
            *entry != before
        })
    }

    /// Replaces the goal's entry with a fresh `observing` one.
    pub fn restart_goal_pipeline(&self, goal_id: &str) -> bool {
        self.commit(|snapshot| {
            let fresh = GoalPipelineState::observing();
            if snapshot.goal_pipeline.get(goal_id) == Some(&fresh) {
                return false;
            }
            snapshot.goal_pipeline.insert(goal_id.to_string(), fresh);
            true
        })
    }

    pub fn set_decomposition(&self, info: DecompositionInfo) -> bool {
        self.commit(|snapshot| replace_if_changed(&mut snapshot.decomposition, Some(info)))
    }

    pub fn set_tool_session(&self, session: ToolSession) -> bool {
        self.commit(|snapshot| replace_if_changed(&mut snapshot.tool_session, Some(session)))
    }

    /// Records a pending call. A call that already settled keeps its
    /// response.
    pub fn upsert_llm_prompt(&self, entry: LlmCallEntry) -> bool {
        self.commit(|snapshot| {
            if let Some(existing) = snapshot.llm_calls.get(&entry.id) {
                if *existing == entry || existing.status != LlmCallStatus::Pending {
                    return false;
                }
            }
            snapshot.llm_calls.0.insert(entry.id.clone(), entry);
            true
        })
    }

    /// No-op when no prompt with this id was recorded, or when the call
    /// already settled.
    pub fn merge_llm_response(&self, response: &LlmResponse) -> bool {
        self.commit(|snapshot| {
            snapshot
                .llm_calls
                .0
                .get_mut(&response.id)
                .is_some_and(|entry| entry.complete(response))
        })
    }

    /// Selecting an id with no recorded call is ignored.
    pub fn select_llm_call(&self, id: Option<String>) -> bool {
        self.commit(|snapshot| {
            if let Some(id) = &id {
                if !snapshot.llm_calls.contains(id) {
                    return false;
                }
            }
            replace_if_changed(&mut snapshot.selected_llm_call, id)
        })
    }

    pub fn clear_llm_calls(&self) -> bool {
        self.commit(|snapshot| {
            let had_calls = !snapshot.llm_calls.is_empty();
            snapshot.llm_calls.0.clear();
            replace_if_changed(&mut snapshot.selected_llm_call, None) | had_calls
        })
    }
}

/// Read handle for presentation consumers.
#[derive(Clone)]
pub struct StoreReader {
    rx: watch::Receiver<SessionSnapshot>,
}

impl StoreReader {
    pub fn snapshot(&self) -> watch::Ref<'_, SessionSnapshot> {
        self.rx.borrow()
    }

    /// Waits for the next committed change. Returns `false` once the store
    /// is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Clones the latest snapshot and marks it seen.
    pub fn latest(&mut self) -> SessionSnapshot {
        self.rx.borrow_and_update().clone()
    }
}
