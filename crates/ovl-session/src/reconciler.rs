use crate::store::{SessionStore, StoreReader};
use ovl_core::agent_events::{ActionCompleted, ActionPlanned, Observation, Verification};
use ovl_core::{
    ActionOutcome, ActionPlan, AgentMode, AgentSessionPayload, AgentStatus, GoalSession,
    InboundEvent, LlmCallEntry, OutboundCommand, PipelinePatch, PipelineStep, RunState,
    ToolSession,
};
use tracing::{debug, info, warn};

/// Work the host runs on the reconciler's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ExecutePlan(ActionPlan),
    Invoke(OutboundCommand),
}

impl Effect {
    pub fn into_command(self) -> OutboundCommand {
        match self {
            Effect::ExecutePlan(plan) => OutboundCommand::ExecutePlan(plan),
            Effect::Invoke(command) => command,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciled {
    pub changed: bool,
    pub relayout: bool,
    pub effects: Vec<Effect>,
}

impl Reconciled {
    fn from_change(changed: bool) -> Self {
        Self {
            changed,
            relayout: changed,
            effects: Vec::new(),
        }
    }

    fn with_relayout(mut self) -> Self {
        self.relayout = true;
        self
    }

    fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Maps inbound events onto store mutations. Owns the store; readers are
/// handed out through [`Reconciler::subscribe`].
pub struct Reconciler {
    store: SessionStore,
}

impl Reconciler {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn subscribe(&self) -> StoreReader {
        self.store.subscribe()
    }

    pub fn apply(&mut self, event: &InboundEvent) -> Reconciled {
        match event {
            InboundEvent::PlanReady(plan) => {
                let changed = self.store.replace_legacy_plan(plan.clone())
                    | self.store.set_run_state(RunState::Executing);
                info!(
                    event = "plan_ready",
                    plan_id = %plan.id,
                    steps = plan.steps.len()
                );
                Reconciled::from_change(changed).with_effect(Effect::ExecutePlan(plan.clone()))
            }
            InboundEvent::StepStarted(started) => {
                let mut changed = self.store.set_legacy_cursor(started.step_index);
                if !started.debug.is_empty() {
                    changed |= self
                        .store
                        .annotate_step(started.step_index, started.debug.clone());
                }
                Reconciled::from_change(changed)
            }
            InboundEvent::StepCompleted(completed) => {
                let next = completed.step_index.saturating_add(1);
                let changed = if completed.success {
                    self.store.set_legacy_cursor(next)
                } else {
                    self.store.set_error(format!("Step {next} failed"))
                };
                Reconciled::from_change(changed)
            }
            InboundEvent::ExecutionDone(done) => {
                let changed = if done.success {
                    self.store.set_run_state(RunState::Done)
                } else {
                    self.store.set_error(
                        done.message
                            .clone()
                            .unwrap_or_else(|| "Execution failed".to_string()),
                    )
                };
                Reconciled::from_change(changed)
            }
            InboundEvent::Error(payload) => Reconciled::from_change(
                self.store.set_error(
                    payload
                        .message
                        .clone()
                        .unwrap_or_else(|| "Unknown error".to_string()),
                ),
            ),
            InboundEvent::Decomposition(info) => {
                Reconciled::from_change(self.store.set_decomposition(info.clone()))
            }
            InboundEvent::GoalsReady => Reconciled::default().with_relayout(),
            InboundEvent::AgentSession(payload) => {
                debug!(event = "agent_session", protocol = ?payload.protocol());
                let reconciled = match payload {
                    AgentSessionPayload::Tools(session) => self.apply_tool_session(session),
                    AgentSessionPayload::Goals(session) => self.apply_goal_session(session),
                };
                reconciled.with_relayout()
            }
            InboundEvent::GoalStarted(started) => {
                let goal_id = self
                    .store
                    .snapshot()
                    .goal_session
                    .as_ref()
                    .and_then(|session| session.goals.get(started.goal_index))
                    .map(|goal| goal.id.clone());
                match goal_id {
                    Some(goal_id) => {
                        Reconciled::from_change(self.store.restart_goal_pipeline(&goal_id))
                    }
                    None => {
                        debug!(
                            event = "goal_started_unresolved",
                            goal_index = started.goal_index
                        );
                        Reconciled::default()
                    }
                }
            }
            InboundEvent::GoalCompleted(completed) => {
                let goal_id = self
                    .store
                    .snapshot()
                    .goal_session
                    .as_ref()
                    .and_then(|session| session.goals.get(completed.goal_index))
                    .map(|goal| goal.id.clone());
                match goal_id {
                    Some(goal_id) => {
                        let patch = PipelinePatch::step(PipelineStep::Done);
                        Reconciled::from_change(self.store.merge_goal_pipeline(&goal_id, &patch))
                    }
                    None => Reconciled::default(),
                }
            }
            InboundEvent::Observation(observation) => self.apply_observation(observation),
            InboundEvent::ActionPlanned(planned) => self.apply_action_planned(planned),
            InboundEvent::ActionCompleted(completed) => self.apply_action_completed(completed),
            InboundEvent::Verification(verification) => self.apply_verification(verification),
            InboundEvent::SessionComplete | InboundEvent::AgentDone(_) => {
                Reconciled::from_change(self.store.set_run_state(RunState::Done))
            }
            InboundEvent::AgentError(payload) => Reconciled::from_change(
                self.store.set_error(
                    payload
                        .message
                        .clone()
                        .unwrap_or_else(|| "Agent error".to_string()),
                ),
            ),
            InboundEvent::AgentFailed(payload) => Reconciled::from_change(
                self.store.set_error(
                    payload
                        .message
                        .clone()
                        .unwrap_or_else(|| "Agent failed".to_string()),
                ),
            ),
            InboundEvent::ToolResult(result) => {
                debug!(
                    event = "tool_result",
                    tool = %result.tool,
                    success = result.success,
                    error = result.error.as_deref().unwrap_or("")
                );
                Reconciled::default()
            }
            InboundEvent::LlmPrompt(prompt) => {
                debug!(
                    event = "llm_prompt",
                    call_id = %prompt.id,
                    call_type = prompt.call_type.as_str(),
                    model = %prompt.model
                );
                Reconciled::from_change(self.store.upsert_llm_prompt(LlmCallEntry::pending(prompt)))
            }
            InboundEvent::LlmResponse(response) => {
                let changed = self.store.merge_llm_response(response);
                if !changed && !self.store.snapshot().llm_calls.contains(&response.id) {
                    debug!(event = "llm_response_unmatched", call_id = %response.id);
                }
                Reconciled::from_change(changed)
            }
        }
    }

    /// Starts a new task: clears the previous session, enters the mode's
    /// initial run-state and returns the entry command to invoke.
    pub fn submit(&mut self, command: &str) -> Reconciled {
        let command = command.trim();
        if command.is_empty() {
            return Reconciled::default();
        }
        let mode = self.store.snapshot().mode;
        let mut changed = self.store.reset();
        let (state, invoke) = match mode {
            AgentMode::Legacy => (
                RunState::Planning,
                OutboundCommand::PlanCommand {
                    command: command.to_string(),
                },
            ),
            AgentMode::Goals => (
                RunState::Executing,
                OutboundCommand::StartAgent {
                    command: command.to_string(),
                },
            ),
            AgentMode::Tools => (
                RunState::Planning,
                OutboundCommand::StartAgentV2 {
                    command: command.to_string(),
                },
            ),
        };
        changed |= self.store.set_run_state(state);
        info!(event = "submit", mode = %mode, command = invoke.name());
        Reconciled::from_change(changed).with_effect(Effect::Invoke(invoke))
    }

    /// Cancels whatever the active mode is running. State is left to the
    /// events the runtime emits in response.
    pub fn cancel(&mut self) -> Reconciled {
        let command = match self.store.snapshot().mode {
            AgentMode::Legacy => OutboundCommand::CancelExecution,
            AgentMode::Goals | AgentMode::Tools => OutboundCommand::CancelAgent,
        };
        Reconciled::default().with_effect(Effect::Invoke(command))
    }

    /// Dismissing the error row starts over.
    pub fn acknowledge_error(&mut self) -> Reconciled {
        Reconciled::from_change(self.store.reset())
    }

    pub fn command_failed(&mut self, command: &str, message: &str) -> Reconciled {
        info!(event = "command_failed", command, message);
        Reconciled::from_change(self.store.set_error(message))
    }

    pub fn set_mode(&mut self, mode: AgentMode) -> Reconciled {
        Reconciled::from_change(self.store.set_mode(mode))
    }

    fn apply_tool_session(&mut self, session: &ToolSession) -> Reconciled {
        debug!(
            event = "tool_session",
            session_id = %session.id,
            state = session.state.as_str(),
            step_count = session.step_count
        );
        let mut changed = self.store.set_tool_session(session.clone());
        changed |= match session.state.run_state() {
            Some(RunState::Error) => self.store.set_error(
                session
                    .error
                    .clone()
                    .unwrap_or_else(|| "Agent failed".to_string()),
            ),
            Some(state) => self.store.set_run_state(state),
            None => false,
        };
        Reconciled::from_change(changed)
    }

    fn apply_goal_session(&mut self, session: &GoalSession) -> Reconciled {
        let mut session = session.clone();
        let held = match self.store.snapshot().goal_session.as_ref() {
            Some(previous) => session.hold_progress(previous),
            None => Vec::new(),
        };
        if !held.is_empty() {
            warn!(
                event = "goal_status_regression_ignored",
                session_id = %session.id,
                goals = %held.join(",")
            );
        }
        for goal in session.over_budget() {
            warn!(
                event = "goal_over_budget",
                goal_id = %goal.id,
                attempts = goal.attempts,
                max_attempts = goal.max_attempts
            );
        }
        if session.actions_exhausted() {
            info!(
                event = "goal_actions_exhausted",
                total_actions = session.total_actions,
                max_total_actions = session.max_total_actions
            );
        }
        debug!(
            event = "goal_session",
            session_id = %session.id,
            state = session.state.as_str(),
            current_goal_index = session.current_goal_index
        );

        let mut changed = self.store.set_goal_session(session.clone());
        if let (Some(step), Some(goal)) = (
            PipelineStep::from_agent_status(session.state),
            session.current_goal(),
        ) {
            changed |= self
                .store
                .merge_existing_goal_pipeline(&goal.id, &PipelinePatch::step(step));
        }
        changed |= match session.state {
            AgentStatus::Complete => self.store.set_run_state(RunState::Done),
            AgentStatus::Error => self.store.set_error(
                session
                    .error
                    .clone()
                    .unwrap_or_else(|| "Agent error".to_string()),
            ),
            _ => false,
        };
        Reconciled::from_change(changed)
    }

    /// Goal a pipeline event applies to: the explicit id when it names a
    /// goal of the current session, else the goal at the cursor.
    fn resolve_goal(&self, explicit: Option<&str>) -> Option<String> {
        let snapshot = self.store.snapshot();
        let session = snapshot.goal_session.as_ref()?;
        explicit
            .and_then(|goal_id| session.goal_by_id(goal_id))
            .or_else(|| session.current_goal())
            .map(|goal| goal.id.clone())
    }

    fn merge_into_goal(&mut self, explicit: Option<&str>, patch: PipelinePatch) -> Reconciled {
        match self.resolve_goal(explicit) {
            Some(goal_id) => {
                Reconciled::from_change(self.store.merge_goal_pipeline(&goal_id, &patch))
            }
            None => {
                debug!(
                    event = "pipeline_event_without_goal",
                    goal_id = explicit.unwrap_or("")
                );
                Reconciled::default()
            }
        }
    }

    fn apply_observation(&mut self, observation: &Observation) -> Reconciled {
        self.merge_into_goal(
            observation.goal_id.as_deref(),
            PipelinePatch {
                step: Some(PipelineStep::Thinking),
                observation: Some(observation.description.clone()),
                ..PipelinePatch::default()
            },
        )
    }

    fn apply_action_planned(&mut self, planned: &ActionPlanned) -> Reconciled {
        self.merge_into_goal(
            planned.goal_id.as_deref(),
            PipelinePatch {
                step: Some(PipelineStep::Acting),
                action_type: Some(planned.action_type.clone()),
                action_params: Some(planned.params_text()),
                action_rationale: Some(planned.reasoning.clone()),
                ..PipelinePatch::default()
            },
        )
    }

    fn apply_action_completed(&mut self, completed: &ActionCompleted) -> Reconciled {
        self.merge_into_goal(
            completed.goal_id.as_deref(),
            PipelinePatch {
                step: Some(PipelineStep::Verifying),
                action_result: Some(ActionOutcome::from_success(completed.success)),
                action_error: Some(completed.error_message.clone()),
                ..PipelinePatch::default()
            },
        )
    }

    fn apply_verification(&mut self, verification: &Verification) -> Reconciled {
        self.merge_into_goal(
            verification.goal_id.as_deref(),
            PipelinePatch {
                verification: Some(verification.observation.clone()),
                verified: Some(verification.goal_achieved),
                ..PipelinePatch::default()
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovl_core::{ActionOutcome, GoalPipelineState, GoalStatus, LlmCallStatus, ToolStatus};
    use serde_json::{json, Value};

    fn event(name: &str, payload: Value) -> InboundEvent {
        InboundEvent::decode(name, payload).expect("decode event")
    }

    fn reconciler(mode: AgentMode) -> Reconciler {
        Reconciler::new(SessionStore::new(mode))
    }

    fn goal_session(state: &str, cursor: usize) -> Value {
        json!({
            "id": "sess-1",
            "original_command": "open safari and search rust",
            "goals": [
                {"id": "g1", "description": "Open Safari", "success_criteria": "Safari is frontmost", "status": "in_progress"},
                {"id": "g2", "description": "Search rust", "success_criteria": "Results shown", "status": "pending"}
            ],
            "current_goal_index": cursor,
            "state": state,
            "total_actions": 0,
            "max_total_actions": 20
        })
    }

    fn tool_session(state: &str, error: Option<&str>) -> Value {
        json!({
            "id": "sess-2",
            "task": "open safari and search rust",
            "state": state,
            "plan": {
                "task": "open safari and search rust",
                "steps": [
                    {"id": 0, "description": "Open Safari", "status": "done"},
                    {"id": 1, "description": "Search", "status": "in_progress"}
                ],
                "current_step": 1
            },
            "step_count": 3,
            "error": error
        })
    }

    fn three_step_plan() -> Value {
        json!({
            "id": "plan-1",
            "original_command": "open safari and type hello",
            "requires_confirmation": false,
            "steps": [
                {"id": "s1", "type": "open_app", "description": "Open Safari", "params": {"app_name": "Safari"}},
                {"id": "s2", "type": "type_text", "description": "Type", "params": {"text": "hello"}},
                {"id": "s3", "type": "press_key", "description": "Submit", "params": {"key": "return"}}
            ]
        })
    }

    #[test]
    fn failed_step_sets_error_and_leaves_other_step_data() {
        let mut reconciler = reconciler(AgentMode::Legacy);
        let submitted = reconciler.submit("open safari and type hello");
        assert_eq!(
            submitted.effects,
            vec![Effect::Invoke(OutboundCommand::PlanCommand {
                command: "open safari and type hello".to_string(),
            })]
        );
        assert_eq!(reconciler.store().snapshot().run_state, RunState::Planning);

        let ready = reconciler.apply(&event("plan_ready", three_step_plan()));
        assert!(matches!(ready.effects.as_slice(), [Effect::ExecutePlan(plan)] if plan.steps.len() == 3));
        reconciler.apply(&event("step_started", json!({"step_index": 0, "debug": "open -a Safari"})));
        reconciler.apply(&event("step_completed", json!({"step_index": 0, "success": true})));
        reconciler.apply(&event("step_started", json!({"step_index": 1, "debug": "typing"})));
        reconciler.apply(&event("step_completed", json!({"step_index": 1, "success": false})));

        let snapshot = reconciler.store().snapshot();
        assert_eq!(snapshot.run_state, RunState::Error);
        assert_eq!(snapshot.error.as_deref(), Some("Step 2 failed"));
        assert_eq!(snapshot.current_step, Some(1));
        assert_eq!(snapshot.step_debug.get(&1).map(String::as_str), Some("typing"));
        assert_eq!(snapshot.step_debug.get(&0).map(String::as_str), Some("open -a Safari"));
        assert!(!snapshot.step_debug.contains_key(&2));
        assert_eq!(snapshot.plan.as_ref().map(|p| p.steps.len()), Some(3));
    }

    #[test]
    fn step_completed_at_max_index_does_not_overflow() {
        let mut reconciler = reconciler(AgentMode::Legacy);
        reconciler.apply(&event(
            "step_completed",
            json!({"step_index": usize::MAX, "success": true}),
        ));
        assert_eq!(reconciler.store().snapshot().current_step, Some(usize::MAX));

        reconciler.apply(&event(
            "step_completed",
            json!({"step_index": usize::MAX, "success": false}),
        ));
        let snapshot = reconciler.store().snapshot();
        assert_eq!(snapshot.run_state, RunState::Error);
        let expected = format!("Step {} failed", usize::MAX);
        assert_eq!(snapshot.error.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn execution_done_without_message_uses_default_text() {
        let mut reconciler = reconciler(AgentMode::Legacy);
        reconciler.apply(&event("execution_done", json!({"success": false})));
        assert_eq!(
            reconciler.store().snapshot().error.as_deref(),
            Some("Execution failed")
        );
        reconciler.apply(&event("execution_done", json!({"success": true})));
        let snapshot = reconciler.store().snapshot();
        assert_eq!(snapshot.run_state, RunState::Done);
        assert_eq!(snapshot.error, None);
    }

    #[test]
    fn observation_then_action_planned_builds_acting_pipeline() {
        let mut reconciler = reconciler(AgentMode::Goals);
        reconciler.apply(&event("agent_session", goal_session("observing", 0)));
        reconciler.apply(&event("goal_started", json!({"goal_index": 0})));
        reconciler.apply(&event("observation", json!({"description": "Safari window open"})));
        reconciler.apply(&event(
            "action_planned",
            json!({"action_type": "open_app", "params": {"app_name": "Safari"}, "reasoning": "launch"}),
        ));

        let snapshot = reconciler.store().snapshot();
        assert_eq!(
            snapshot.goal_pipeline.get("g1"),
            Some(&GoalPipelineState {
                step: PipelineStep::Acting,
                observation: Some("Safari window open".to_string()),
                action_type: Some("open_app".to_string()),
                action_params: Some("Safari".to_string()),
                action_rationale: Some("launch".to_string()),
                ..GoalPipelineState::default()
            })
        );
        assert!(!snapshot.goal_pipeline.contains_key("g2"));
    }

    #[test]
    fn goal_started_wipes_previous_pipeline_contents() {
        let mut reconciler = reconciler(AgentMode::Goals);
        reconciler.apply(&event("agent_session", goal_session("acting", 0)));
        reconciler.apply(&event("goal_started", json!({"goal_index": 0})));
        reconciler.apply(&event("observation", json!({"description": "desktop"})));
        reconciler.apply(&event(
            "action_completed",
            json!({"success": false, "error_message": "Safari not installed"}),
        ));
        reconciler.apply(&event(
            "verification",
            json!({"observation": "no window", "goal_achieved": false}),
        ));

        reconciler.apply(&event("goal_started", json!({"goalIndex": 0})));
        assert_eq!(
            reconciler.store().snapshot().goal_pipeline.get("g1"),
            Some(&GoalPipelineState::observing())
        );
    }

    #[test]
    fn action_result_and_verification_merge_without_touching_other_fields() {
        let mut reconciler = reconciler(AgentMode::Goals);
        reconciler.apply(&event("agent_session", goal_session("acting", 0)));
        reconciler.apply(&event("goal_started", json!({"goal_index": 0})));
        reconciler.apply(&event("observation", json!({"description": "desktop"})));
        reconciler.apply(&event(
            "action_completed",
            json!({"success": false, "error_message": "timed out"}),
        ));
        reconciler.apply(&event("action_completed", json!({"success": true})));
        reconciler.apply(&event(
            "verification",
            json!({"observation": "Safari is frontmost", "goal_achieved": true}),
        ));

        let snapshot = reconciler.store().snapshot();
        let pipeline = &snapshot.goal_pipeline["g1"];
        assert_eq!(pipeline.step, PipelineStep::Verifying);
        assert_eq!(pipeline.observation.as_deref(), Some("desktop"));
        assert_eq!(pipeline.action_result, Some(ActionOutcome::Success));
        assert_eq!(pipeline.action_error, None);
        assert_eq!(pipeline.verification.as_deref(), Some("Safari is frontmost"));
        assert_eq!(pipeline.verified, Some(true));
    }

    #[test]
    fn explicit_goal_id_wins_when_it_names_a_session_goal() {
        let mut reconciler = reconciler(AgentMode::Goals);
        reconciler.apply(&event("agent_session", goal_session("observing", 0)));
        reconciler.apply(&event(
            "observation",
            json!({"description": "search field", "goal_id": "g2"}),
        ));
        reconciler.apply(&event(
            "observation",
            json!({"description": "desktop", "goal_id": "g9"}),
        ));

        let snapshot = reconciler.store().snapshot();
        assert_eq!(
            snapshot.goal_pipeline.get("g2").and_then(|p| p.observation.as_deref()),
            Some("search field")
        );
        assert_eq!(
            snapshot.goal_pipeline.get("g1").and_then(|p| p.observation.as_deref()),
            Some("desktop")
        );
        assert!(!snapshot.goal_pipeline.contains_key("g9"));
    }

    #[test]
    fn pipeline_events_without_goal_session_are_ignored() {
        let mut reconciler = reconciler(AgentMode::Goals);
        let outcome = reconciler.apply(&event("observation", json!({"description": "desktop"})));
        assert!(!outcome.changed);
        let outcome = reconciler.apply(&event("goal_started", json!({"goal_index": 3})));
        assert!(!outcome.changed);
        assert!(reconciler.store().snapshot().goal_pipeline.is_empty());
    }

    #[test]
    fn tool_session_never_touches_goal_state() {
        let mut reconciler = reconciler(AgentMode::Tools);
        let outcome = reconciler.apply(&event("agent_session", tool_session("executing", None)));
        assert!(outcome.relayout);

        let snapshot = reconciler.store().snapshot();
        assert!(snapshot.goal_session.is_none());
        assert!(snapshot.goal_pipeline.is_empty());
        assert_eq!(snapshot.run_state, RunState::Executing);
        assert_eq!(
            snapshot.tool_session.as_ref().map(|s| s.state),
            Some(ToolStatus::Executing)
        );
    }

    #[test]
    fn stale_goal_session_cannot_reopen_completed_goals() {
        let mut reconciler = reconciler(AgentMode::Goals);
        let mut completed = goal_session("acting", 1);
        completed["goals"][0]["status"] = json!("completed");
        completed["goals"][1]["status"] = json!("in_progress");
        reconciler.apply(&event("agent_session", completed));

        let mut stale = goal_session("thinking", 1);
        stale["goals"][0]["status"] = json!("pending");
        stale["goals"][0]["attempts"] = json!(5);
        stale["goals"][0]["max_attempts"] = json!(3);
        reconciler.apply(&event("agent_session", stale));

        let snapshot = reconciler.store().snapshot();
        let session = snapshot.goal_session.as_ref().expect("goal session");
        assert_eq!(session.goals[0].status, GoalStatus::Completed);
        assert_eq!(session.goals[0].attempts, 5);
        assert_eq!(session.goals[1].status, GoalStatus::InProgress);
        assert_eq!(session.state, AgentStatus::Thinking);
    }

    #[test]
    fn goal_session_never_touches_tool_state() {
        let mut reconciler = reconciler(AgentMode::Goals);
        reconciler.apply(&event("agent_session", goal_session("thinking", 0)));
        let snapshot = reconciler.store().snapshot();
        assert!(snapshot.tool_session.is_none());
        assert!(snapshot.goal_session.is_some());
    }

    #[test]
    fn tool_session_status_projects_onto_run_state() {
        let mut reconciler = reconciler(AgentMode::Tools);
        reconciler.apply(&event("agent_session", tool_session("planning", None)));
        assert_eq!(reconciler.store().snapshot().run_state, RunState::Planning);

        reconciler.apply(&event("agent_session", tool_session("failed", None)));
        assert_eq!(reconciler.store().snapshot().error.as_deref(), Some("Agent failed"));

        reconciler.apply(&event(
            "agent_session",
            tool_session("failed", Some("Safari crashed")),
        ));
        assert_eq!(reconciler.store().snapshot().error.as_deref(), Some("Safari crashed"));

        reconciler.apply(&event("agent_session", tool_session("done", None)));
        assert_eq!(reconciler.store().snapshot().run_state, RunState::Done);

        reconciler.apply(&event("agent_session", tool_session("idle", None)));
        assert_eq!(reconciler.store().snapshot().run_state, RunState::Done);
    }

    #[test]
    fn goal_session_status_advances_only_started_pipeline() {
        let mut reconciler = reconciler(AgentMode::Goals);
        reconciler.apply(&event("agent_session", goal_session("thinking", 0)));
        assert!(reconciler.store().snapshot().goal_pipeline.is_empty());

        reconciler.apply(&event("goal_started", json!({"goal_index": 0})));
        reconciler.apply(&event("agent_session", goal_session("verifying", 0)));
        assert_eq!(
            reconciler.store().snapshot().goal_pipeline["g1"].step,
            PipelineStep::Verifying
        );

        reconciler.apply(&event("agent_session", goal_session("decomposing", 0)));
        assert_eq!(
            reconciler.store().snapshot().goal_pipeline["g1"].step,
            PipelineStep::Verifying
        );

        reconciler.apply(&event("agent_session", goal_session("error", 0)));
        let snapshot = reconciler.store().snapshot();
        assert_eq!(snapshot.run_state, RunState::Error);
        assert_eq!(snapshot.error.as_deref(), Some("Agent error"));
    }

    #[test]
    fn goal_completion_and_session_complete() {
        let mut reconciler = reconciler(AgentMode::Goals);
        reconciler.submit("open safari");
        assert_eq!(reconciler.store().snapshot().run_state, RunState::Executing);

        reconciler.apply(&event("agent_session", goal_session("observing", 0)));
        reconciler.apply(&event("goal_started", json!({"goal_index": 0})));
        reconciler.apply(&event("goal_completed", json!({"goal_index": 0})));
        reconciler.apply(&event("agent_session", goal_session("complete", 1)));
        reconciler.apply(&event("session_complete", Value::Null));

        let snapshot = reconciler.store().snapshot();
        assert_eq!(snapshot.goal_pipeline["g1"].step, PipelineStep::Done);
        assert!(!snapshot.goal_pipeline.contains_key("g2"));
        assert_eq!(snapshot.run_state, RunState::Done);
    }

    #[test]
    fn mismatched_llm_response_leaves_prompt_pending() {
        let mut reconciler = reconciler(AgentMode::Goals);
        reconciler.apply(&event(
            "llm_prompt",
            json!({"id": "c1", "call_type": "decomposition", "model": "m", "prompt": "split", "timestamp": 1}),
        ));
        let outcome = reconciler.apply(&event(
            "llm_response",
            json!({"id": "c2", "raw_response": "[]", "duration_ms": 5, "success": true}),
        ));
        assert!(!outcome.changed);

        let snapshot = reconciler.store().snapshot();
        let calls = snapshot.llm_calls.ordered();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].status, LlmCallStatus::Pending);
    }

    #[test]
    fn agent_terminal_messages() {
        let mut reconciler = reconciler(AgentMode::Tools);
        reconciler.apply(&event("agent_failed", json!("Cancelled")));
        assert_eq!(reconciler.store().snapshot().error.as_deref(), Some("Cancelled"));
        reconciler.apply(&event("agent_done", json!({"message": "Completed"})));
        assert_eq!(reconciler.store().snapshot().run_state, RunState::Done);
        reconciler.apply(&event("agent_error", Value::Null));
        assert_eq!(reconciler.store().snapshot().error.as_deref(), Some("Agent error"));
    }

    #[test]
    fn goals_ready_and_tool_result_do_not_mutate() {
        let mut reconciler = reconciler(AgentMode::Goals);
        let ready = reconciler.apply(&InboundEvent::GoalsReady);
        assert!(ready.relayout);
        assert!(!ready.changed);

        let tool = reconciler.apply(&event(
            "tool_result",
            json!({"tool": "open_app", "success": true, "output": {"pid": 42}}),
        ));
        assert_eq!(tool, Reconciled::default());
        assert!(reconciler.store().snapshot().is_pristine());
    }

    #[test]
    fn submit_resets_previous_session_and_picks_mode_command() {
        let mut reconciler = reconciler(AgentMode::Tools);
        reconciler.apply(&event("agent_session", tool_session("failed", Some("boom"))));
        let outcome = reconciler.submit("  search rust  ");
        assert_eq!(
            outcome.effects,
            vec![Effect::Invoke(OutboundCommand::StartAgentV2 {
                command: "search rust".to_string(),
            })]
        );
        let snapshot = reconciler.store().snapshot();
        assert!(snapshot.tool_session.is_none());
        assert_eq!(snapshot.run_state, RunState::Planning);
        assert_eq!(snapshot.error, None);
        drop(snapshot);

        assert_eq!(reconciler.submit("   "), Reconciled::default());
    }

    #[test]
    fn command_failure_and_acknowledge() {
        let mut reconciler = reconciler(AgentMode::Legacy);
        reconciler.submit("open safari");
        reconciler.command_failed("plan_command", "Ollama is not running");
        assert_eq!(
            reconciler.store().snapshot().error.as_deref(),
            Some("Ollama is not running")
        );
        assert!(reconciler.acknowledge_error().changed);
        assert!(reconciler.store().snapshot().is_pristine());
    }

    #[test]
    fn cancel_targets_the_active_runner() {
        let mut legacy = reconciler(AgentMode::Legacy);
        assert_eq!(
            legacy.cancel().effects,
            vec![Effect::Invoke(OutboundCommand::CancelExecution)]
        );
        let mut goals = reconciler(AgentMode::Goals);
        assert_eq!(
            goals.cancel().effects,
            vec![Effect::Invoke(OutboundCommand::CancelAgent)]
        );
    }
}
