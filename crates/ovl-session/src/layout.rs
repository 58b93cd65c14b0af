use crate::store::SessionSnapshot;
use ovl_core::{AgentMode, GoalStatus, RunState, ToolStatus, WindowSize};
use serde::{Deserialize, Serialize};

/// Row heights, in logical pixels, the status window is assembled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutMetrics {
    pub width: u32,
    pub base: u32,
    pub row: u32,
    pub executing_extra: u32,
    pub decomposition_block: u32,
    pub pipeline_header: u32,
    pub row_unit: u32,
    pub pipeline_footer: u32,
    pub goal_row: u32,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self {
            width: 600,
            base: 64,
            row: 32,
            executing_extra: 24,
            decomposition_block: 28,
            pipeline_header: 30,
            row_unit: 20,
            pipeline_footer: 10,
            goal_row: 30,
        }
    }
}

pub fn derive_window_size(snapshot: &SessionSnapshot, metrics: &LayoutMetrics) -> WindowSize {
    WindowSize {
        width: metrics.width,
        height: metrics.base.saturating_add(content_height(snapshot, metrics)),
    }
}

fn content_height(snapshot: &SessionSnapshot, metrics: &LayoutMetrics) -> u32 {
    if let Some(height) = tool_plan_height(snapshot, metrics) {
        return height;
    }
    if let Some(height) = legacy_height(snapshot, metrics) {
        return height;
    }
    goal_height(snapshot, metrics).unwrap_or(0)
}

fn rows(count: usize, row: u32) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX).saturating_mul(row)
}

/// Pipeline body: the step row plus one row per detail line.
fn rows_of(detail_rows: u32, row_unit: u32) -> u32 {
    detail_rows.saturating_add(1).saturating_mul(row_unit)
}

fn tool_plan_height(snapshot: &SessionSnapshot, metrics: &LayoutMetrics) -> Option<u32> {
    if snapshot.mode != AgentMode::Tools {
        return None;
    }
    let session = snapshot.tool_session.as_ref()?;
    let plan = session.plan.as_ref()?;
    let mut height = rows(plan.steps.len(), metrics.row);
    if session.state.is_finished() {
        height = height.saturating_add(metrics.row);
    }
    if session.state == ToolStatus::Executing {
        height = height.saturating_add(metrics.executing_extra);
    }
    Some(height)
}

fn legacy_height(snapshot: &SessionSnapshot, metrics: &LayoutMetrics) -> Option<u32> {
    match snapshot.run_state {
        RunState::Planning | RunState::Error => Some(metrics.row),
        RunState::Executing | RunState::Done => {
            let plan = snapshot.plan.as_ref()?;
            let mut height = rows(plan.steps.len(), metrics.row);
            if snapshot.run_state == RunState::Done {
                height = height.saturating_add(metrics.row);
            }
            Some(height)
        }
        RunState::Idle => None,
    }
}

fn goal_height(snapshot: &SessionSnapshot, metrics: &LayoutMetrics) -> Option<u32> {
    if snapshot.mode != AgentMode::Goals {
        return None;
    }
    let session = snapshot.goal_session.as_ref()?;
    if session.goals.is_empty() {
        return None;
    }

    let mut height = 0u32;
    if snapshot.decomposition.is_some() {
        height = height.saturating_add(metrics.decomposition_block);
    }
    for (index, goal) in session.goals.iter().enumerate() {
        let is_current = index == session.current_goal_index;
        let shows_pipeline = (is_current && goal.status == GoalStatus::InProgress)
            || goal.status.is_settled();
        let row = match snapshot.goal_pipeline.get(&goal.id) {
            Some(pipeline) if shows_pipeline => metrics
                .pipeline_header
                .saturating_add(rows_of(pipeline.detail_rows(), metrics.row_unit))
                .saturating_add(metrics.pipeline_footer),
            _ => metrics.goal_row,
        };
        height = height.saturating_add(row);
    }
    if session.state.is_terminal() {
        height = height.saturating_add(metrics.row);
    }
    Some(height)
}
