//! Domain types for the stageroll state store.
//!
//! These types represent the persisted session schedules and the
//! environment-stage bindings that reference them. All types are
//! serializable to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};
use stageroll_core::StageRef;

/// Opaque unique identifier for a schedule.
pub type ScheduleId = String;

// ── Schedule ───────────────────────────────────────────────────────

/// Progress state of a schedule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleState {
    /// Sessions remain before the final one.
    #[default]
    Running,
    /// Working on the final session.
    Final,
}

impl ScheduleState {
    /// State implied by a session position.
    pub fn for_progress(current_session: u32, total_sessions: u32) -> Self {
        if current_session >= total_sessions {
            Self::Final
        } else {
            Self::Running
        }
    }
}

/// Multi-session rollout schedule for one environment stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schedule {
    pub id: ScheduleId,
    /// Wait durations between sessions, encoded by the caller.
    pub cooldown_times: String,
    /// Host counts per session, encoded by the caller.
    pub host_numbers: String,
    pub total_sessions: u32,
    pub current_session: u32,
    pub state: ScheduleState,
    /// Unix timestamp (milliseconds) of the last state or session change.
    pub state_start_time: u64,
}

impl Schedule {
    /// A fresh schedule positioned before its first session.
    pub fn new(
        id: ScheduleId,
        cooldown_times: String,
        host_numbers: String,
        total_sessions: u32,
        now_ms: u64,
    ) -> Self {
        Self {
            id,
            cooldown_times,
            host_numbers,
            total_sessions,
            current_session: 0,
            state: ScheduleState::for_progress(0, total_sessions),
            state_start_time: now_ms,
        }
    }

    /// A copy carrying new session parameters. Session progress is kept.
    pub fn reconfigured(
        &self,
        cooldown_times: String,
        host_numbers: String,
        total_sessions: u32,
        now_ms: u64,
    ) -> Self {
        Self {
            id: self.id.clone(),
            cooldown_times,
            host_numbers,
            total_sessions,
            current_session: self.current_session,
            state: ScheduleState::for_progress(self.current_session, total_sessions),
            state_start_time: now_ms,
        }
    }

    pub fn is_final(&self) -> bool {
        self.state == ScheduleState::Final
    }
}

// ── Stage binding ──────────────────────────────────────────────────

/// Association between an environment stage and its active schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageBinding {
    pub env_name: String,
    pub stage_name: String,
    /// `None` when the stage has no active schedule.
    pub schedule_id: Option<ScheduleId>,
}

impl StageBinding {
    /// An unbound record for a newly registered stage.
    pub fn new(stage: &StageRef) -> Self {
        Self {
            env_name: stage.env_name.clone(),
            stage_name: stage.stage_name.clone(),
            schedule_id: None,
        }
    }

    pub fn bound_to(&self, schedule_id: ScheduleId) -> Self {
        Self {
            schedule_id: Some(schedule_id),
            ..self.clone()
        }
    }

    pub fn unbound(&self) -> Self {
        Self {
            schedule_id: None,
            ..self.clone()
        }
    }

    pub fn stage(&self) -> StageRef {
        StageRef {
            env_name: self.env_name.clone(),
            stage_name: self.stage_name.clone(),
        }
    }

    /// Composite key: `{env}/{stage}`.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.env_name, self.stage_name)
    }
}
