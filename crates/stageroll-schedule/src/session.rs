//! Session state machine — advances a schedule to its next session or
//! marks it as working on the final one.
//!
//! This is the manual override path: it skips whatever cooldown is pending
//! and moves on immediately. Each call is one read-modify-write inside a
//! single store transaction, so concurrent overrides never lose a session.

use std::sync::Arc;

use stageroll_core::StageRef;
use stageroll_state::{Schedule, ScheduleState, StageRepository, StageTxn};
use tracing::{Span, info, info_span};

use crate::clock::{Clock, SystemClock};
use crate::error::{ScheduleError, ScheduleResult};

/// Which branch of the state machine a call took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Moved on to `session`.
    Advanced { session: u32 },
    /// Already on the last session; only the state timestamp moved.
    Finalized,
}

/// Compute the successor of `schedule` at time `now_ms`.
///
/// A schedule short of its last session moves to the next one, and lands in
/// `Final` when that next session is the last. A schedule already on its
/// last session stays there in `Final`. The timestamp is always refreshed.
pub fn transition(schedule: &Schedule, now_ms: u64) -> (Schedule, Transition) {
    if schedule.current_session >= schedule.total_sessions {
        let next = Schedule {
            state: ScheduleState::Final,
            state_start_time: now_ms,
            ..schedule.clone()
        };
        return (next, Transition::Finalized);
    }

    let session = schedule.current_session + 1;
    let next = Schedule {
        current_session: session,
        state: ScheduleState::for_progress(session, schedule.total_sessions),
        state_start_time: now_ms,
        ..schedule.clone()
    };
    (next, Transition::Advanced { session })
}

/// Drives session progression for bound schedules.
#[derive(Clone)]
pub struct SessionStateMachine<S> {
    store: S,
    clock: Arc<dyn Clock>,
    span: Span,
}

impl<S: StageRepository> SessionStateMachine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            span: info_span!("session_state_machine"),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the span all transitions are recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Advance (or finalize) the schedule bound to `stage`.
    ///
    /// Fails with [`ScheduleError::NotFound`] if the stage is unknown or has
    /// no schedule bound.
    pub fn advance_or_finalize(&self, stage: &StageRef) -> ScheduleResult<Schedule> {
        self.store.atomically(|txn| -> ScheduleResult<Schedule> {
            let binding = txn.get_binding(stage)?.ok_or_else(|| {
                ScheduleError::NotFound(format!("environment stage {stage}"))
            })?;
            let id = binding.schedule_id.ok_or_else(|| {
                ScheduleError::NotFound(format!("no schedule bound to {stage}"))
            })?;
            self.step(txn, &id)
        })
    }

    /// Advance (or finalize) a schedule addressed directly by id.
    pub fn advance_schedule(&self, schedule_id: &str) -> ScheduleResult<Schedule> {
        self.store
            .atomically(|txn| -> ScheduleResult<Schedule> { self.step(txn, schedule_id) })
    }

    fn step(&self, txn: &mut dyn StageTxn, id: &str) -> ScheduleResult<Schedule> {
        let current = txn
            .get_schedule(id)?
            .ok_or_else(|| ScheduleError::NotFound(format!("schedule {id}")))?;
        let (next, step) = transition(&current, self.clock.now_ms());
        txn.update_schedule(&next, id)?;

        match step {
            Transition::Advanced { session } => info!(
                parent: &self.span,
                schedule = %id,
                session,
                total_sessions = next.total_sessions,
                state = ?next.state,
                "overrode current session, now working on session {session}"
            ),
            Transition::Finalized => info!(
                parent: &self.span,
                schedule = %id,
                session = next.current_session,
                "overrode current session, working on the final session"
            ),
        }
        Ok(next)
    }
}
