//! Schedule manager — owns the create/update/delete lifecycle of a stage's
//! schedule and the stage binding that points at it.
//!
//! Every `configure` call is one [`StageRepository::atomically`] unit: the
//! binding check and the resulting insert+bind, update, or delete+unbind
//! commit together or not at all.

use std::sync::Arc;

use stageroll_core::StageRef;
use stageroll_state::{Schedule, ScheduleId, StageRepository};
use tracing::{Span, debug, info, info_span, warn};

use crate::clock::{Clock, IdGenerator, SystemClock, UuidIds};
use crate::error::{ScheduleError, ScheduleResult};

/// Desired schedule parameters for a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRequest {
    pub cooldown_times: String,
    pub host_numbers: String,
    /// Zero or negative removes the stage's schedule.
    pub total_sessions: i32,
}

/// What a `configure` call did to the stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigureOutcome {
    /// A new schedule was inserted and bound to the stage.
    Created(Schedule),
    /// The bound schedule was reconfigured in place.
    Updated(Schedule),
    /// The bound schedule was removed and the binding cleared.
    Deleted { schedule_id: ScheduleId },
    /// Nothing was bound and nothing was requested.
    Unchanged,
}

/// Creates, updates and deletes schedules bound to environment stages.
#[derive(Clone)]
pub struct ScheduleManager<S> {
    store: S,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    span: Span,
}

impl<S: StageRepository> ScheduleManager<S> {
    /// Create a manager using the system clock and random UUID ids.
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidIds),
            span: info_span!("schedule_manager"),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Set the span all lifecycle events are recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Apply `request` to the stage's schedule.
    ///
    /// With `total_sessions > 0` the stage's schedule is created (if none is
    /// bound) or reconfigured in place, keeping its current session. With
    /// `total_sessions <= 0` a bound schedule is deleted and the binding
    /// cleared; an unbound stage is left alone.
    pub fn configure(
        &self,
        stage: &StageRef,
        request: ScheduleRequest,
    ) -> ScheduleResult<ConfigureOutcome> {
        let outcome = self
            .store
            .atomically(|txn| -> ScheduleResult<ConfigureOutcome> {
                let binding = txn.get_binding(stage)?.ok_or_else(|| {
                    ScheduleError::NotFound(format!("environment stage {stage}"))
                })?;
                let now = self.clock.now_ms();

                if request.total_sessions > 0 {
                    let total_sessions = request.total_sessions.unsigned_abs();
                    match &binding.schedule_id {
                        None => {
                            let schedule = Schedule::new(
                                self.ids.next_id(),
                                request.cooldown_times,
                                request.host_numbers,
                                total_sessions,
                                now,
                            );
                            txn.update_binding(&binding.bound_to(schedule.id.clone()))?;
                            txn.insert_schedule(&schedule)?;
                            Ok(ConfigureOutcome::Created(schedule))
                        }
                        Some(id) => {
                            let existing = txn.get_schedule(id)?.ok_or_else(|| {
                                ScheduleError::NotFound(format!("schedule {id} bound to {stage}"))
                            })?;
                            if total_sessions < existing.current_session {
                                return Err(ScheduleError::Validation(format!(
                                    "total_sessions {total_sessions} is below current session {}",
                                    existing.current_session
                                )));
                            }
                            let updated = existing.reconfigured(
                                request.cooldown_times,
                                request.host_numbers,
                                total_sessions,
                                now,
                            );
                            txn.update_schedule(&updated, id)?;
                            Ok(ConfigureOutcome::Updated(updated))
                        }
                    }
                } else if let Some(id) = &binding.schedule_id {
                    if !txn.delete_schedule(id)? {
                        warn!(
                            parent: &self.span,
                            schedule = %id,
                            %stage,
                            "bound schedule was already gone"
                        );
                    }
                    txn.update_binding(&binding.unbound())?;
                    Ok(ConfigureOutcome::Deleted {
                        schedule_id: id.clone(),
                    })
                } else {
                    Ok(ConfigureOutcome::Unchanged)
                }
            })?;

        match &outcome {
            ConfigureOutcome::Created(schedule) => info!(
                parent: &self.span,
                env = %stage.env_name,
                stage = %stage.stage_name,
                schedule = %schedule.id,
                total_sessions = schedule.total_sessions,
                "schedule created"
            ),
            ConfigureOutcome::Updated(schedule) => info!(
                parent: &self.span,
                env = %stage.env_name,
                stage = %stage.stage_name,
                schedule = %schedule.id,
                total_sessions = schedule.total_sessions,
                current_session = schedule.current_session,
                "schedule updated"
            ),
            ConfigureOutcome::Deleted { schedule_id } => info!(
                parent: &self.span,
                env = %stage.env_name,
                stage = %stage.stage_name,
                schedule = %schedule_id,
                "schedule deleted"
            ),
            ConfigureOutcome::Unchanged => debug!(
                parent: &self.span,
                env = %stage.env_name,
                stage = %stage.stage_name,
                "no schedule to remove"
            ),
        }

        Ok(outcome)
    }

    /// Look up a schedule by id.
    pub fn get(&self, schedule_id: &str) -> ScheduleResult<Schedule> {
        let schedule = self
            .store
            .schedule(schedule_id)?
            .ok_or_else(|| ScheduleError::NotFound(format!("schedule {schedule_id}")))?;
        debug!(parent: &self.span, ?schedule, "schedule read");
        Ok(schedule)
    }
}
