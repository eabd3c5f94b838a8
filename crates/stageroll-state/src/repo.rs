//! Store interfaces consumed by the schedule lifecycle.
//!
//! Writes only happen through a [`StageTxn`] handed out by
//! [`StageRepository::atomically`]; the whole closure commits or nothing does.

use stageroll_core::StageRef;

use crate::error::{StateError, StateResult};
use crate::types::{Schedule, StageBinding};

/// Schedule persistence keyed by schedule id.
pub trait ScheduleStore {
    fn get_schedule(&self, id: &str) -> StateResult<Option<Schedule>>;

    /// Fails with [`StateError::Conflict`] if the id is already taken.
    fn insert_schedule(&mut self, schedule: &Schedule) -> StateResult<()>;

    /// Fails with [`StateError::NotFound`] if no schedule has this id.
    fn update_schedule(&mut self, schedule: &Schedule, id: &str) -> StateResult<()>;

    /// Returns true if the schedule existed.
    fn delete_schedule(&mut self, id: &str) -> StateResult<bool>;
}

/// Stage-to-schedule bindings keyed by `(env, stage)`.
pub trait EnvironmentBindingStore {
    fn get_binding(&self, stage: &StageRef) -> StateResult<Option<StageBinding>>;

    /// Fails with [`StateError::NotFound`] if the stage was never registered.
    fn update_binding(&mut self, binding: &StageBinding) -> StateResult<()>;
}

/// Both stores viewed through one open transaction.
pub trait StageTxn: ScheduleStore + EnvironmentBindingStore {}

impl<T: ScheduleStore + EnvironmentBindingStore> StageTxn for T {}

/// Transaction boundary over schedules and bindings.
pub trait StageRepository: Send + Sync {
    /// Run `op` inside one write transaction. Commits on `Ok`, aborts on `Err`.
    fn atomically<T, E, F>(&self, op: F) -> Result<T, E>
    where
        E: From<StateError>,
        F: FnOnce(&mut dyn StageTxn) -> Result<T, E>;

    /// Read a schedule outside any write transaction.
    fn schedule(&self, id: &str) -> StateResult<Option<Schedule>>;

    /// Read a stage binding outside any write transaction.
    fn binding(&self, stage: &StageRef) -> StateResult<Option<StageBinding>>;
}
