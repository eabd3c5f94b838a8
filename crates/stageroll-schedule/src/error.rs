//! Schedule lifecycle error types.

use stageroll_core::CoreError;
use stageroll_state::StateError;
use thiserror::Error;

/// Errors surfaced by the schedule manager and session state machine.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// A stage, binding or schedule required by the operation is missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller-correctable input problem.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("state store error: {0}")]
    Store(StateError),
}

impl From<StateError> for ScheduleError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::NotFound(what) => Self::NotFound(what),
            other => Self::Store(other),
        }
    }
}

impl From<CoreError> for ScheduleError {
    fn from(err: CoreError) -> Self {
        Self::Validation(err.to_string())
    }
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
