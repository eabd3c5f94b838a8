//! stageroll schedules — session-based rollout schedules per environment stage.
//!
//! A schedule splits a stage's rollout into `total_sessions` batches and
//! tracks which one is in progress. This crate owns the two pieces of domain
//! logic on top of the state store.
//!
//! # Components
//!
//! - **`manager`** — create/update/delete a stage's schedule and its binding
//! - **`session`** — advance or finalize the session state machine
//! - **`clock`** — injected time and id sources

pub mod clock;
pub mod error;
pub mod manager;
pub mod session;

pub use clock::{Clock, FixedClock, IdGenerator, SystemClock, UuidIds};
pub use error::{ScheduleError, ScheduleResult};
pub use manager::{ConfigureOutcome, ScheduleManager, ScheduleRequest};
pub use session::{SessionStateMachine, Transition};
