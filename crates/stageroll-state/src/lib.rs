//! stageroll-state — embedded state store for stageroll.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for session schedules and the environment-stage bindings that
//! point at them.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Stage bindings are keyed by `{env}/{stage}`, schedules by their id.
//!
//! Schedule lifecycle code talks to the store through the narrow
//! [`ScheduleStore`] and [`EnvironmentBindingStore`] traits, always inside a
//! [`StageRepository::atomically`] unit so that every read-modify-write is
//! one redb write transaction.

pub mod error;
pub mod repo;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use repo::{EnvironmentBindingStore, ScheduleStore, StageRepository, StageTxn};
pub use store::StateStore;
pub use types::*;
