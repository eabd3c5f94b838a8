//! redb table definitions for the stageroll state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Stage bindings keyed by `{env}/{stage}`.
pub const STAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("stages");

/// Schedules keyed by schedule id.
pub const SCHEDULES: TableDefinition<&str, &[u8]> = TableDefinition::new("schedules");
