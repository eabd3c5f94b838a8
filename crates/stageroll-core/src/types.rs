//! Shared types used across stageroll crates.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment and stage names share the platform's path-segment alphabet.
static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9\-_]+$").expect("static pattern compiles"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid environment name: {0:?}")]
    InvalidEnvName(String),
    #[error("invalid stage name: {0:?}")]
    InvalidStageName(String),
}

/// Identity of one environment stage, e.g. `payments` / `canary`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageRef {
    pub env_name: String,
    pub stage_name: String,
}

impl StageRef {
    /// Build a stage reference, rejecting names outside `[a-zA-Z0-9_-]+`.
    pub fn parse(env_name: &str, stage_name: &str) -> Result<Self, CoreError> {
        if !NAME_PATTERN.is_match(env_name) {
            return Err(CoreError::InvalidEnvName(env_name.to_string()));
        }
        if !NAME_PATTERN.is_match(stage_name) {
            return Err(CoreError::InvalidStageName(stage_name.to_string()));
        }
        Ok(Self {
            env_name: env_name.to_string(),
            stage_name: stage_name.to_string(),
        })
    }

    /// Composite table key: `{env}/{stage}`.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.env_name, self.stage_name)
    }
}

impl fmt::Display for StageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.env_name, self.stage_name)
    }
}
