pub mod config;
pub mod types;

pub use config::StagerollConfig;
pub use types::*;
