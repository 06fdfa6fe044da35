use std::error::Error as StdError;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::api::ApiError;
use crate::host::HostError;
use crate::mapper::MappingError;
use crate::state_machine::CourseStatus;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("OpenSesame API error: {0}")]
    Api(#[from] ApiError),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    /// Host data is in a state the pipeline refuses to repair on its own.
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// A step declined to proceed; the course stays where it is.
    #[error("{0}")]
    Halted(String),

    #[error("No next step from {0}")]
    NoNextStep(CourseStatus),

    #[error("Could not acquire lock {name} within {waited:?}")]
    LockTimeout { name: String, waited: Duration },

    #[error("State file lock {} is held by another process", .0.display())]
    StateLocked(PathBuf),

    #[error("Task queue is blocked after repeated failures")]
    QueueBlocked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Render an error and every source beneath it, outermost first.
pub fn error_chain(err: &dyn StdError) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
