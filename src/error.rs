// ABOUTME: Application-wide error types for convoy.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

use crate::deploy::DeployError;
use crate::history::HistoryError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("environment not configured: {0}")]
    UnknownEnvironment(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("another orchestrator holds {path} ({holder}, pid {pid}, since {since})")]
    LockHeld {
        path: PathBuf,
        holder: String,
        pid: u32,
        since: String,
    },

    #[error("deployment {id} ended {state}")]
    DeploymentUnsuccessful { id: String, state: String },

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
