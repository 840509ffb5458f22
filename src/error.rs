//! Error types for the suggestion bridge.
//!
//! Nothing in here ever reaches the host: the bridge converts every failure
//! into a log line and carries on with "no suggestion / no feedback".

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("Command `{command}` exited with status {status:?}: {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("Unusable command output: {0}")]
    InvalidOutput(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Host call failed: {0}")]
    Host(String),

    #[error("Failed to read config from {path}: {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to parse host event: {0}")]
    EventParse(serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config directory not found")]
    NoConfigDir,
}

pub type Result<T> = std::result::Result<T, BridgeError>;
