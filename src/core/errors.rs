use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidTargetError {
    #[error("target is empty")]
    Empty,

    #[error("target contains a path traversal sequence: {0}")]
    PathTraversal(String),

    #[error("target is neither a domain name, an IP address nor a CIDR range: {0}")]
    Unrecognized(String),
}

/// Failure of a single adapter invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AdapterError {
    #[error("timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    #[error("executable not found: {executable}")]
    ExecutableNotFound { executable: String },

    #[error("exited with {}: {stderr_tail}", exit_label(.code))]
    NonZeroExit {
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("unrecognized output format ({skipped} lines rejected)")]
    ParseFailure { skipped: usize },

    #[error("failed to spawn process: {0}")]
    Spawn(String),

    #[error("invalid adapter configuration: {0}")]
    InvalidConfig(String),

    #[error("cancelled")]
    Cancelled,
}

impl AdapterError {
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::Timeout { .. } => "timeout",
            AdapterError::ExecutableNotFound { .. } => "executable_not_found",
            AdapterError::NonZeroExit { .. } => "non_zero_exit",
            AdapterError::ParseFailure { .. } => "parse_failure",
            AdapterError::Spawn(_) => "spawn",
            AdapterError::InvalidConfig(_) => "invalid_config",
            AdapterError::Cancelled => "cancelled",
        }
    }

    /// The adapter could not run at all, so no retry within the run can help.
    pub fn is_outright(&self) -> bool {
        matches!(
            self,
            AdapterError::ExecutableNotFound { .. } | AdapterError::InvalidConfig(_)
        )
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// An adapter error attributed to the tool and input that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterFailure {
    pub tool: String,
    pub subject: String,
    pub error: AdapterError,
}

#[derive(Error, Debug, Clone)]
pub enum StageError {
    #[error("stage {stage} failed: every adapter failed outright")]
    Fatal {
        stage: String,
        failures: Vec<AdapterFailure>,
    },

    #[error("stage {stage} was interrupted")]
    Cancelled { stage: String },
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("checkpoint {path:?} is corrupt: {reason}")]
    CheckpointCorrupt { path: PathBuf, reason: String },

    #[error("workspace {path:?} is not writable: {source}")]
    WorkspaceUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),
}
