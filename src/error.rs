//! Error types for pentrail.
//!
//! Every failure inside the engine is an [`Error`]. When a failure ends a
//! scan, the pipeline condenses it into a serializable
//! [`ScanFailure`](crate::model::ScanFailure) whose [`FailureKind`] is taken
//! from [`Error::kind`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using the pentrail [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Scanning ===
    #[error("invalid port range {low}-{high}: ports must satisfy 1 <= low <= high <= 65535")]
    InvalidRange { low: u16, high: u16 },

    #[error("invalid target '{0}'")]
    InvalidTarget(String),

    #[error("failed to resolve {host}: {reason}")]
    Resolution { host: String, reason: String },

    #[error("{module} failed: {message}")]
    Module { module: String, message: String },

    #[error("scan cancelled")]
    Cancelled,

    // === External tools ===
    #[error("{tool} is not installed or not found in PATH")]
    ToolUnavailable { tool: String },

    #[error("{tool} failed: {detail}")]
    ToolExecutionFailed { tool: String, detail: String },

    #[error("failed to parse {tool} output: {detail}")]
    ResultParse { tool: String, detail: String },

    // === Collaborators ===
    #[error("report rendering failed: {0}")]
    Report(String),

    #[error("notification failed: {0}")]
    Notify(String),

    #[error("scope provider failed: {0}")]
    Scope(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // === IO / serialization ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn module(module: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Module {
            module: module.into(),
            message: message.into(),
        }
    }

    /// The failure category recorded on a scan that this error terminated.
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::InvalidRange { .. } => FailureKind::InvalidRange,
            Error::Resolution { .. } => FailureKind::ResolutionFailure,
            Error::Cancelled => FailureKind::Cancelled,
            Error::ToolUnavailable { .. } => FailureKind::ToolUnavailable,
            Error::ToolExecutionFailed { .. } => FailureKind::ToolExecutionFailed,
            Error::ResultParse { .. } => FailureKind::ResultParseError,
            _ => FailureKind::ModuleFailure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidRange,
    ResolutionFailure,
    ModuleFailure,
    ToolUnavailable,
    ToolExecutionFailed,
    ResultParseError,
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidRange => "invalid_range",
            FailureKind::ResolutionFailure => "resolution_failure",
            FailureKind::ModuleFailure => "module_failure",
            FailureKind::ToolUnavailable => "tool_unavailable",
            FailureKind::ToolExecutionFailed => "tool_execution_failed",
            FailureKind::ResultParseError => "result_parse_error",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
