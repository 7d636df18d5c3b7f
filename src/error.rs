//! Closed error taxonomy for the replication pipeline.
//!
//! Every fallible operation in this crate eventually surfaces a
//! [`ReplicationError`] carrying a stable [`ErrorKind`], a human message, and
//! optional structured detail for callers that want to inspect it
//! programmatically (e.g. the CLI's JSON output mode).

use serde::Serialize;
use std::fmt;

/// Closed set of error kinds. Mirrors the wire-level classification the
/// backend adapter and pipeline agree on; do not add variants without also
/// updating the CLI's exit-code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Transport,
    RateLimit,
    DuplicateName,
    AnalysisFailed,
    CircularDependency,
    MissingDependency,
    CreationFailed,
    ValidationFailed,
    WorkflowAborted,
    StateInvalid,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Transport => "transport",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::DuplicateName => "duplicate_name",
            ErrorKind::AnalysisFailed => "analysis_failed",
            ErrorKind::CircularDependency => "circular_dependency",
            ErrorKind::MissingDependency => "missing_dependency",
            ErrorKind::CreationFailed => "creation_failed",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::WorkflowAborted => "workflow_aborted",
            ErrorKind::StateInvalid => "state_invalid",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Default recoverability for a kind when a component doesn't override
    /// it per-instance via [`ReplicationError::recoverable`]. Only
    /// `rate_limit` and `duplicate_name` are retried/skipped by the Builder
    /// without aborting the run.
    pub fn default_recoverable(&self) -> bool {
        matches!(self, ErrorKind::RateLimit | ErrorKind::DuplicateName)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A structured error produced anywhere in the pipeline.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("[{component}] {kind}: {message}")]
pub struct ReplicationError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub recoverable: bool,
    pub component: &'static str,
}

impl ReplicationError {
    pub fn new(kind: ErrorKind, component: &'static str, message: impl Into<String>) -> Self {
        let recoverable = kind.default_recoverable();
        ReplicationError {
            kind,
            message: message.into(),
            details: None,
            recoverable,
            component,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    pub fn invalid_input(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, component, message)
    }

    pub fn not_found(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, component, message)
    }

    pub fn transport(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, component, message)
    }

    pub fn rate_limit(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, component, message)
    }

    pub fn duplicate_name(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DuplicateName, component, message)
    }

    pub fn analysis_failed(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AnalysisFailed, component, message)
    }

    pub fn circular_dependency(component: &'static str, cycle: &[String]) -> Self {
        Self::new(
            ErrorKind::CircularDependency,
            component,
            format!("circular dependency: {}", cycle.join(" -> ")),
        )
        .with_details(serde_json::json!({ "cycle": cycle }))
    }

    pub fn missing_dependency(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingDependency, component, message)
    }

    pub fn creation_failed(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CreationFailed, component, message)
    }

    pub fn validation_failed(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationFailed, component, message)
    }

    pub fn workflow_aborted(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::WorkflowAborted, component, message)
    }

    pub fn state_invalid(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StateInvalid, component, message)
    }

    /// Best-effort classification of a raw backend error message, per
    /// spec §6: substring-based, case-insensitive.
    pub fn classify_transport_message(component: &'static str, message: &str) -> Self {
        let lower = message.to_lowercase();
        let is_rate_limited = lower.contains("429")
            || lower.contains("rate")
            || lower.contains("quota")
            || lower.contains("too many requests")
            || lower.contains("exceeded")
            || (lower.contains("403") && (lower.contains("rate") || lower.contains("quota")));
        if is_rate_limited {
            Self::rate_limit(component, message.to_string())
        } else {
            Self::transport(component, message.to_string())
        }
    }
}

impl From<anyhow::Error> for ReplicationError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ReplicationError>() {
            Ok(replication_err) => replication_err,
            Err(err) => ReplicationError::new(ErrorKind::Unknown, "unknown", err.to_string()),
        }
    }
}

/// Result type used across the pipeline's public APIs.
pub type ReplicationResult<T> = std::result::Result<T, ReplicationError>;
