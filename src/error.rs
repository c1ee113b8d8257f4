//! Error taxonomy for remote calls and engine runs.
//!
//! [`RemoteError`] is what a [`RemoteTreeMatchClient`](crate::client::RemoteTreeMatchClient)
//! returns. The engine splits it in two: fatal faults (authentication, transport)
//! abort the run as an [`EngineError`], service faults become a [`FileFault`] in
//! the run report and the pass moves on.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Failure of a single remote operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("service fault: {0}")]
    Service(String),
}

impl RemoteError {
    /// Authentication and transport faults make every later call fail the same way.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RemoteError::Authentication(_) | RemoteError::Transport(_))
    }

    pub fn message(&self) -> &str {
        match self {
            RemoteError::Authentication(m) | RemoteError::Transport(m) | RemoteError::Service(m) => m,
        }
    }

    /// True when a service fault reads like a permission rejection.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, RemoteError::Service(m) if permission_pattern().is_match(m))
    }
}

fn permission_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(permission|not authori[sz]ed|forbidden|access denied|insufficient privilege)")
            .expect("permission pattern is valid")
    })
}

/// Failure that stops an engine run (or its construction).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("identification did not converge after {passes} passes")]
    Convergence { passes: u32 },

    #[error("run cancelled during pass {pass}")]
    Cancelled { pass: u32 },

    #[error("insufficient permission: {count} operation(s) rejected, first at {first_path}")]
    InsufficientPermission { count: usize, first_path: String },
}

impl From<RemoteError> for EngineError {
    /// Service faults have no run-level variant and map to `Transport`.
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Authentication(m) => EngineError::Authentication(m),
            RemoteError::Transport(m) | RemoteError::Service(m) => EngineError::Transport(m),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Service,
    InsufficientPermission,
    Refresh,
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultKind::Service => write!(f, "service"),
            FaultKind::InsufficientPermission => write!(f, "permission"),
            FaultKind::Refresh => write!(f, "refresh"),
        }
    }
}

/// A non-fatal fault recorded against a file (or batch parent path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFault {
    pub path: String,
    pub kind: FaultKind,
    pub message: String,
}

impl FileFault {
    pub fn from_service(path: &str, err: &RemoteError) -> Self {
        let kind = if err.is_permission_denied() {
            FaultKind::InsufficientPermission
        } else {
            FaultKind::Service
        };
        Self {
            path: path.to_string(),
            kind,
            message: err.message().to_string(),
        }
    }
}
