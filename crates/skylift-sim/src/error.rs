//! Simulator and inflight error types.

use skylift_core::{LiftError, Operation, ResourceKind};

/// Lifecycle state of a [`crate::Simulator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimState {
    Constructed,
    Started,
    Stopped,
}

impl std::fmt::Display for SimState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimState::Constructed => write!(f, "constructed"),
            SimState::Started => write!(f, "started"),
            SimState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Errors produced while building or driving a simulated application.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Lift(#[from] LiftError),

    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error("cannot {operation} while the simulator is {state}")]
    InvalidState {
        operation: &'static str,
        state: SimState,
    },

    #[error("dependency cycle between resources: {}", .paths.join(", "))]
    DependencyCycle { paths: Vec<String> },

    #[error("failed to start {path}: {reason}")]
    Init { path: String, reason: String },

    #[error("{} resource(s) failed to stop: {}", .errors.len(), .errors.join("; "))]
    Teardown { errors: Vec<String> },

    #[error("no handler registered under \"{name}\" (needed by {path})")]
    MissingHandler { name: String, path: String },

    #[error("no resource at {0}")]
    UnknownResource(String),

    #[error("no test at {0}")]
    UnknownTest(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SimError {
    /// Errors describing a structurally invalid application graph.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            SimError::Lift(_) | SimError::Manifest(_) | SimError::DependencyCycle { .. }
        )
    }
}

/// Result type for simulator operations.
pub type SimResult<T> = std::result::Result<T, SimError>;

/// Errors raised by inflight code and the clients it uses.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InflightError {
    #[error("{host} is not allowed to call {operation} on {identity}")]
    AccessDenied {
        host: String,
        identity: String,
        operation: Operation,
    },

    #[error("\"{alias}\" is not lifted onto {host}")]
    Unbound { alias: String, host: String },

    #[error("\"{alias}\" is a {actual}, not a {expected}")]
    KindMismatch {
        alias: String,
        expected: ResourceKind,
        actual: ResourceKind,
    },

    #[error("{identity} is not running")]
    NotRunning { identity: String },

    #[error("{resource} does not support {operation} on this target")]
    Unsupported { resource: String, operation: String },

    #[error("invalid arguments to {operation}: {reason}")]
    InvalidArgument { operation: Operation, reason: String },

    #[error("{0}")]
    Failed(String),
}

impl InflightError {
    pub fn failed(message: impl Into<String>) -> Self {
        InflightError::Failed(message.into())
    }
}

/// Result type for inflight calls.
pub type InflightResult<T> = std::result::Result<T, InflightError>;
