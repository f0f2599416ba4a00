//! Trace events emitted by resources during execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Verbose,
}

impl LogLevel {
    /// Bracketed tag used by the console renderer.
    pub fn tag(&self) -> &'static str {
        match self {
            LogLevel::Error => "[ERROR]",
            LogLevel::Warning => "[WARNING]",
            LogLevel::Info => "[INFO]",
            LogLevel::Verbose => "[VERBOSE]",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warning => write!(f, "warning"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Verbose => write!(f, "verbose"),
        }
    }
}

/// Where a trace came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceType {
    /// User code called `log`.
    Log,
    /// A resource performed an operation.
    Resource,
    /// Simulator lifecycle.
    Simulator,
}

/// Payload of a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceData {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A structured record emitted synchronously by a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEvent {
    pub source_path: String,
    pub source_type: String,
    #[serde(rename = "type")]
    pub trace_type: TraceType,
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    pub data: TraceData,
}

impl TraceEvent {
    pub fn new(
        source_path: impl Into<String>,
        source_type: impl Into<String>,
        trace_type: TraceType,
        level: LogLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            source_type: source_type.into(),
            trace_type,
            level,
            timestamp: Utc::now(),
            data: TraceData {
                message: message.into(),
                error: None,
                extra: serde_json::Map::new(),
            },
        }
    }

    /// A `log` call from inflight code.
    pub fn log(source_path: &str, source_type: &str, message: impl Into<String>) -> Self {
        Self::new(source_path, source_type, TraceType::Log, LogLevel::Info, message)
    }

    /// An operation performed by a resource. Verbose, hidden outside debug mode.
    pub fn resource(source_path: &str, source_type: &str, message: impl Into<String>) -> Self {
        Self::new(
            source_path,
            source_type,
            TraceType::Resource,
            LogLevel::Verbose,
            message,
        )
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.level = LogLevel::Error;
        self.data.error = Some(error.into());
        self
    }
}
