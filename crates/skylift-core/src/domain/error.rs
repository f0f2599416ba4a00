//! Construction-time error taxonomy for lifting.

use super::resource::{HostKind, ResourceKind};

/// Errors raised while binding resources onto hosts.
///
/// Every variant describes a structurally invalid application graph, so
/// callers treat them as fatal for the whole run rather than retrying.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LiftError {
    #[error("cannot lift {kind} resource {resource} onto {host_kind} host {host}: {reason}")]
    UnsupportedHost {
        resource: String,
        kind: ResourceKind,
        host: String,
        host_kind: HostKind,
        reason: String,
    },

    #[error("\"{identity}\" is not a valid {kind} identity: {reason}")]
    InvalidIdentity {
        identity: String,
        kind: ResourceKind,
        reason: String,
    },

    #[error("{kind} resources do not support operation \"{operation}\"")]
    UnknownOperation { kind: ResourceKind, operation: String },

    #[error("environment binding {name} on host {host} is already bound to another value")]
    BindingCollision { name: String, host: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for LiftError {
    fn from(err: serde_json::Error) -> Self {
        LiftError::Serialization(err.to_string())
    }
}

/// Result type for lift operations.
pub type Result<T> = std::result::Result<T, LiftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_identity_display() {
        let err = LiftError::InvalidIdentity {
            identity: "arn:aws:s3:::bucket".to_string(),
            kind: ResourceKind::Secret,
            reason: "expected service secretsmanager".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("arn:aws:s3:::bucket"));
        assert!(msg.contains("secret"));
    }

    #[test]
    fn test_unsupported_host_display() {
        let err = LiftError::UnsupportedHost {
            resource: "root/env0/Counter".to_string(),
            kind: ResourceKind::Counter,
            host: "root/env0/Website".to_string(),
            host_kind: HostKind::Website,
            reason: "host cannot accept grants".to_string(),
        };
        assert!(err.to_string().contains("website host root/env0/Website"));
    }
}
