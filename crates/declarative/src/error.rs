//! Error taxonomy for reconciliation.
//!
//! Errors are categorized so the executor can decide what to retry locally
//! and what to surface to the host. Every resource-scoped variant carries
//! the kind and id of the offending resource.

use std::fmt;
use thiserror::Error;

/// Categories of reconciliation errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Resource does not exist remotely
    NotFound,
    /// Resource already exists or clashes with another
    Conflict,
    /// Write was based on a stale version token
    VersionMismatch,
    /// Spec failed schema validation or was rejected by the remote
    Validation,
    /// Change touches a field that cannot be updated after creation
    Immutable,
    /// Dependency graph contains a cycle
    Cycle,
    /// Transient remote failure (timeout, unavailable)
    Transient,
    /// Remote answered with something undecodable
    Protocol,
    /// Destroy verification found a leftover resource
    NotDestroyed,
}

impl ErrorCategory {
    /// Whether this category is transient and worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Resource not found",
            Self::Conflict => "Resource conflict",
            Self::VersionMismatch => "Stale version token",
            Self::Validation => "Invalid resource specification",
            Self::Immutable => "Immutable field changed",
            Self::Cycle => "Dependency cycle",
            Self::Transient => "Remote temporarily unavailable",
            Self::Protocol => "Unexpected remote response",
            Self::NotDestroyed => "Resource not destroyed",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::NotFound => "Check the resource kind and identifier exist on the server",
            Self::Conflict => "Import the existing resource or choose a different name",
            Self::VersionMismatch => "Another writer changed the resource; re-run to re-plan",
            Self::Validation => "Fix the attribute named in the message and re-run",
            Self::Immutable => "Recreate the resource instead of updating it in place",
            Self::Cycle => "Remove one of the depends_on edges listed in the message",
            Self::Transient => "Check server connectivity and try again",
            Self::Protocol => "Check the server version matches the supported API",
            Self::NotDestroyed => "Inspect the server for dependents that recreate the resource",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// What was found when a destroyed resource is still reported by the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Residue {
    /// Still exists with the attributes it had before the delete
    StillPresent,
    /// Exists, but the remote reports different attributes than last known
    RemoteMutated { fields: Vec<String> },
}

impl fmt::Display for Residue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StillPresent => write!(f, "still exists with its old attributes"),
            Self::RemoteMutated { fields } => {
                write!(f, "exists but was mutated remotely ({})", fields.join(", "))
            }
        }
    }
}

/// Errors that can occur while planning or executing a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The remote system has no such resource
    #[error("{kind} '{id}' not found")]
    NotFound { kind: String, id: String },

    /// The remote system already holds a clashing resource
    #[error("{kind} '{id}' conflicts with an existing resource: {message}")]
    Conflict {
        kind: String,
        id: String,
        message: String,
    },

    /// The version token sent with a write is stale
    #[error("{kind} '{id}' was modified concurrently (sent version {version})")]
    VersionMismatch {
        kind: String,
        id: String,
        version: String,
    },

    /// The spec is malformed or was rejected by the remote
    #[error("invalid {kind} '{id}': {message}")]
    Validation {
        kind: String,
        id: String,
        message: String,
    },

    /// The diff touches fields that cannot change after creation
    #[error("{kind} '{id}' cannot be updated in place: immutable field(s) changed: {}", .fields.join(", "))]
    ImmutableFieldChanged {
        kind: String,
        id: String,
        fields: Vec<String>,
    },

    /// The dependency graph of the batch is cyclic
    #[error("dependency cycle detected: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    /// A remote call did not complete in time
    #[error("timed out during {operation} of {kind} '{id}'")]
    RemoteTimeout {
        kind: String,
        id: String,
        operation: String,
    },

    /// The remote system could not be reached or failed internally
    #[error("remote unavailable for {kind} '{id}': {message}")]
    RemoteUnavailable {
        kind: String,
        id: String,
        message: String,
    },

    /// The remote answered in a shape that could not be decoded
    #[error("unexpected response for {kind} '{id}': {message}")]
    Protocol {
        kind: String,
        id: String,
        message: String,
    },

    /// Destroy verification found the resource still present
    #[error("{kind} '{id}' was not destroyed: {residue}")]
    ResourceNotDestroyed {
        kind: String,
        id: String,
        residue: Residue,
    },
}

impl Error {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn validation(
        kind: impl Into<String>,
        id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            kind: kind.into(),
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn timeout(
        kind: impl Into<String>,
        id: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self::RemoteTimeout {
            kind: kind.into(),
            id: id.into(),
            operation: operation.into(),
        }
    }

    pub fn unavailable(
        kind: impl Into<String>,
        id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::RemoteUnavailable {
            kind: kind.into(),
            id: id.into(),
            message: message.into(),
        }
    }

    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Conflict { .. } => ErrorCategory::Conflict,
            Error::VersionMismatch { .. } => ErrorCategory::VersionMismatch,
            Error::Validation { .. } => ErrorCategory::Validation,
            Error::ImmutableFieldChanged { .. } => ErrorCategory::Immutable,
            Error::DependencyCycle { .. } => ErrorCategory::Cycle,
            Error::RemoteTimeout { .. } | Error::RemoteUnavailable { .. } => {
                ErrorCategory::Transient
            }
            Error::Protocol { .. } => ErrorCategory::Protocol,
            Error::ResourceNotDestroyed { .. } => ErrorCategory::NotDestroyed,
        }
    }

    /// Whether this error is transient and worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Kind and id of the resource this error is about, if any.
    pub fn resource(&self) -> Option<(&str, &str)> {
        match self {
            Error::NotFound { kind, id }
            | Error::Conflict { kind, id, .. }
            | Error::VersionMismatch { kind, id, .. }
            | Error::Validation { kind, id, .. }
            | Error::ImmutableFieldChanged { kind, id, .. }
            | Error::RemoteTimeout { kind, id, .. }
            | Error::RemoteUnavailable { kind, id, .. }
            | Error::Protocol { kind, id, .. }
            | Error::ResourceNotDestroyed { kind, id, .. } => Some((kind, id)),
            Error::DependencyCycle { .. } => None,
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Transient.is_retryable());
        assert!(!ErrorCategory::VersionMismatch.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::Cycle.is_retryable());
    }

    #[test]
    fn test_timeout_and_unavailable_are_retryable() {
        assert!(Error::timeout("pipeline", "p1", "create").is_retryable());
        assert!(Error::unavailable("pipeline", "p1", "503").is_retryable());
        assert!(!Error::not_found("pipeline", "p1").is_retryable());
    }

    #[test]
    fn test_resource_tag() {
        let err = Error::validation("pipeline_template", "t1", "missing stages");
        assert_eq!(err.resource(), Some(("pipeline_template", "t1")));

        let cycle = Error::DependencyCycle {
            cycle: vec!["pipeline.a".into(), "pipeline.b".into()],
        };
        assert_eq!(cycle.resource(), None);
        assert_eq!(
            cycle.to_string(),
            "dependency cycle detected: pipeline.a -> pipeline.b"
        );
    }

    #[test]
    fn test_immutable_message_lists_fields() {
        let err = Error::ImmutableFieldChanged {
            kind: "pipeline".into(),
            id: "pipeline1".into(),
            fields: vec!["auto_update".into()],
        };
        assert!(err.to_string().contains("auto_update"));
        assert_eq!(err.category(), ErrorCategory::Immutable);
    }

    #[test]
    fn test_residue_display() {
        let residue = Residue::RemoteMutated {
            fields: vec!["stages".into()],
        };
        assert_eq!(
            residue.to_string(),
            "exists but was mutated remotely (stages)"
        );
    }

    #[test]
    fn test_error_category_advice() {
        assert!(!ErrorCategory::NotFound.advice().is_empty());
        assert!(!ErrorCategory::Cycle.advice().is_empty());
    }
}
