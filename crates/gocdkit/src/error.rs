//! Error types for the GoCD client.
//!
//! Remote failures are reported as [`declarative::Error`] so the executor
//! can classify them; only configuration problems have their own type.

use declarative::Error;
use std::io;
use thiserror::Error as ThisError;

/// Problems with [`crate::GocdConfig`] found before any request is made
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum ConfigError {
    #[error("GoCD server URL is not set (use --server or GOCD_URL)")]
    MissingServer,

    #[error("invalid GoCD server URL '{0}': expected http:// or https://")]
    InvalidServer(String),

    #[error("username and password must be set together")]
    PartialCredentials,

    #[error("timeout must be greater than zero")]
    ZeroTimeout,
}

/// Map a non-success HTTP status onto the reconciliation taxonomy.
pub fn status_error(kind: &str, id: &str, status: u16, body: &str) -> Error {
    let message = server_message(body).unwrap_or_else(|| format!("HTTP {status}"));
    match status {
        404 => Error::not_found(kind, id),
        409 => Error::Conflict {
            kind: kind.to_string(),
            id: id.to_string(),
            message,
        },
        412 => Error::VersionMismatch {
            kind: kind.to_string(),
            id: id.to_string(),
            version: message,
        },
        400 | 422 => Error::validation(kind, id, message),
        500..=599 => Error::unavailable(kind, id, format!("HTTP {status}: {message}")),
        _ => Error::Protocol {
            kind: kind.to_string(),
            id: id.to_string(),
            message: format!("HTTP {status}: {message}"),
        },
    }
}

/// Map a transport failure (no HTTP status) onto the taxonomy.
pub fn transport_error(kind: &str, id: &str, operation: &str, err: &ureq::Error) -> Error {
    match err {
        ureq::Error::Timeout(_) => Error::timeout(kind, id, operation),
        ureq::Error::Io(e) if e.kind() == io::ErrorKind::TimedOut => {
            Error::timeout(kind, id, operation)
        }
        ureq::Error::StatusCode(code) => status_error(kind, id, *code, ""),
        other => Error::unavailable(kind, id, other.to_string()),
    }
}

/// Map an undecodable body
pub fn protocol_error(kind: &str, id: &str, message: impl std::fmt::Display) -> Error {
    Error::Protocol {
        kind: kind.to_string(),
        id: id.to_string(),
        message: message.to_string(),
    }
}

/// GoCD reports failures as `{"message": "...", "data": {"errors": {...}}}`
fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let message = value.get("message")?.as_str()?.to_string();
    match value.pointer("/data/errors") {
        Some(errors) if errors.as_object().is_some_and(|o| !o.is_empty()) => {
            Some(format!("{message} {errors}"))
        }
        _ => Some(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::ErrorCategory;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (404, ErrorCategory::NotFound),
            (409, ErrorCategory::Conflict),
            (412, ErrorCategory::VersionMismatch),
            (400, ErrorCategory::Validation),
            (422, ErrorCategory::Validation),
            (500, ErrorCategory::Transient),
            (503, ErrorCategory::Transient),
            (418, ErrorCategory::Protocol),
        ];
        for (status, category) in cases {
            let err = status_error("pipeline", "p1", status, "");
            assert_eq!(err.category(), category, "status {status}");
            assert_eq!(err.resource(), Some(("pipeline", "p1")));
        }
    }

    #[test]
    fn test_server_message_is_surfaced() {
        let body = r#"{"message":"Validations failed for pipeline 'p1'.","data":{"errors":{"group":["must be set"]}}}"#;
        let err = status_error("pipeline", "p1", 422, body);
        let text = err.to_string();
        assert!(text.contains("Validations failed"));
        assert!(text.contains("must be set"));
    }

    #[test]
    fn test_plain_body_falls_back_to_status() {
        let err = status_error("pipeline_template", "t1", 409, "<html>oops</html>");
        assert!(err.to_string().contains("HTTP 409"));
    }

    #[test]
    fn test_transport_timeout() {
        let io = ureq::Error::Io(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        let err = transport_error("pipeline", "p1", "update", &io);
        assert_eq!(err, Error::timeout("pipeline", "p1", "update"));

        let refused = ureq::Error::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "no"));
        assert!(matches!(
            transport_error("pipeline", "p1", "fetch", &refused),
            Error::RemoteUnavailable { .. }
        ));
    }
}
