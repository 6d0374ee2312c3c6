//! Pipeline error types.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::classify::{Classification, ErrorCategory};
use crate::response::Response;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, HttpError>;

/// What went wrong at the transport level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// No connection could be made, or it dropped mid-flight.
    Network,
    /// The transport gave up waiting.
    Timeout,
    /// The server answered with a non-success status.
    Status,
    /// The call was cancelled before it finished.
    Cancelled,
    /// Anything else the transport could not classify.
    Other,
}

/// Failure reported by a [`Transport`](crate::Transport).
///
/// HTTP failures carry the status and the received response, connection
/// failures carry neither.
#[derive(Debug, Clone)]
pub struct TransportError {
    kind: TransportErrorKind,
    status: Option<u16>,
    message: String,
    response: Option<Response>,
}

impl TransportError {
    /// A connection-level failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Network,
            status: None,
            message: message.into(),
            response: None,
        }
    }

    /// A transport timeout.
    pub fn timeout(after: Duration) -> Self {
        Self {
            kind: TransportErrorKind::Timeout,
            status: None,
            message: format!("timeout of {}ms exceeded", after.as_millis()),
            response: None,
        }
    }

    /// A non-success HTTP response.
    pub fn status(response: Response) -> Self {
        let message = response.error_message();
        Self {
            kind: TransportErrorKind::Status,
            status: Some(response.status().as_u16()),
            message,
            response: Some(response),
        }
    }

    /// A call abandoned through its cancellation token.
    pub fn cancelled() -> Self {
        Self {
            kind: TransportErrorKind::Cancelled,
            status: None,
            message: "request cancelled".to_string(),
            response: None,
        }
    }

    /// An unclassified failure.
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Other,
            status: None,
            message: message.into(),
            response: None,
        }
    }

    /// Failure kind.
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// HTTP status, when the server answered.
    pub fn status_code(&self) -> Option<u16> {
        self.status
    }

    /// Message from the transport or the response body.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The failed response, when the server answered.
    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// Check if this is a connection-level failure.
    pub fn is_network(&self) -> bool {
        self.kind == TransportErrorKind::Network
    }

    /// Check if this is a timeout.
    pub fn is_timeout(&self) -> bool {
        self.kind == TransportErrorKind::Timeout
    }

    /// Check if the call was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.kind == TransportErrorKind::Cancelled
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "request failed with status {}: {}", status, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self {
                kind: TransportErrorKind::Timeout,
                status: None,
                message: e.to_string(),
                response: None,
            }
        } else if e.is_connect() || e.is_request() {
            Self::network(e.to_string())
        } else {
            Self::other(e.to_string())
        }
    }
}

/// Error surfaced to callers of the pipeline.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Failure mapped to a known category.
    #[error("{0}")]
    Classified(Classification),

    /// No network connectivity.
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// Failure the classifier does not handle, passed through unmodified.
    #[error(transparent)]
    Unknown(TransportError),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Request body or query could not be encoded.
    #[error("Failed to encode request: {0}")]
    Encode(String),

    /// Response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The underlying HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Build(String),

    /// Credential refresh did not produce a token.
    #[error("Credential refresh failed: {0}")]
    Refresh(String),

    /// Error raised by a hook.
    #[error("Hook error: {0}")]
    Hook(String),
}

impl HttpError {
    /// Classify a transport failure without any presentation side effect.
    pub fn from_transport(error: TransportError) -> Self {
        let classification = crate::classify::classify_transport(&error);
        match classification.category {
            ErrorCategory::Unknown => Self::Unknown(error),
            ErrorCategory::NetworkUnavailable => Self::NetworkUnavailable(error.message),
            _ => Self::Classified(classification),
        }
    }

    /// Category of this error, if it went through the classifier.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Classified(c) => Some(c.category),
            Self::NetworkUnavailable(_) => Some(ErrorCategory::NetworkUnavailable),
            Self::Unknown(_) => Some(ErrorCategory::Unknown),
            _ => None,
        }
    }

    /// Classification details, if the failure was mapped.
    pub fn classification(&self) -> Option<&Classification> {
        match self {
            Self::Classified(c) => Some(c),
            _ => None,
        }
    }

    /// HTTP status code, if the server answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Classified(c) => c.status,
            Self::Unknown(e) => e.status_code(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<url::ParseError> for HttpError {
    fn from(e: url::ParseError) -> Self {
        Self::InvalidUrl(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_is_not_classified_as_status() {
        let err = HttpError::from_transport(TransportError::network("Network Error"));
        assert!(matches!(err, HttpError::NetworkUnavailable(_)));
        assert_eq!(err.category(), Some(ErrorCategory::NetworkUnavailable));
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_timeout_is_classified() {
        let err = HttpError::from_transport(TransportError::timeout(Duration::from_secs(20)));
        assert_eq!(err.category(), Some(ErrorCategory::Timeout));
        assert_eq!(
            err.classification().map(|c| c.message_key),
            Some("apiTimeoutMessage")
        );
    }

    #[test]
    fn test_other_error_passes_through() {
        let err = HttpError::from_transport(TransportError::other("boom"));
        match err {
            HttpError::Unknown(inner) => assert_eq!(inner.message(), "boom"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
