//! Failure classification and presentation.
//!
//! Status codes map to a fixed set of categories, each with its own
//! message key. Presentation goes through a [`Presenter`] and honors the
//! caller's [`ErrorMessageMode`].

use std::fmt;

use crate::error::{TransportError, TransportErrorKind};
use crate::options::ErrorMessageMode;
use crate::presenter::{Notice, Presenter};

/// Message key used for transport-level timeouts.
pub const TIMEOUT_MESSAGE_KEY: &str = "apiTimeoutMessage";
/// Message key used for connectivity failures.
pub const NETWORK_MESSAGE_KEY: &str = "networkExceptionMsg";
/// Title key for connectivity failure dialogs.
pub const NETWORK_TITLE_KEY: &str = "networkException";
/// Title key for error dialogs.
pub const ERROR_TITLE_KEY: &str = "errorTip";

/// User-facing failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// 400
    ClientError,
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 405
    MethodNotAllowed,
    /// 408 or a transport timeout
    Timeout,
    /// 500-505
    ServerError,
    /// No status, connection failed
    NetworkUnavailable,
    /// Not handled by the classifier
    Unknown,
}

impl ErrorCategory {
    /// Check if the classifier handles this category.
    ///
    /// Unhandled failures propagate to the caller unmodified.
    pub fn is_handled(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Category name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientError => "ClientError",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "NotFound",
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::Timeout => "Timeout",
            Self::ServerError => "ServerError",
            Self::NetworkUnavailable => "NetworkUnavailable",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Category.
    pub category: ErrorCategory,
    /// HTTP status, if any.
    pub status: Option<u16>,
    /// Localization key for the default message.
    pub message_key: &'static str,
    /// Server-provided text shown instead of the keyed message.
    pub message: Option<String>,
}

impl Classification {
    /// Build the notice shown for this failure.
    pub fn notice(&self) -> Notice {
        Notice {
            title_key: Some(ERROR_TITLE_KEY),
            message_key: self.message_key,
            message: self.message.clone(),
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.category)?;
        if let Some(status) = self.status {
            write!(f, " ({})", status)?;
        }
        match &self.message {
            Some(message) => write!(f, ": {}", message),
            None => write!(f, ": {}", self.message_key),
        }
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Classify an HTTP status.
///
/// Raw server text is kept for 400 and, when present, for 401/403/404.
/// Other categories always use their message key.
pub fn classify(status: Option<u16>, raw_message: &str) -> Classification {
    let (category, message_key, message) = match status {
        Some(400) => (ErrorCategory::ClientError, "errMsg400", non_empty(raw_message)),
        Some(401) => (ErrorCategory::Unauthorized, "errMsg401", non_empty(raw_message)),
        Some(403) => (ErrorCategory::Forbidden, "errMsg403", non_empty(raw_message)),
        Some(404) => (ErrorCategory::NotFound, "errMsg404", non_empty(raw_message)),
        Some(405) => (ErrorCategory::MethodNotAllowed, "errMsg405", None),
        Some(408) => (ErrorCategory::Timeout, "errMsg408", None),
        Some(500) => (ErrorCategory::ServerError, "errMsg500", None),
        Some(501) => (ErrorCategory::ServerError, "errMsg501", None),
        Some(502) => (ErrorCategory::ServerError, "errMsg502", None),
        Some(503) => (ErrorCategory::ServerError, "errMsg503", None),
        Some(504) => (ErrorCategory::ServerError, "errMsg504", None),
        Some(505) => (ErrorCategory::ServerError, "errMsg505", None),
        _ => (ErrorCategory::Unknown, "errMsgUnknown", non_empty(raw_message)),
    };

    Classification {
        category,
        status,
        message_key,
        message,
    }
}

/// Classify a transport failure, taking its shape into account.
pub fn classify_transport(error: &TransportError) -> Classification {
    match (error.kind(), error.status_code()) {
        (TransportErrorKind::Timeout, None) => Classification {
            category: ErrorCategory::Timeout,
            status: None,
            message_key: TIMEOUT_MESSAGE_KEY,
            message: None,
        },
        (TransportErrorKind::Network, None) => Classification {
            category: ErrorCategory::NetworkUnavailable,
            status: None,
            message_key: NETWORK_MESSAGE_KEY,
            message: None,
        },
        (_, status) => classify(status, error.message()),
    }
}

/// Show a classified failure according to `mode`.
///
/// Returns `true` if something was shown.
pub fn present(
    classification: &Classification,
    mode: ErrorMessageMode,
    presenter: &dyn Presenter,
) -> bool {
    if mode == ErrorMessageMode::None || !classification.category.is_handled() {
        return false;
    }
    presenter.notify(classification.notice(), mode);
    true
}
