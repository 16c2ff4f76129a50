//! Session layer errors
//!
//! `SessionError` is `Clone` because a single refresh outcome is handed to
//! every caller waiting on it.

use rxdesk_core::RxdeskError;
use thiserror::Error;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Refresh attempted with nothing to exchange
    #[error("No refresh token available")]
    NoRefreshToken,

    /// The backend refused the refresh token, or the exchange could not complete
    #[error("Refresh token rejected{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    RefreshRejected {
        status: Option<u16>,
        message: String,
    },

    /// Any non-2xx response that is not handled by token recovery
    #[error("Request failed with HTTP {status}")]
    RequestFailed { status: u16, body: String },

    #[error("Login failed (HTTP {status}): {message}")]
    LoginFailed { status: u16, message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Operation timeout: {operation} after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl SessionError {
    /// Errors after which the session has been torn down
    pub fn is_session_loss(&self) -> bool {
        matches!(
            self,
            SessionError::NoRefreshToken | SessionError::RefreshRejected { .. }
        )
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            SessionError::RefreshRejected { status, .. } => *status,
            SessionError::RequestFailed { status, .. } => Some(*status),
            SessionError::LoginFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

impl From<RxdeskError> for SessionError {
    fn from(err: RxdeskError) -> Self {
        match err {
            RxdeskError::Config { message, .. } | RxdeskError::Validation { message, .. } => {
                SessionError::Config { message }
            }
            RxdeskError::Storage { message, .. } => SessionError::Storage { message },
            RxdeskError::Io(e) => SessionError::Storage {
                message: e.to_string(),
            },
            RxdeskError::Serialization(e) => SessionError::Serialization {
                message: e.to_string(),
            },
            other => SessionError::Config {
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_rejected_display() {
        let err = SessionError::RefreshRejected {
            status: Some(401),
            message: "token_not_valid".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Refresh token rejected (HTTP 401): token_not_valid"
        );
        assert!(err.is_session_loss());

        let err = SessionError::RefreshRejected {
            status: None,
            message: "connection reset".to_string(),
        };
        assert_eq!(err.to_string(), "Refresh token rejected: connection reset");
    }

    #[test]
    fn test_status_helpers() {
        let err = SessionError::RequestFailed {
            status: 401,
            body: String::new(),
        };
        assert!(err.is_unauthorized());
        assert!(!err.is_session_loss());
        assert_eq!(SessionError::NoRefreshToken.status(), None);
    }
}
