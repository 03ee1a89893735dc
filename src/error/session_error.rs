//! Unified error type for the session layer.
//!
//! `SessionError` consolidates the domain-specific errors so callers of the
//! authenticated client handle one type with consistent categorization.

use std::fmt;

use super::auth::AuthError;
use super::category::ErrorCategory;
use super::network::NetworkError;
use crate::traits::StorageError;

/// Unified error type returned by the authenticated client.
#[derive(Debug)]
pub enum SessionError {
    /// Transport-level failures.
    Network(NetworkError),

    /// Authentication/authorization failures.
    Auth(AuthError),

    /// Client storage failures surfaced by explicit storage operations.
    Storage(StorageError),

    /// Invalid configuration.
    Config { message: String },
}

impl SessionError {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        SessionError::Config {
            message: message.into(),
        }
    }

    /// Get the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            SessionError::Network(NetworkError::HttpStatus { status, .. }) if *status >= 500 => {
                ErrorCategory::Server
            }
            SessionError::Network(NetworkError::InvalidResponse { .. }) => ErrorCategory::Server,
            SessionError::Network(_) => ErrorCategory::Network,
            SessionError::Auth(_) => ErrorCategory::Auth,
            SessionError::Storage(_) => ErrorCategory::Storage,
            SessionError::Config { .. } => ErrorCategory::Configuration,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Network(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Check if this error requires re-authentication.
    pub fn requires_reauth(&self) -> bool {
        match self {
            SessionError::Auth(err) => err.requires_reauth(),
            SessionError::Network(NetworkError::HttpStatus { status: 401, .. }) => true,
            _ => false,
        }
    }

    /// Get a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Network(err) => err.user_message(),
            SessionError::Auth(err) => err.user_message(),
            SessionError::Storage(_) => {
                "Your session could not be saved on this device.".to_string()
            }
            SessionError::Config { message } => format!("Configuration error: {}", message),
        }
    }

    /// Get a short error code for logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            SessionError::Network(err) => err.error_code(),
            SessionError::Auth(err) => err.error_code(),
            SessionError::Storage(_) => "E_STORAGE",
            SessionError::Config { .. } => "E_CONFIG",
        }
    }

    /// Get the recovery hint for this error.
    pub fn recovery_hint(&self) -> &'static str {
        self.category().recovery_hint()
    }

    /// The authentication error, if this is one.
    pub fn as_auth(&self) -> Option<&AuthError> {
        match self {
            SessionError::Auth(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Network(err) => write!(f, "{}", err),
            SessionError::Auth(err) => write!(f, "{}", err),
            SessionError::Storage(err) => write!(f, "{}", err),
            SessionError::Config { message } => write!(f, "Invalid configuration: {}", message),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Network(err) => Some(err),
            SessionError::Auth(err) => Some(err),
            SessionError::Storage(err) => Some(err),
            SessionError::Config { .. } => None,
        }
    }
}

impl From<NetworkError> for SessionError {
    fn from(err: NetworkError) -> Self {
        SessionError::Network(err)
    }
}

impl From<AuthError> for SessionError {
    fn from(err: AuthError) -> Self {
        SessionError::Auth(err)
    }
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        SessionError::Storage(err)
    }
}
