//! Authentication-related error types.
//!
//! These cover every way an authenticated request can end without a usable
//! response: a rejected replay, a server that declared the session dead, and
//! a refresh that could not produce a new access token.

use std::fmt;

use crate::session::events::LogoutReason;

/// Why a refresh call did not produce a new access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    /// No refresh token is stored.
    MissingRefreshToken,
    /// The Auth API rejected the refresh token.
    Rejected { status: u16, message: String },
    /// The Auth API could not be reached.
    Unreachable { message: String },
    /// The refresh call exceeded its deadline.
    TimedOut { after_secs: u64 },
    /// The Auth API answered 2xx with a body we could not use.
    InvalidResponse { message: String },
    /// The refresh task ended without reporting an outcome.
    Interrupted,
}

impl RefreshFailure {
    /// Whether the failure came from the network rather than the server's verdict.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            RefreshFailure::Unreachable { .. } | RefreshFailure::TimedOut { .. }
        )
    }

    /// Human-readable reason shown on the session notice.
    pub fn message(&self) -> String {
        match self {
            RefreshFailure::MissingRefreshToken => {
                "Your session has ended. Please sign in again.".to_string()
            }
            RefreshFailure::Rejected { message, .. } if !message.is_empty() => {
                format!("Your session could not be renewed: {}", message)
            }
            RefreshFailure::Rejected { .. } => {
                "Your session could not be renewed. Please sign in again.".to_string()
            }
            RefreshFailure::Unreachable { .. } | RefreshFailure::TimedOut { .. } => {
                "The sign-in service could not be reached to renew your session.".to_string()
            }
            RefreshFailure::InvalidResponse { .. } | RefreshFailure::Interrupted => {
                "Failed to renew your session. Please sign in again.".to_string()
            }
        }
    }
}

impl fmt::Display for RefreshFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshFailure::MissingRefreshToken => write!(f, "no refresh token available"),
            RefreshFailure::Rejected { status, message } => {
                write!(f, "rejected by auth API ({}): {}", status, message)
            }
            RefreshFailure::Unreachable { message } => {
                write!(f, "auth API unreachable: {}", message)
            }
            RefreshFailure::TimedOut { after_secs } => {
                write!(f, "refresh timed out after {}s", after_secs)
            }
            RefreshFailure::InvalidResponse { message } => {
                write!(f, "invalid refresh response: {}", message)
            }
            RefreshFailure::Interrupted => write!(f, "refresh interrupted"),
        }
    }
}

/// Authentication-specific error variants.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// The access token is expired and no refresh was attempted.
    TokenExpired,

    /// A request was rejected again after being replayed with a fresh token.
    Unauthorized {
        status: u16,
        message: Option<String>,
    },

    /// The session was invalidated; the logout broadcast has already fired.
    SessionInvalidated {
        reason: LogoutReason,
        message: String,
    },

    /// Refreshing the access token failed; the logout broadcast has already fired.
    RefreshFailed { failure: RefreshFailure },

    /// No credentials are stored.
    NotAuthenticated,
}

impl AuthError {
    /// Check if this error can only be resolved by signing in again.
    pub fn requires_reauth(&self) -> bool {
        !matches!(self, AuthError::Unauthorized { status: 403, .. })
    }

    /// Whether the logout broadcast has fired for this error.
    pub fn is_broadcast(&self) -> bool {
        matches!(
            self,
            AuthError::SessionInvalidated { .. } | AuthError::RefreshFailed { .. }
        )
    }

    /// Get a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::TokenExpired => {
                "Your session has expired. Please sign in again.".to_string()
            }
            AuthError::Unauthorized { .. } => {
                "The server rejected your credentials. Please sign in again.".to_string()
            }
            AuthError::SessionInvalidated { message, .. } => message.clone(),
            AuthError::RefreshFailed { failure } => failure.message(),
            AuthError::NotAuthenticated => {
                "You are not signed in. Please sign in to continue.".to_string()
            }
        }
    }

    /// Get a short error code for logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::TokenExpired => "E_AUTH_TOKEN_EXP",
            AuthError::Unauthorized { .. } => "E_AUTH_UNAUTHORIZED",
            AuthError::SessionInvalidated { .. } => "E_AUTH_INVALIDATED",
            AuthError::RefreshFailed { .. } => "E_AUTH_REFRESH_FAIL",
            AuthError::NotAuthenticated => "E_AUTH_NOT_AUTH",
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::TokenExpired => write!(f, "Access token has expired"),
            AuthError::Unauthorized { status, message } => match message {
                Some(msg) => write!(f, "Unauthorized ({}) after retry: {}", status, msg),
                None => write!(f, "Unauthorized ({}) after retry", status),
            },
            AuthError::SessionInvalidated { reason, message } => {
                write!(f, "Session invalidated ({}): {}", reason, message)
            }
            AuthError::RefreshFailed { failure } => {
                write!(f, "Token refresh failed: {}", failure)
            }
            AuthError::NotAuthenticated => write!(f, "Not authenticated"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<RefreshFailure> for AuthError {
    fn from(failure: RefreshFailure) -> Self {
        AuthError::RefreshFailed { failure }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_failure_is_network() {
        assert!(RefreshFailure::Unreachable {
            message: "refused".to_string()
        }
        .is_network());
        assert!(RefreshFailure::TimedOut { after_secs: 15 }.is_network());
        assert!(!RefreshFailure::MissingRefreshToken.is_network());
        assert!(!RefreshFailure::Rejected {
            status: 401,
            message: String::new()
        }
        .is_network());
    }

    #[test]
    fn test_refresh_failure_message_includes_server_text() {
        let failure = RefreshFailure::Rejected {
            status: 401,
            message: "refresh token revoked".to_string(),
        };
        assert!(failure.message().contains("refresh token revoked"));
    }

    #[test]
    fn test_broadcast_errors() {
        let err: AuthError = RefreshFailure::MissingRefreshToken.into();
        assert!(err.is_broadcast());
        assert_eq!(err.error_code(), "E_AUTH_REFRESH_FAIL");

        let err = AuthError::Unauthorized {
            status: 401,
            message: None,
        };
        assert!(!err.is_broadcast());
    }

    #[test]
    fn test_requires_reauth() {
        assert!(AuthError::TokenExpired.requires_reauth());
        assert!(AuthError::NotAuthenticated.requires_reauth());
        assert!(!AuthError::Unauthorized {
            status: 403,
            message: None
        }
        .requires_reauth());
    }

    #[test]
    fn test_display() {
        let err = AuthError::SessionInvalidated {
            reason: LogoutReason::TokenRejected,
            message: "Invalid token".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Session invalidated (token_rejected): Invalid token"
        );
    }
}
