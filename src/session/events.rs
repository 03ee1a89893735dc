//! Session pub/sub channels.
//!
//! Two tokio broadcast channels carry everything the session layer says and
//! hears:
//!
//! - **signals** flow in: any part of the application can report a suspected
//!   invalid session (`TokenExpired`, `ApiError`). The expiry watcher consumes
//!   them.
//! - **events** flow out: logout, refresh, login and advisory expiry notices
//!   for zero or more listeners such as the session notice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default capacity of both channels.
pub const DEFAULT_BUS_CAPACITY: usize = 64;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    /// The refresh token was rejected, missing, or the refresh failed.
    SessionInvalid,
    /// The server reported the access token as unrecoverable.
    TokenRejected,
    /// The token expired and nobody renewed it in time.
    TokenExpired,
    /// The user signed out.
    UserInitiated,
}

impl LogoutReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogoutReason::SessionInvalid => "session_invalid",
            LogoutReason::TokenRejected => "token_rejected",
            LogoutReason::TokenExpired => "token_expired",
            LogoutReason::UserInitiated => "user_initiated",
        }
    }
}

impl std::fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured payload published once per logout episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogoutEvent {
    pub id: Uuid,
    /// Human-readable reason shown to the user.
    pub message: String,
    /// HTTP status that triggered the logout, if any.
    pub status: Option<u16>,
    pub reason: LogoutReason,
    pub timestamp: DateTime<Utc>,
    /// Login surface chosen from the identity snapshot.
    pub redirect_to: String,
}

impl LogoutEvent {
    pub fn new(
        reason: LogoutReason,
        message: impl Into<String>,
        status: Option<u16>,
        redirect_to: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            message: message.into(),
            status,
            reason,
            timestamp: Utc::now(),
            redirect_to: redirect_to.into(),
        }
    }
}

/// Inbound report of a possibly invalid session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionSignal {
    /// Someone saw the token expire.
    TokenExpired { message: Option<String> },
    /// Generic API failure metadata; only authorization-class statuses matter.
    ApiError { status: u16, message: Option<String> },
}

impl SessionSignal {
    pub fn token_expired() -> Self {
        SessionSignal::TokenExpired { message: None }
    }

    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        SessionSignal::ApiError {
            status,
            message: Some(message.into()),
        }
    }

    /// Whether the signal reports an authorization-class failure.
    pub fn is_auth_failure(&self, auth_statuses: &[u16]) -> bool {
        match self {
            SessionSignal::TokenExpired { .. } => true,
            SessionSignal::ApiError { status, .. } => auth_statuses.contains(status),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            SessionSignal::TokenExpired { message } | SessionSignal::ApiError { message, .. } => {
                message.as_deref()
            }
        }
    }
}

/// Outbound session lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The stored token is expired or about to be; credentials are untouched.
    Expiring {
        message: String,
        expires_at: Option<DateTime<Utc>>,
    },
    /// The session ended. Credentials are already cleared.
    LoggedOut(LogoutEvent),
    /// A refresh produced a new access token.
    Refreshed { expires_at: Option<DateTime<Utc>> },
    /// A new credential pair was stored.
    LoggedIn { user_id: Option<String> },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Expiring { .. } => "expiring",
            SessionEvent::LoggedOut(_) => "logged_out",
            SessionEvent::Refreshed { .. } => "refreshed",
            SessionEvent::LoggedIn { .. } => "logged_in",
        }
    }
}

/// Convert epoch milliseconds into a UTC timestamp for event payloads.
pub fn epoch_ms_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
}

/// The pair of broadcast channels shared by one session.
///
/// Cloning is cheap and every clone publishes to the same subscribers.
#[derive(Debug, Clone)]
pub struct SessionBus {
    events: broadcast::Sender<SessionEvent>,
    signals: broadcast::Sender<SessionSignal>,
}

impl SessionBus {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        let (signals, _) = broadcast::channel(capacity);
        Self { events, signals }
    }

    /// Publish an event; returns the number of listeners that received it.
    pub fn publish(&self, event: SessionEvent) -> usize {
        let name = event.name();
        match self.events.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::debug!("No listeners for session event {}", name);
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Report a possibly invalid session.
    pub fn signal(&self, signal: SessionSignal) -> usize {
        self.signals.send(signal).unwrap_or(0)
    }

    pub fn subscribe_signals(&self) -> broadcast::Receiver<SessionSignal> {
        self.signals.subscribe()
    }

    /// Sender handle for code that only reports signals.
    pub fn signal_sender(&self) -> broadcast::Sender<SessionSignal> {
        self.signals.clone()
    }
}

impl Default for SessionBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}
