//! Logout broadcaster.
//!
//! `force_logout` ends the local session: it snapshots the identity, clears
//! the token store, publishes a [`LogoutEvent`] and routes to the login
//! surface for the user's role. A logout episode guard makes those side
//! effects happen once per invalidation; later calls inside the cooldown are
//! no-ops.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::events::{LogoutEvent, LogoutReason, SessionBus, SessionEvent};
use crate::auth::TokenStore;
use crate::config::RedirectMap;
use crate::traits::Navigator;

/// Result of a `force_logout` call.
#[derive(Debug, Clone, PartialEq)]
pub enum LogoutOutcome {
    /// The episode ran; carries the published event.
    Performed(LogoutEvent),
    /// Another episode is inside its cooldown window.
    Suppressed,
}

impl LogoutOutcome {
    pub fn is_performed(&self) -> bool {
        matches!(self, LogoutOutcome::Performed(_))
    }

    pub fn event(&self) -> Option<&LogoutEvent> {
        match self {
            LogoutOutcome::Performed(event) => Some(event),
            LogoutOutcome::Suppressed => None,
        }
    }
}

pub struct LogoutBroadcaster {
    store: Arc<TokenStore>,
    bus: SessionBus,
    navigator: Arc<dyn Navigator>,
    redirects: RedirectMap,
    cooldown: Duration,
    /// Start of the last episode; the guard is closed while it is recent.
    last_episode: Mutex<Option<Instant>>,
    /// Set when a session notice owns the redirect.
    defer_redirect: AtomicBool,
    logged_out: AtomicBool,
    episodes: AtomicUsize,
}

impl LogoutBroadcaster {
    pub fn new(
        store: Arc<TokenStore>,
        bus: SessionBus,
        navigator: Arc<dyn Navigator>,
        redirects: RedirectMap,
        cooldown: Duration,
    ) -> Self {
        Self {
            store,
            bus,
            navigator,
            redirects,
            cooldown,
            last_episode: Mutex::new(None),
            defer_redirect: AtomicBool::new(false),
            logged_out: AtomicBool::new(false),
            episodes: AtomicUsize::new(0),
        }
    }

    /// End the session once per cooldown window.
    ///
    /// Order: identity snapshot, clear, publish, redirect. The redirect is
    /// skipped while a session notice is attached; the notice performs it
    /// when its countdown ends or the user asks to log in again.
    pub fn force_logout(
        &self,
        reason: LogoutReason,
        message: &str,
        status: Option<u16>,
        redirect_hint: Option<&str>,
    ) -> LogoutOutcome {
        if !self.try_open_episode() {
            debug!(%reason, "Logout already in progress, ignoring");
            return LogoutOutcome::Suppressed;
        }

        let identity = self.store.identity();
        let role = identity.as_ref().and_then(|i| i.role.as_deref());
        let target = self.redirects.target(role, redirect_hint);

        self.store.clear();
        self.logged_out.store(true, Ordering::SeqCst);
        self.episodes.fetch_add(1, Ordering::SeqCst);

        let event = LogoutEvent::new(reason, message, status, target.clone());
        info!(
            %reason,
            status = ?status,
            role = role.unwrap_or("unknown"),
            redirect = %target,
            "Session logged out"
        );
        self.bus.publish(SessionEvent::LoggedOut(event.clone()));

        if self.defer_redirect.load(Ordering::SeqCst) {
            debug!("Redirect deferred to session notice");
        } else {
            self.navigate(&target);
        }

        LogoutOutcome::Performed(event)
    }

    /// Go to `target`, logging failures.
    pub fn navigate(&self, target: &str) {
        if let Err(e) = self.navigator.navigate(target) {
            warn!("Failed to navigate to {}: {}", target, e);
        }
    }

    pub fn set_defer_redirect(&self, defer: bool) {
        self.defer_redirect.store(defer, Ordering::SeqCst);
    }

    pub fn defers_redirect(&self) -> bool {
        self.defer_redirect.load(Ordering::SeqCst)
    }

    /// Whether the last episode has not been followed by a login.
    pub fn is_logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }

    /// Number of episodes that ran.
    pub fn episodes(&self) -> usize {
        self.episodes.load(Ordering::SeqCst)
    }

    /// Reopen the guard for a new session.
    pub fn reset(&self) {
        if let Ok(mut last) = self.last_episode.lock() {
            *last = None;
        }
        self.logged_out.store(false, Ordering::SeqCst);
    }

    pub fn redirects(&self) -> &RedirectMap {
        &self.redirects
    }

    fn try_open_episode(&self) -> bool {
        let Ok(mut last) = self.last_episode.lock() else {
            return false;
        };
        if let Some(started) = *last {
            if started.elapsed() < self.cooldown {
                return false;
            }
        }
        *last = Some(Instant::now());
        true
    }
}

impl std::fmt::Debug for LogoutBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogoutBroadcaster")
            .field("cooldown", &self.cooldown)
            .field("episodes", &self.episodes())
            .field("defer_redirect", &self.defers_redirect())
            .finish_non_exhaustive()
    }
}
