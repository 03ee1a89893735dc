//! Expiry watcher.
//!
//! Checks the stored access token on start, on every navigation, on a coarse
//! interval, and whenever another part of the application reports a
//! suspected invalid session. An expiring token raises the same advisory the
//! session notice reacts to, or, with pre-emptive refresh enabled, goes
//! through the refresh coordinator like any 401 would.

use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::broadcaster::LogoutBroadcaster;
use super::coordinator::RefreshCoordinator;
use super::events::{epoch_ms_to_utc, LogoutReason, SessionBus, SessionEvent, SessionSignal};
use crate::auth::{fingerprint, Freshness, TokenStore};
use crate::config::SessionConfig;
use crate::error::RefreshFailure;

const EXPIRING_MESSAGE: &str = "Your session is about to expire.";
const ENDED_ELSEWHERE_MESSAGE: &str = "Your session has ended.";

/// What a single check found and did.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    /// No access token stored.
    NoSession,
    /// Valid beyond the buffer.
    Fresh { remaining_ms: i64 },
    /// No expiry source; left to the server.
    Unknown,
    /// Advisory published.
    Expiring,
    /// Advisory already published for this token.
    AlreadyReported,
    /// Pre-emptive refresh succeeded.
    Refreshed,
    /// Pre-emptive refresh failed; the logout broadcast has fired.
    RefreshFailed(RefreshFailure),
    /// The session vanished underneath us and was logged out.
    LoggedOut,
    /// The signal did not describe an authorization failure.
    Ignored,
}

pub struct ExpiryWatcher {
    store: Arc<TokenStore>,
    bus: SessionBus,
    coordinator: Arc<RefreshCoordinator>,
    broadcaster: Arc<LogoutBroadcaster>,
    config: Arc<SessionConfig>,
    /// Fingerprint of the token the last advisory was raised for.
    reported: Mutex<Option<String>>,
}

impl ExpiryWatcher {
    pub fn new(
        store: Arc<TokenStore>,
        bus: SessionBus,
        coordinator: Arc<RefreshCoordinator>,
        broadcaster: Arc<LogoutBroadcaster>,
        config: Arc<SessionConfig>,
    ) -> Self {
        Self {
            store,
            bus,
            coordinator,
            broadcaster,
            config,
            reported: Mutex::new(None),
        }
    }

    /// Check the stored token now.
    pub async fn check_now(&self) -> WatchOutcome {
        let session = self.store.snapshot();
        let now_ms = self.store.clock().now_ms();
        let freshness = session.freshness(now_ms, self.config.expiry_buffer_secs);
        debug!(?freshness, "Expiry check");

        match freshness {
            Freshness::Absent => WatchOutcome::NoSession,
            Freshness::Unknown => WatchOutcome::Unknown,
            Freshness::Fresh { expires_at_ms } => WatchOutcome::Fresh {
                remaining_ms: expires_at_ms - now_ms,
            },
            Freshness::Expiring { expires_at_ms } => {
                let token = session.access_token.unwrap_or_default();
                self.raise(&token, EXPIRING_MESSAGE, Some(expires_at_ms))
                    .await
            }
        }
    }

    /// Check after a route change.
    pub async fn on_navigation(&self, route: &str) -> WatchOutcome {
        debug!(route, "Navigation, checking token");
        self.check_now().await
    }

    /// React to an externally reported signal.
    pub async fn on_signal(&self, signal: &SessionSignal) -> WatchOutcome {
        if !signal.is_auth_failure(&self.config.auth_failure_statuses) {
            return WatchOutcome::Ignored;
        }
        let message = signal.message().unwrap_or(EXPIRING_MESSAGE);

        match self.store.access_token() {
            Some(token) => self.raise(&token, message, None).await,
            None if !self.broadcaster.is_logged_out() => {
                // Credentials removed without a local logout, e.g. by another process.
                info!("Session ended outside this process");
                let message = signal.message().unwrap_or(ENDED_ELSEWHERE_MESSAGE);
                self.broadcaster
                    .force_logout(LogoutReason::TokenExpired, message, None, None);
                WatchOutcome::LoggedOut
            }
            None => WatchOutcome::NoSession,
        }
    }

    async fn raise(&self, token: &str, message: &str, expires_at_ms: Option<i64>) -> WatchOutcome {
        if self.config.preemptive_refresh && self.store.refresh_token().is_some() {
            info!("Token expiring, refreshing ahead of time");
            return match self.coordinator.refresh().await {
                Ok(_) => WatchOutcome::Refreshed,
                Err(failure) => WatchOutcome::RefreshFailed(failure),
            };
        }

        let print = fingerprint(token);
        if let Ok(mut reported) = self.reported.lock() {
            if reported.as_deref() == Some(print.as_str()) {
                return WatchOutcome::AlreadyReported;
            }
            *reported = Some(print.clone());
        }

        info!(access = %print, "Token expiring, notifying listeners");
        self.bus.publish(SessionEvent::Expiring {
            message: message.to_string(),
            expires_at: expires_at_ms.and_then(epoch_ms_to_utc),
        });
        WatchOutcome::Expiring
    }

    /// Run the watcher until the handle is dropped or stopped.
    ///
    /// The first interval tick fires immediately, which is the check on start.
    pub fn spawn(self: Arc<Self>) -> WatcherHandle {
        let (navigation_tx, mut navigation_rx) = mpsc::unbounded_channel::<String>();
        let mut signals = self.bus.subscribe_signals();
        let period = self.config.watch_interval;

        let task = tokio::spawn(async move {
            info!("Expiry watcher started (interval: {:?})", period);
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.check_now().await;
                    }
                    signal = signals.recv() => match signal {
                        Ok(signal) => {
                            self.on_signal(&signal).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Expiry watcher lagged, missed {} signals", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    route = navigation_rx.recv() => match route {
                        Some(route) => {
                            self.on_navigation(&route).await;
                        }
                        None => break,
                    },
                }
            }
            debug!("Expiry watcher stopped");
        });

        WatcherHandle {
            navigation: navigation_tx,
            task,
        }
    }
}

/// Handle to a running watcher. Dropping it stops the watcher.
#[derive(Debug)]
pub struct WatcherHandle {
    navigation: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Report a route change.
    pub fn navigated(&self, route: impl Into<String>) {
        let _ = self.navigation.send(route.into());
    }

    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{
        InMemoryStorage, ManualClock, MockHttpClient, RecordingNavigator,
    };
    use crate::auth::{AuthApiClient, CredentialPair, ExpiryHints};
    use crate::config::RedirectMap;
    use crate::traits::Response;
    use std::time::Duration;

    const NOW_MS: i64 = 1_700_000_000_000;
    const API: &str = "https://api.example.com";

    struct Harness {
        watcher: Arc<ExpiryWatcher>,
        store: Arc<TokenStore>,
        clock: Arc<ManualClock>,
        http: Arc<MockHttpClient>,
        bus: SessionBus,
        broadcaster: Arc<LogoutBroadcaster>,
    }

    fn harness(config: SessionConfig) -> Harness {
        let config = Arc::new(config);
        let clock = Arc::new(ManualClock::new(NOW_MS));
        let store = Arc::new(TokenStore::new(Arc::new(InMemoryStorage::new()), clock.clone()));
        let http = Arc::new(MockHttpClient::new());
        let bus = SessionBus::default();
        let broadcaster = Arc::new(LogoutBroadcaster::new(
            store.clone(),
            bus.clone(),
            Arc::new(RecordingNavigator::new()),
            RedirectMap::default(),
            config.logout_cooldown,
        ));
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            AuthApiClient::new(http.clone(), API, "/auth/refresh"),
            broadcaster.clone(),
            bus.clone(),
            &config,
        ));
        let watcher = Arc::new(ExpiryWatcher::new(
            store.clone(),
            bus.clone(),
            coordinator,
            broadcaster.clone(),
            config,
        ));
        Harness {
            watcher,
            store,
            clock,
            http,
            bus,
            broadcaster,
        }
    }

    #[tokio::test]
    async fn test_check_reports_fresh_and_unknown() {
        let h = harness(SessionConfig::new(API));
        assert_eq!(h.watcher.check_now().await, WatchOutcome::NoSession);

        h.store
            .set(&CredentialPair::new("opaque", "R1"), ExpiryHints::none());
        assert_eq!(h.watcher.check_now().await, WatchOutcome::Unknown);

        h.store
            .set(&CredentialPair::new("A1", "R1"), ExpiryHints::expires_in(3600));
        assert_eq!(
            h.watcher.check_now().await,
            WatchOutcome::Fresh {
                remaining_ms: 3_600_000
            }
        );
    }

    #[tokio::test]
    async fn test_expiring_token_raises_advisory_once() {
        let h = harness(SessionConfig::new(API));
        h.store
            .set(&CredentialPair::new("A1", "R1"), ExpiryHints::expires_in(3600));
        let mut events = h.bus.subscribe();

        h.clock.advance_secs(3600 - 20);
        assert_eq!(h.watcher.check_now().await, WatchOutcome::Expiring);
        assert_eq!(
            h.watcher.on_navigation("/reports").await,
            WatchOutcome::AlreadyReported
        );

        assert!(matches!(
            events.try_recv().unwrap(),
            SessionEvent::Expiring { .. }
        ));
        assert!(events.try_recv().is_err());
        assert_eq!(h.store.access_token().as_deref(), Some("A1"));
    }

    #[tokio::test]
    async fn test_preemptive_refresh_uses_coordinator() {
        let h = harness(SessionConfig::new(API).with_preemptive_refresh(true));
        h.http.respond_to(
            "https://api.example.com/auth/refresh",
            Response::json_body(200, &serde_json::json!({"accessToken": "A2", "expiresIn": 3600})),
        );
        h.store
            .set(&CredentialPair::new("A1", "R1"), ExpiryHints::expires_in(10));

        assert_eq!(h.watcher.check_now().await, WatchOutcome::Refreshed);
        assert_eq!(h.store.access_token().as_deref(), Some("A2"));
    }

    #[tokio::test]
    async fn test_signals_are_filtered() {
        let h = harness(SessionConfig::new(API));
        h.store
            .set(&CredentialPair::new("A1", "R1"), ExpiryHints::expires_in(3600));

        assert_eq!(
            h.watcher
                .on_signal(&SessionSignal::api_error(500, "boom"))
                .await,
            WatchOutcome::Ignored
        );
        assert_eq!(
            h.watcher
                .on_signal(&SessionSignal::api_error(401, "expired"))
                .await,
            WatchOutcome::Expiring
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_after_external_removal_logs_out() {
        let h = harness(SessionConfig::new(API));
        let mut events = h.bus.subscribe();

        let outcome = h.watcher.on_signal(&SessionSignal::token_expired()).await;

        assert_eq!(outcome, WatchOutcome::LoggedOut);
        match events.try_recv().unwrap() {
            SessionEvent::LoggedOut(event) => assert_eq!(event.reason, LogoutReason::TokenExpired),
            other => panic!("unexpected {:?}", other),
        }

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(h.broadcaster.is_logged_out());
        assert_eq!(
            h.watcher.on_signal(&SessionSignal::token_expired()).await,
            WatchOutcome::NoSession
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_watcher_checks_on_start_and_navigation() {
        let h = harness(SessionConfig::new(API));
        h.store
            .set(&CredentialPair::new("A1", "R1"), ExpiryHints::expires_in(10));
        let mut events = h.bus.subscribe();

        let handle = h.watcher.clone().spawn();
        let first = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.name(), "expiring");

        h.store
            .set(&CredentialPair::new("A2", "R2"), ExpiryHints::expires_in(10));
        handle.navigated("/next");
        let second = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.name(), "expiring");

        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_watcher_consumes_signals() {
        let h = harness(SessionConfig::new(API));
        h.store
            .set(&CredentialPair::new("A1", "R1"), ExpiryHints::expires_in(3600));
        let mut events = h.bus.subscribe();
        let _handle = h.watcher.clone().spawn();
        tokio::task::yield_now().await;

        h.bus.signal(SessionSignal::api_error(401, "token revoked"));

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            SessionEvent::Expiring { message, .. } => assert_eq!(message, "token revoked"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
