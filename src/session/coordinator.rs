//! Refresh coordinator.
//!
//! Turns authorization failures into at most one refresh call at a time.
//!
//! ```text
//! IDLE --401--> REFRESHING --ok--> IDLE
//!                   |
//!                   +--failure--> LOGGED_OUT
//! ```
//!
//! Every caller, including the one that starts the refresh, waits on a
//! oneshot receiver queued in the refresh episode. The network call runs on
//! its own task, so a caller that gives up cannot strand the others, and the
//! queue is drained in FIFO order once the call settles.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::backoff::ExponentialBackoff;
use super::broadcaster::LogoutBroadcaster;
use super::events::{epoch_ms_to_utc, LogoutReason, SessionBus, SessionEvent};
use super::interceptor::attach_bearer;
use super::pipeline::{Middleware, Next};
use crate::auth::{fingerprint, AuthApiClient, CredentialPair, TokenStore};
use crate::config::SessionConfig;
use crate::error::{AuthError, RefreshFailure, SessionResult};
use crate::traits::{Request, Response};

/// Refresh state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
    LoggedOut,
}

type Waiter = oneshot::Sender<Result<String, RefreshFailure>>;

struct RefreshEpisode {
    state: RefreshState,
    waiters: VecDeque<Waiter>,
}

pub struct RefreshCoordinator {
    store: Arc<TokenStore>,
    api: AuthApiClient,
    broadcaster: Arc<LogoutBroadcaster>,
    bus: SessionBus,
    episode: Mutex<RefreshEpisode>,
    refresh_calls: AtomicUsize,
    timeout: Duration,
    network_retries: u32,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<TokenStore>,
        api: AuthApiClient,
        broadcaster: Arc<LogoutBroadcaster>,
        bus: SessionBus,
        config: &SessionConfig,
    ) -> Self {
        Self {
            store,
            api,
            broadcaster,
            bus,
            episode: Mutex::new(RefreshEpisode {
                state: RefreshState::Idle,
                waiters: VecDeque::new(),
            }),
            refresh_calls: AtomicUsize::new(0),
            timeout: config.refresh_timeout,
            network_retries: config.refresh_network_retries,
        }
    }

    pub fn state(&self) -> RefreshState {
        self.episode
            .lock()
            .map(|e| e.state)
            .unwrap_or(RefreshState::LoggedOut)
    }

    /// Callers currently waiting on the in-flight refresh.
    pub fn waiting(&self) -> usize {
        self.episode.lock().map(|e| e.waiters.len()).unwrap_or(0)
    }

    /// Network refresh attempts made so far.
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Leave `LoggedOut` after a new login. An in-flight refresh is untouched.
    pub fn reset(&self) {
        if let Ok(mut episode) = self.episode.lock() {
            if episode.state == RefreshState::LoggedOut {
                episode.state = RefreshState::Idle;
            }
        }
    }

    /// Get a fresh access token, joining the in-flight refresh if there is one.
    ///
    /// Once a refresh has failed, later calls fail fast without another
    /// logout until a new refresh token is stored or [`reset`](Self::reset)
    /// is called.
    pub async fn refresh(self: &Arc<Self>) -> Result<String, RefreshFailure> {
        let (tx, rx) = oneshot::channel();
        let start = {
            let Ok(mut episode) = self.episode.lock() else {
                return Err(RefreshFailure::Interrupted);
            };
            if episode.state == RefreshState::LoggedOut && self.store.refresh_token().is_none() {
                debug!("Session already ended, not refreshing");
                return Err(RefreshFailure::MissingRefreshToken);
            }
            episode.waiters.push_back(tx);
            if episode.state == RefreshState::Refreshing {
                debug!(position = episode.waiters.len(), "Joining in-flight refresh");
                false
            } else {
                episode.state = RefreshState::Refreshing;
                true
            }
        };

        if start {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.run_episode().await });
        }

        rx.await.unwrap_or(Err(RefreshFailure::Interrupted))
    }

    async fn run_episode(self: Arc<Self>) {
        info!("Refreshing access token");
        let outcome = self.call_refresh_endpoint().await;

        match outcome {
            Ok(token) => {
                let waiters = self.settle(RefreshState::Idle);
                info!(
                    access = %fingerprint(&token),
                    waiters = waiters.len(),
                    "Access token refreshed"
                );
                for waiter in waiters {
                    let _ = waiter.send(Ok(token.clone()));
                }
            }
            Err(failure) => {
                warn!("Token refresh failed: {}", failure);
                // Broadcast before any waiter sees the rejection. The broadcaster
                // reads the identity for the redirect, so it clears the store.
                let status = match &failure {
                    RefreshFailure::Rejected { status, .. } => Some(*status),
                    _ => None,
                };
                self.broadcaster.force_logout(
                    LogoutReason::SessionInvalid,
                    &failure.message(),
                    status,
                    None,
                );
                // Still cleared when the logout was inside the cooldown.
                self.store.clear();
                let waiters = self.settle(RefreshState::LoggedOut);
                for waiter in waiters {
                    let _ = waiter.send(Err(failure.clone()));
                }
            }
        }
    }

    /// Set the final state and take the queue in one step, so later callers
    /// start a new episode instead of joining a finished one.
    fn settle(&self, state: RefreshState) -> VecDeque<Waiter> {
        match self.episode.lock() {
            Ok(mut episode) => {
                episode.state = state;
                std::mem::take(&mut episode.waiters)
            }
            Err(_) => VecDeque::new(),
        }
    }

    async fn call_refresh_endpoint(&self) -> Result<String, RefreshFailure> {
        let Some(refresh_token) = self.store.refresh_token() else {
            return Err(RefreshFailure::MissingRefreshToken);
        };

        let mut backoff = ExponentialBackoff::new();
        loop {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            let result = match tokio::time::timeout(self.timeout, self.api.refresh(&refresh_token))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(RefreshFailure::TimedOut {
                    after_secs: self.timeout.as_secs(),
                }),
            };

            match result {
                Ok(response) => {
                    let pair = CredentialPair::new(
                        response.access_token.clone(),
                        response
                            .refresh_token
                            .clone()
                            .unwrap_or_else(|| refresh_token.clone()),
                    );
                    let record = self.store.set(&pair, response.expiry_hints());
                    if let Some(user) = &response.user {
                        self.store.set_identity(user);
                    }
                    self.bus.publish(SessionEvent::Refreshed {
                        expires_at: record.and_then(|r| epoch_ms_to_utc(r.expires_at_epoch_ms)),
                    });
                    return Ok(response.access_token);
                }
                Err(failure)
                    if failure.is_network() && backoff.failure_count() < self.network_retries =>
                {
                    let delay = backoff.record_failure();
                    warn!(
                        attempt = backoff.failure_count(),
                        "Refresh endpoint unreachable ({}), retrying in {:?}",
                        failure,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(failure) => return Err(failure),
            }
        }
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("state", &self.state())
            .field("waiting", &self.waiting())
            .field("refresh_calls", &self.refresh_calls())
            .finish_non_exhaustive()
    }
}

/// Middleware that reacts to authorization failures.
///
/// Sits inside the bearer interceptor, so it sees which token each request
/// carried. A rejected request is replayed exactly once; a request that was
/// already replayed surfaces its failure instead of entering the coordinator
/// again.
pub struct RefreshOnUnauthorized {
    coordinator: Arc<RefreshCoordinator>,
    store: Arc<TokenStore>,
    broadcaster: Arc<LogoutBroadcaster>,
    config: Arc<SessionConfig>,
}

impl RefreshOnUnauthorized {
    pub fn new(
        coordinator: Arc<RefreshCoordinator>,
        store: Arc<TokenStore>,
        broadcaster: Arc<LogoutBroadcaster>,
        config: Arc<SessionConfig>,
    ) -> Self {
        Self {
            coordinator,
            store,
            broadcaster,
            config,
        }
    }
}

#[async_trait]
impl Middleware for RefreshOnUnauthorized {
    async fn handle(&self, request: Request, next: Next<'_>) -> SessionResult<Response> {
        let response = next.run(request.clone()).await?;
        if !self.config.is_auth_failure(response.status) {
            return Ok(response);
        }

        let status = response.status;
        let message = response.error_message();

        if request.retried {
            warn!(status, url = %request.url, "Rejected again after refresh");
            return Err(AuthError::Unauthorized { status, message }.into());
        }

        if let Some(message) = message
            .as_deref()
            .filter(|m| self.config.is_terminal_message(m))
        {
            info!(status, "Server reported an unrecoverable token: {}", message);
            self.broadcaster.force_logout(
                LogoutReason::TokenRejected,
                message,
                Some(status),
                None,
            );
            return Err(AuthError::SessionInvalidated {
                reason: LogoutReason::TokenRejected,
                message: message.to_string(),
            }
            .into());
        }

        let current = self.store.access_token();
        let token = match current {
            Some(current)
                if request.attached_token.as_deref() != Some(current.as_str())
                    && self.coordinator.state() != RefreshState::Refreshing =>
            {
                debug!(url = %request.url, "Sent with a replaced token, replaying");
                current
            }
            _ => self.coordinator.refresh().await.map_err(AuthError::from)?,
        };

        let mut replay = request;
        replay.retried = true;
        attach_bearer(&mut replay, &token);

        let response = next.run(replay).await?;
        if self.config.is_auth_failure(response.status) {
            warn!(status = response.status, "Replay rejected");
            return Err(AuthError::Unauthorized {
                status: response.status,
                message: response.error_message(),
            }
            .into());
        }
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "refresh-on-unauthorized"
    }
}
