//! Token lifecycle manager.
//!
//! One instance owns every piece of session state: the token store, the
//! refresh coordinator, the logout broadcaster and the event bus. Clients,
//! watchers and notices are handed out from it so they all share the same
//! state. Several managers can live side by side (one per test, one per
//! account) without interfering.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use super::broadcaster::{LogoutBroadcaster, LogoutOutcome};
use super::coordinator::{RefreshCoordinator, RefreshOnUnauthorized};
use super::events::{LogoutReason, SessionBus, SessionEvent, SessionSignal, DEFAULT_BUS_CAPACITY};
use super::interceptor::BearerInterceptor;
use super::notice::SessionNotice;
use super::pipeline::{Middleware, Pipeline};
use super::watcher::{ExpiryWatcher, WatcherHandle};
use crate::auth::{
    AuthApiClient, CredentialPair, ExpiryHints, ExpiryRecord, Freshness, Identity, StoredSession,
    TokenStore,
};
use crate::config::SessionConfig;
use crate::error::{NetworkError, RefreshFailure, SessionError, SessionResult};
use crate::traits::{Clock, HttpClient, KeyValueStorage, Navigator, Request, Response, SystemClock};

const USER_LOGOUT_MESSAGE: &str = "You have been logged out.";

/// Builder for [`TokenLifecycleManager`].
pub struct ManagerBuilder {
    config: SessionConfig,
    http: Option<Arc<dyn HttpClient>>,
    storage: Option<Arc<dyn KeyValueStorage>>,
    navigator: Option<Arc<dyn Navigator>>,
    clock: Arc<dyn Clock>,
    extra: Vec<Arc<dyn Middleware>>,
}

impl ManagerBuilder {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            http: None,
            storage: None,
            navigator: None,
            clock: Arc::new(SystemClock),
            extra: Vec::new(),
        }
    }

    pub fn http(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn KeyValueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Add a middleware that runs inside the refresh layer, closest to the
    /// transport.
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.extra.push(middleware);
        self
    }

    pub fn build(self) -> SessionResult<TokenLifecycleManager> {
        let http = self
            .http
            .ok_or_else(|| SessionError::config("an HTTP client is required"))?;
        let storage = self
            .storage
            .ok_or_else(|| SessionError::config("a storage backend is required"))?;
        let navigator = self
            .navigator
            .ok_or_else(|| SessionError::config("a navigator is required"))?;
        if self.config.api_url.trim().is_empty() {
            return Err(SessionError::config("api_url must not be empty"));
        }

        let config = Arc::new(self.config);
        let store = Arc::new(TokenStore::new(storage, self.clock));
        let bus = SessionBus::new(DEFAULT_BUS_CAPACITY);
        let broadcaster = Arc::new(LogoutBroadcaster::new(
            store.clone(),
            bus.clone(),
            navigator,
            config.redirects.clone(),
            config.logout_cooldown,
        ));
        let api = AuthApiClient::new(http.clone(), &config.api_url, &config.refresh_path);
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            api,
            broadcaster.clone(),
            bus.clone(),
            &config,
        ));

        let mut pipeline = Pipeline::new(http)
            .with(Arc::new(BearerInterceptor::new(store.clone())))
            .with(Arc::new(RefreshOnUnauthorized::new(
                coordinator.clone(),
                store.clone(),
                broadcaster.clone(),
                config.clone(),
            )));
        for middleware in self.extra {
            pipeline = pipeline.with(middleware);
        }
        info!(stages = ?pipeline.names(), api = %config.api_url, "Session manager ready");

        Ok(TokenLifecycleManager {
            config,
            store,
            bus,
            broadcaster,
            coordinator,
            pipeline: Arc::new(pipeline),
        })
    }
}

/// Owner of one session's token lifecycle.
pub struct TokenLifecycleManager {
    config: Arc<SessionConfig>,
    store: Arc<TokenStore>,
    bus: SessionBus,
    broadcaster: Arc<LogoutBroadcaster>,
    coordinator: Arc<RefreshCoordinator>,
    pipeline: Arc<Pipeline>,
}

impl TokenLifecycleManager {
    pub fn builder(config: SessionConfig) -> ManagerBuilder {
        ManagerBuilder::new(config)
    }

    /// Client that attaches credentials and recovers from 401s.
    pub fn client(&self) -> AuthenticatedClient {
        AuthenticatedClient {
            pipeline: self.pipeline.clone(),
            config: self.config.clone(),
        }
    }

    /// Store a new credential pair and reopen the session.
    pub fn login(
        &self,
        pair: &CredentialPair,
        hints: ExpiryHints,
        identity: Option<Identity>,
    ) -> Option<ExpiryRecord> {
        let expiry = self.store.set(pair, hints);
        if let Some(identity) = &identity {
            self.store.set_identity(identity);
        }
        self.coordinator.reset();
        self.broadcaster.reset();
        info!(
            user = identity.as_ref().and_then(|i| i.id.as_deref()).unwrap_or("unknown"),
            "Logged in"
        );
        self.bus.publish(SessionEvent::LoggedIn {
            user_id: identity.and_then(|i| i.id),
        });
        expiry
    }

    /// User-initiated logout.
    pub fn logout(&self) -> LogoutOutcome {
        self.broadcaster
            .force_logout(LogoutReason::UserInitiated, USER_LOGOUT_MESSAGE, None, None)
    }

    /// Refresh now, joining any refresh already in flight.
    pub async fn refresh(&self) -> Result<String, RefreshFailure> {
        self.coordinator.refresh().await
    }

    /// Whether the stored access token is expired (or about to be).
    pub fn is_expired(&self) -> bool {
        self.freshness().is_expiring() || self.store.access_token().is_none()
    }

    pub fn freshness(&self) -> Freshness {
        self.store.snapshot().freshness(
            self.store.clock().now_ms(),
            self.config.expiry_buffer_secs,
        )
    }

    pub fn session(&self) -> StoredSession {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.bus.subscribe()
    }

    /// Sender other components use to report a suspected invalid session.
    pub fn signal_sender(&self) -> broadcast::Sender<SessionSignal> {
        self.bus.signal_sender()
    }

    pub fn signal(&self, signal: SessionSignal) -> usize {
        self.bus.signal(signal)
    }

    pub fn watcher(&self) -> Arc<ExpiryWatcher> {
        Arc::new(ExpiryWatcher::new(
            self.store.clone(),
            self.bus.clone(),
            self.coordinator.clone(),
            self.broadcaster.clone(),
            self.config.clone(),
        ))
    }

    /// Start the expiry watcher in the background.
    pub fn spawn_watcher(&self) -> WatcherHandle {
        self.watcher().spawn()
    }

    /// A session notice bound to this manager. Call
    /// [`SessionNotice::attach`] to drive it from the bus.
    pub fn notice(&self) -> Arc<SessionNotice> {
        Arc::new(SessionNotice::new(
            self.config.notice_countdown_secs,
            self.broadcaster.clone(),
            self.coordinator.clone(),
        ))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn bus(&self) -> &SessionBus {
        &self.bus
    }

    pub fn broadcaster(&self) -> &Arc<LogoutBroadcaster> {
        &self.broadcaster
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }
}

impl std::fmt::Debug for TokenLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenLifecycleManager")
            .field("api_url", &self.config.api_url)
            .field("session", &self.store.snapshot())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

/// HTTP client bound to a manager's session.
///
/// Relative URLs resolve against the configured API base.
#[derive(Clone)]
pub struct AuthenticatedClient {
    pipeline: Arc<Pipeline>,
    config: Arc<SessionConfig>,
}

impl AuthenticatedClient {
    pub async fn send(&self, mut request: Request) -> SessionResult<Response> {
        request.url = self.config.resolve_url(&request.url);
        self.pipeline.send(request).await
    }

    pub async fn get(&self, url: &str) -> SessionResult<Response> {
        self.send(Request::get(url)).await
    }

    pub async fn post_json<B: Serialize>(&self, url: &str, body: &B) -> SessionResult<Response> {
        let body = serde_json::to_string(body).map_err(|e| NetworkError::InvalidResponse {
            message: format!("failed to encode request body: {}", e),
        })?;
        let request = Request::post(url, body).with_header("Content-Type", "application/json");
        self.send(request).await
    }

    /// GET and decode a JSON body. Non-2xx statuses become errors.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> SessionResult<T> {
        let response = self.get(url).await?;
        if !response.is_success() {
            return Err(NetworkError::HttpStatus {
                status: response.status,
                message: response.error_message().unwrap_or_default(),
            }
            .into());
        }
        response.json().map_err(|e| {
            NetworkError::InvalidResponse {
                message: e.to_string(),
            }
            .into()
        })
    }
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("api_url", &self.config.api_url)
            .finish()
    }
}
