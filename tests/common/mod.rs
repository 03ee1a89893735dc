//! Common test utilities for integration tests.
//!
//! Builds a [`TokenLifecycleManager`] over the in-crate test doubles and
//! mints unsigned JWTs with chosen claims.

#![allow(dead_code)]

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sessionkeep::adapters::mock::{InMemoryStorage, ManualClock, MockHttpClient, RecordingNavigator};
use sessionkeep::config::SessionConfig;
use sessionkeep::session::TokenLifecycleManager;
use sessionkeep::traits::{Request, Response};

pub const API: &str = "https://api.example.com";
pub const REFRESH_URL: &str = "https://api.example.com/auth/refresh";

/// 2023-11-14T22:13:20Z
pub const START_MS: i64 = 1_700_000_000_000;

/// Unsigned token whose payload carries `exp` (seconds) and `sub`.
pub fn make_jwt(exp_secs: i64, sub: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({ "exp": exp_secs, "sub": sub }).to_string(),
    );
    format!("{}.{}.signature", header, payload)
}

/// Everything a test needs to drive and observe one manager.
pub struct TestSession {
    pub manager: TokenLifecycleManager,
    pub http: Arc<MockHttpClient>,
    pub storage: InMemoryStorage,
    pub navigator: RecordingNavigator,
    pub clock: ManualClock,
}

pub fn session_with(config: SessionConfig) -> TestSession {
    let http = Arc::new(MockHttpClient::new());
    let storage = InMemoryStorage::new();
    let navigator = RecordingNavigator::new();
    let clock = ManualClock::new(START_MS);
    let manager = TokenLifecycleManager::builder(config)
        .http(http.clone())
        .storage(Arc::new(storage.clone()))
        .navigator(Arc::new(navigator.clone()))
        .clock(Arc::new(clock.clone()))
        .build()
        .unwrap();
    TestSession {
        manager,
        http,
        storage,
        navigator,
        clock,
    }
}

pub fn session() -> TestSession {
    session_with(SessionConfig::new(API).with_login_route("admin", "/admin/login"))
}

pub fn json(status: u16, value: serde_json::Value) -> Response {
    Response::json_body(status, &value)
}

pub fn bearer(request: &Request) -> Option<String> {
    request
        .header("authorization")
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}
