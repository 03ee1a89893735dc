//! Auth API client.
//!
//! Talks to the refresh endpoint through the [`HttpClient`] seam, so the
//! refresh call takes the same transport as every other request but never
//! passes through the session middleware.

use std::sync::Arc;

use chrono::DateTime;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use super::credentials::{fingerprint, ExpiryHints, Identity};
use crate::error::RefreshFailure;
use crate::traits::{HttpClient, HttpError, Request, AUTHORIZATION};

/// Default path of the refresh endpoint.
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

/// Epoch values below this are seconds, above it milliseconds.
const EPOCH_MS_THRESHOLD: f64 = 1e12;

/// Successful refresh payload.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    #[serde(alias = "access_token")]
    pub access_token: String,
    /// Rotated refresh token, if the server rotates.
    #[serde(default, alias = "refresh_token")]
    pub refresh_token: Option<String>,
    /// Absolute expiry, normalized to epoch milliseconds.
    #[serde(default, alias = "expires_at", deserialize_with = "deserialize_expires_at")]
    pub expires_at: Option<i64>,
    #[serde(default, alias = "expires_in")]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub user: Option<Identity>,
}

impl RefreshResponse {
    pub fn expiry_hints(&self) -> ExpiryHints {
        ExpiryHints {
            expires_at_ms: self.expires_at,
            expires_in_secs: self.expires_in,
        }
    }
}

impl std::fmt::Debug for RefreshResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshResponse")
            .field("access_token", &fingerprint(&self.access_token))
            .field("rotated", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .field("expires_in", &self.expires_in)
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawExpiresAt {
    Number(f64),
    Text(String),
}

fn deserialize_expires_at<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawExpiresAt> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|raw| match raw {
        RawExpiresAt::Number(n) => epoch_to_ms(n),
        RawExpiresAt::Text(text) => parse_expires_at_text(&text),
    }))
}

fn epoch_to_ms(value: f64) -> Option<i64> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    if value < EPOCH_MS_THRESHOLD {
        Some((value * 1000.0) as i64)
    } else {
        Some(value as i64)
    }
}

fn parse_expires_at_text(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(n) = text.parse::<f64>() {
        return epoch_to_ms(n);
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Client for the Auth API refresh endpoint.
#[derive(Clone)]
pub struct AuthApiClient {
    http: Arc<dyn HttpClient>,
    refresh_url: String,
}

impl AuthApiClient {
    pub fn new(http: Arc<dyn HttpClient>, base_url: &str, refresh_path: &str) -> Self {
        let refresh_url = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            refresh_path.trim_start_matches('/')
        );
        Self { http, refresh_url }
    }

    pub fn refresh_url(&self) -> &str {
        &self.refresh_url
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// POST {base}/auth/refresh
    ///
    /// The refresh token travels both in the body and as a bearer header.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, RefreshFailure> {
        let body = serde_json::json!({ "refreshToken": refresh_token });
        let request = Request::post(self.refresh_url.clone(), body.to_string())
            .with_header("Content-Type", "application/json")
            .with_header(AUTHORIZATION, format!("Bearer {}", refresh_token));

        debug!(
            refresh = %fingerprint(refresh_token),
            url = %self.refresh_url,
            "Calling refresh endpoint"
        );

        let response = self.http.execute(&request).await.map_err(|e| match e {
            HttpError::Timeout(message) | HttpError::ConnectionFailed(message) => {
                RefreshFailure::Unreachable { message }
            }
            HttpError::ServerError { status, message } => {
                RefreshFailure::Rejected { status, message }
            }
            other => RefreshFailure::Unreachable {
                message: other.to_string(),
            },
        })?;

        if !response.is_success() {
            return Err(RefreshFailure::Rejected {
                status: response.status,
                message: response.error_message().unwrap_or_default(),
            });
        }

        let parsed: RefreshResponse =
            response
                .json()
                .map_err(|e| RefreshFailure::InvalidResponse {
                    message: e.to_string(),
                })?;
        if parsed.access_token.trim().is_empty() {
            return Err(RefreshFailure::InvalidResponse {
                message: "empty access token".to_string(),
            });
        }
        Ok(parsed)
    }
}

impl std::fmt::Debug for AuthApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthApiClient")
            .field("refresh_url", &self.refresh_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockHttpClient;
    use crate::traits::{Method, Response};

    fn parse(json: &str) -> RefreshResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_expires_at_accepts_seconds_and_millis() {
        assert_eq!(
            parse(r#"{"accessToken":"A","expiresAt":1700000000}"#).expires_at,
            Some(1_700_000_000_000)
        );
        assert_eq!(
            parse(r#"{"accessToken":"A","expiresAt":1700000000123}"#).expires_at,
            Some(1_700_000_000_123)
        );
    }

    #[test]
    fn test_expires_at_accepts_rfc3339() {
        let parsed = parse(r#"{"accessToken":"A","expiresAt":"2023-11-14T22:13:20Z"}"#);
        assert_eq!(parsed.expires_at, Some(1_700_000_000_000));
    }

    #[test]
    fn test_unparseable_expires_at_is_ignored() {
        let parsed = parse(r#"{"accessToken":"A","expiresAt":"tomorrow","expiresIn":60}"#);
        assert_eq!(parsed.expires_at, None);
        assert_eq!(parsed.expiry_hints(), ExpiryHints::expires_in(60));
    }

    #[test]
    fn test_snake_case_aliases() {
        let parsed = parse(r#"{"access_token":"A","refresh_token":"R","expires_in":3600}"#);
        assert_eq!(parsed.access_token, "A");
        assert_eq!(parsed.refresh_token.as_deref(), Some("R"));
        assert_eq!(parsed.expires_in, Some(3600));
    }

    #[test]
    fn test_user_is_parsed() {
        let parsed = parse(r#"{"accessToken":"A","user":{"_id":"u1","role":"admin"}}"#);
        assert_eq!(parsed.user, Some(Identity::new("u1", "admin")));
    }

    #[test]
    fn test_refresh_url_joins_cleanly() {
        let http = Arc::new(MockHttpClient::new());
        let client = AuthApiClient::new(http, "https://api.example.com/", "/auth/refresh");
        assert_eq!(client.refresh_url(), "https://api.example.com/auth/refresh");
    }

    #[tokio::test]
    async fn test_refresh_sends_token_in_body_and_header() {
        let http = Arc::new(MockHttpClient::new());
        http.respond_to(
            "https://api.example.com/auth/refresh",
            Response::json_body(200, &serde_json::json!({"accessToken": "A2", "expiresIn": 60})),
        );
        let client = AuthApiClient::new(http.clone(), "https://api.example.com", "/auth/refresh");

        let response = client.refresh("R1").await.unwrap();
        assert_eq!(response.access_token, "A2");

        let requests = http.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].header("authorization"), Some("Bearer R1"));
        let body: serde_json::Value =
            serde_json::from_str(requests[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body["refreshToken"], "R1");
    }

    #[tokio::test]
    async fn test_refresh_rejection_carries_message() {
        let http = Arc::new(MockHttpClient::new());
        http.respond_to(
            "https://api.example.com/auth/refresh",
            Response::json_body(401, &serde_json::json!({"message": "refresh token expired"})),
        );
        let client = AuthApiClient::new(http, "https://api.example.com", "/auth/refresh");

        let err = client.refresh("R1").await.unwrap_err();
        assert_eq!(
            err,
            RefreshFailure::Rejected {
                status: 401,
                message: "refresh token expired".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_refresh_unreachable() {
        let http = Arc::new(MockHttpClient::new());
        http.fail_with(HttpError::ConnectionFailed("refused".to_string()));
        let client = AuthApiClient::new(http, "https://api.example.com", "/auth/refresh");

        let err = client.refresh("R1").await.unwrap_err();
        assert!(err.is_network());
    }

    #[tokio::test]
    async fn test_refresh_invalid_body() {
        let http = Arc::new(MockHttpClient::new());
        http.respond_to(
            "https://api.example.com/auth/refresh",
            Response::json_body(200, &serde_json::json!({"token": "A2"})),
        );
        let client = AuthApiClient::new(http, "https://api.example.com", "/auth/refresh");

        let err = client.refresh("R1").await.unwrap_err();
        assert!(matches!(err, RefreshFailure::InvalidResponse { .. }));
    }
}
