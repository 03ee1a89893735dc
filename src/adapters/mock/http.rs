//! Mock HTTP client for testing.
//!
//! Returns configured responses per URL, or computes them from a handler
//! that sees the full request (headers included), and records every request
//! it receives.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::traits::{HttpClient, HttpError, Request, Response};

/// Configuration for a mock response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return a response
    Success(Response),
    /// Return an error
    Error(HttpError),
}

type Handler = Arc<dyn Fn(&Request) -> Option<MockResponse> + Send + Sync>;

/// Mock HTTP client for testing.
///
/// Lookup order: handler, exact URL, URL prefix, default.
///
/// # Example
///
/// ```ignore
/// use sessionkeep::adapters::mock::MockHttpClient;
/// use sessionkeep::traits::{HttpClient, Request, Response};
///
/// let client = MockHttpClient::new();
/// client.respond_to("https://api.example.com/me", Response::new(200, "ok".into()));
///
/// let response = client.execute(&Request::get("https://api.example.com/me")).await?;
/// assert_eq!(response.status, 200);
/// assert_eq!(client.requests().len(), 1);
/// ```
#[derive(Clone)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, MockResponse>>>,
    default_response: Arc<Mutex<Option<MockResponse>>>,
    handler: Arc<Mutex<Option<Handler>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    requests: Arc<Mutex<Vec<Request>>>,
    in_flight: Arc<AtomicUsize>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            default_response: Arc::new(Mutex::new(None)),
            handler: Arc::new(Mutex::new(None)),
            delays: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set a response for a URL (exact match first, then prefix).
    pub fn set_response(&self, url: &str, response: MockResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    /// Shorthand for `set_response(url, MockResponse::Success(response))`.
    pub fn respond_to(&self, url: &str, response: Response) {
        self.set_response(url, MockResponse::Success(response));
    }

    /// Set a default response for URLs without specific matches.
    pub fn set_default_response(&self, response: MockResponse) {
        *self.default_response.lock().unwrap() = Some(response);
    }

    /// Fail every request that has no specific response.
    pub fn fail_with(&self, error: HttpError) {
        self.set_default_response(MockResponse::Error(error));
    }

    /// Compute responses from the request. Returning `None` falls through
    /// to the URL table.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&Request) -> Option<MockResponse> + Send + Sync + 'static,
    {
        *self.handler.lock().unwrap() = Some(Arc::new(handler));
    }

    /// Hold responses for URLs starting with `url_prefix` for `delay`.
    pub fn set_delay(&self, url_prefix: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(url_prefix.to_string(), delay);
    }

    /// All recorded requests, in arrival order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// Recorded requests whose URL starts with `url_prefix`.
    pub fn requests_to(&self, url_prefix: &str) -> Vec<Request> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.starts_with(url_prefix))
            .cloned()
            .collect()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    /// Requests currently waiting on a configured delay.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn lookup(&self, request: &Request) -> Option<MockResponse> {
        let handler = self.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            if let Some(response) = handler(request) {
                return Some(response);
            }
        }

        let responses = self.responses.lock().unwrap();
        if let Some(response) = responses.get(&request.url) {
            return Some(response.clone());
        }
        for (pattern, response) in responses.iter() {
            if request.url.starts_with(pattern) {
                return Some(response.clone());
            }
        }
        drop(responses);

        self.default_response.lock().unwrap().clone()
    }

    fn delay_for(&self, url: &str) -> Option<Duration> {
        self.delays
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, delay)| *delay)
    }
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHttpClient")
            .field("requests", &self.requests.lock().map(|r| r.len()).unwrap_or(0))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: &Request) -> Result<Response, HttpError> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(delay) = self.delay_for(&request.url) {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        match self.lookup(request) {
            Some(MockResponse::Success(response)) => Ok(response),
            Some(MockResponse::Error(err)) => Err(err),
            None => Err(HttpError::Other(format!(
                "No mock response for URL: {}",
                request.url
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_exact_and_prefix_match() {
        let client = MockHttpClient::new();
        client.respond_to("https://example.com/api", Response::new(200, Bytes::from("prefix")));
        client.respond_to(
            "https://example.com/api/exact",
            Response::new(201, Bytes::from("exact")),
        );

        let exact = client
            .execute(&Request::get("https://example.com/api/exact"))
            .await
            .unwrap();
        assert_eq!(exact.status, 201);

        let prefix = client
            .execute(&Request::get("https://example.com/api/other"))
            .await
            .unwrap();
        assert_eq!(prefix.status, 200);
    }

    #[tokio::test]
    async fn test_no_response_configured() {
        let client = MockHttpClient::new();
        let result = client.execute(&Request::get("https://example.com/none")).await;
        assert!(matches!(result, Err(HttpError::Other(_))));
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_handler_sees_headers() {
        let client = MockHttpClient::new();
        client.set_handler(|request| {
            let status = if request.header("authorization") == Some("Bearer ok") {
                200
            } else {
                401
            };
            Some(MockResponse::Success(Response::new(status, Bytes::new())))
        });

        let denied = client
            .execute(&Request::get("https://example.com/me"))
            .await
            .unwrap();
        assert_eq!(denied.status, 401);

        let allowed = client
            .execute(&Request::get("https://example.com/me").with_header("Authorization", "Bearer ok"))
            .await
            .unwrap();
        assert_eq!(allowed.status, 200);
    }

    #[tokio::test]
    async fn test_default_error() {
        let client = MockHttpClient::new();
        client.fail_with(HttpError::ConnectionFailed("refused".to_string()));
        let result = client.execute(&Request::get("https://example.com/x")).await;
        assert!(matches!(result, Err(HttpError::ConnectionFailed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_applies_to_prefix() {
        let client = MockHttpClient::new();
        client.respond_to("https://example.com", Response::new(200, Bytes::new()));
        client.set_delay("https://example.com/slow", Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        client
            .execute(&Request::get("https://example.com/slow/1"))
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(client.in_flight(), 0);
    }

    #[test]
    fn test_requests_to_filters() {
        let client = MockHttpClient::new();
        client.requests.lock().unwrap().push(Request::get("https://a/x"));
        client.requests.lock().unwrap().push(Request::get("https://b/y"));
        assert_eq!(client.requests_to("https://a").len(), 1);
        client.clear_requests();
        assert!(client.requests().is_empty());
    }
}
