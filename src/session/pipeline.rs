//! Middleware pipeline.
//!
//! An ordered list of request/response transformers in front of an
//! [`HttpClient`]. Each middleware receives the request and a [`Next`]
//! handle; calling `next.run(request)` passes control down the list, and the
//! last step executes the request on the transport. A middleware may call
//! `next.run` more than once, which is how replays after a refresh work.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{NetworkError, SessionResult};
use crate::traits::{HttpClient, Request, Response};

/// One stage of the pipeline.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, request: Request, next: Next<'_>) -> SessionResult<Response>;

    /// Name used in log lines.
    fn name(&self) -> &'static str;
}

/// The remainder of the pipeline after the current middleware.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    client: &'a dyn HttpClient,
    middlewares: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    /// Run the rest of the pipeline.
    pub async fn run(self, request: Request) -> SessionResult<Response> {
        match self.middlewares.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    client: self.client,
                    middlewares: rest,
                };
                current.handle(request, next).await
            }
            None => {
                tracing::trace!("{} {}", request.method, request.url);
                self.client
                    .execute(&request)
                    .await
                    .map_err(|e| NetworkError::from_http(e, &request.url).into())
            }
        }
    }
}

/// Ordered middleware chain over a transport.
#[derive(Clone)]
pub struct Pipeline {
    client: Arc<dyn HttpClient>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self {
            client,
            middlewares: Vec::new(),
        }
    }

    /// Append a middleware. The first one added is the outermost.
    pub fn with(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Names of the middlewares, outermost first.
    pub fn names(&self) -> Vec<&'static str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    /// Send a request through every middleware.
    pub async fn send(&self, request: Request) -> SessionResult<Response> {
        let next = Next {
            client: self.client.as_ref(),
            middlewares: &self.middlewares,
        };
        next.run(request).await
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("middlewares", &self.names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockHttpClient;
    use crate::error::SessionError;
    use crate::traits::HttpError;
    use bytes::Bytes;

    struct Tag(&'static str);

    #[async_trait]
    impl Middleware for Tag {
        async fn handle(&self, request: Request, next: Next<'_>) -> SessionResult<Response> {
            let existing = request.header("x-trace").unwrap_or("").to_string();
            let request = request.with_header("x-trace", format!("{}{}", existing, self.0));
            next.run(request).await
        }

        fn name(&self) -> &'static str {
            self.0
        }
    }

    struct Twice;

    #[async_trait]
    impl Middleware for Twice {
        async fn handle(&self, request: Request, next: Next<'_>) -> SessionResult<Response> {
            next.run(request.clone()).await?;
            next.run(request).await
        }

        fn name(&self) -> &'static str {
            "twice"
        }
    }

    #[tokio::test]
    async fn test_middlewares_run_in_order() {
        let http = Arc::new(MockHttpClient::new());
        http.respond_to("https://example.com", Response::new(200, Bytes::new()));
        let pipeline = Pipeline::new(http.clone())
            .with(Arc::new(Tag("a")))
            .with(Arc::new(Tag("b")));

        pipeline.send(Request::get("https://example.com/x")).await.unwrap();

        assert_eq!(pipeline.names(), vec!["a", "b"]);
        assert_eq!(http.requests()[0].header("x-trace"), Some("ab"));
    }

    #[tokio::test]
    async fn test_next_can_run_twice() {
        let http = Arc::new(MockHttpClient::new());
        http.respond_to("https://example.com", Response::new(200, Bytes::new()));
        let pipeline = Pipeline::new(http.clone())
            .with(Arc::new(Twice))
            .with(Arc::new(Tag("t")));

        pipeline.send(Request::get("https://example.com/x")).await.unwrap();

        let requests = http.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.header("x-trace") == Some("t")));
    }

    #[tokio::test]
    async fn test_transport_errors_become_network_errors() {
        let http = Arc::new(MockHttpClient::new());
        http.fail_with(HttpError::ConnectionFailed("refused".to_string()));
        let pipeline = Pipeline::new(http);

        let err = pipeline
            .send(Request::get("https://example.com/x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Network(NetworkError::ConnectionFailed { .. })
        ));
        assert!(err.is_retryable());
    }
}
