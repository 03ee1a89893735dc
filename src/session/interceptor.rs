//! Request interceptor.
//!
//! Attaches the stored access token as a bearer credential. It neither
//! blocks nor validates: a request without a token goes out unauthenticated
//! and its rejection takes the normal refresh path.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use super::pipeline::{Middleware, Next};
use crate::auth::TokenStore;
use crate::error::SessionResult;
use crate::traits::{Request, Response, AUTHORIZATION};

/// Set the bearer header for `token` and remember which token went out.
pub fn attach_bearer(request: &mut Request, token: &str) {
    request.remove_header(AUTHORIZATION);
    request
        .headers
        .insert(AUTHORIZATION.to_string(), format!("Bearer {}", token));
    request.attached_token = Some(token.to_string());
}

pub struct BearerInterceptor {
    store: Arc<TokenStore>,
}

impl BearerInterceptor {
    pub fn new(store: Arc<TokenStore>) -> Self {
        Self { store }
    }

    /// Attach the current token to `request`, or strip any stale header.
    pub fn attach(&self, request: &mut Request) {
        match self.store.access_token() {
            Some(token) => attach_bearer(request, &token),
            None => {
                trace!("No access token, sending {} unauthenticated", request.url);
                request.remove_header(AUTHORIZATION);
                request.attached_token = None;
            }
        }
    }
}

#[async_trait]
impl Middleware for BearerInterceptor {
    async fn handle(&self, mut request: Request, next: Next<'_>) -> SessionResult<Response> {
        self.attach(&mut request);
        next.run(request).await
    }

    fn name(&self) -> &'static str {
        "bearer"
    }
}
