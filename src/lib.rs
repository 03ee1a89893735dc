//! sessionkeep - access/refresh token lifecycle for HTTP clients
//!
//! Keeps a bearer-authenticated session alive: attaches the access token to
//! outgoing requests, refreshes it once when the server rejects it (however
//! many requests were rejected together), watches for expiry ahead of time,
//! and broadcasts a single logout when the session cannot be saved.

pub mod adapters;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod prelude;
pub mod session;
pub mod traits;
