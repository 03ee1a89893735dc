//! Credential handling.
//!
//! This module provides:
//! - The credential data model (pair, expiry record, identity snapshot)
//! - The token store over durable client storage
//! - The expiry oracle (offline `exp` checks with a safety buffer)
//! - The Auth API client for the refresh endpoint

pub mod api;
pub mod credentials;
pub mod expiry;
pub mod token_store;

pub use api::{AuthApiClient, RefreshResponse};
pub use credentials::{
    fingerprint, CredentialPair, ExpiryHints, ExpiryRecord, Freshness, Identity, StoredSession,
};
pub use expiry::{is_expired, is_expired_at, DEFAULT_BUFFER_SECS};
pub use token_store::TokenStore;
