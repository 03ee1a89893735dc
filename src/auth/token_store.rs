//! Token store.
//!
//! Persists the credential pair, its expiry record and the last-known
//! identity in client storage. Storage failures never reach the caller: the
//! store logs them and keeps the affected value in memory, so the session
//! keeps working for the lifetime of the process and is simply not durable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::credentials::{
    fingerprint, CredentialPair, ExpiryHints, ExpiryRecord, Identity, StoredSession,
};
use crate::traits::{Clock, KeyValueStorage};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const EXPIRES_AT_KEY: &str = "token_expires_at";
pub const IDENTITY_KEY: &str = "user";

const ALL_KEYS: [&str; 4] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, EXPIRES_AT_KEY, IDENTITY_KEY];

/// Durable home of the credential pair.
pub struct TokenStore {
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    /// Values whose last storage write failed. `None` marks a failed removal.
    overlay: Mutex<HashMap<&'static str, Option<String>>>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            overlay: Mutex::new(HashMap::new()),
        }
    }

    /// Clock used for expiry derivation.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(REFRESH_TOKEN_KEY)
    }

    pub fn expiry(&self) -> Option<ExpiryRecord> {
        let raw = self.read(EXPIRES_AT_KEY)?;
        match raw.trim().parse::<i64>() {
            Ok(ms) => Some(ExpiryRecord::from_epoch_ms(ms)),
            Err(e) => {
                warn!("Ignoring unreadable token expiry {:?}: {}", raw, e);
                None
            }
        }
    }

    pub fn identity(&self) -> Option<Identity> {
        let raw = self.read(IDENTITY_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!("Ignoring unreadable stored identity: {}", e);
                None
            }
        }
    }

    /// Read everything at once.
    pub fn snapshot(&self) -> StoredSession {
        StoredSession {
            access_token: self.access_token(),
            refresh_token: self.refresh_token(),
            expiry: self.expiry(),
            identity: self.identity(),
        }
    }

    /// Replace the credential pair and derive its expiry record.
    ///
    /// When no expiry source exists the previous record is removed rather
    /// than left describing a token that is gone.
    pub fn set(&self, pair: &CredentialPair, hints: ExpiryHints) -> Option<ExpiryRecord> {
        let record = hints.derive(&pair.access_token, self.clock.now_ms());

        self.write(ACCESS_TOKEN_KEY, &pair.access_token);
        self.write(REFRESH_TOKEN_KEY, &pair.refresh_token);
        match record {
            Some(record) => self.write(EXPIRES_AT_KEY, &record.expires_at_epoch_ms.to_string()),
            None => self.delete(EXPIRES_AT_KEY),
        }

        debug!(
            access = %fingerprint(&pair.access_token),
            expires_at_ms = ?record.map(|r| r.expires_at_epoch_ms),
            "Stored credential pair"
        );
        record
    }

    pub fn set_identity(&self, identity: &Identity) {
        match serde_json::to_string(identity) {
            Ok(json) => self.write(IDENTITY_KEY, &json),
            Err(e) => warn!("Failed to serialize identity: {}", e),
        }
    }

    /// Remove the pair, its expiry record and the identity.
    pub fn clear(&self) {
        for key in ALL_KEYS {
            self.delete(key);
        }
        debug!("Cleared stored session");
    }

    /// Drop in-memory fallbacks and read storage afresh.
    pub fn reload(&self) {
        if let Ok(mut overlay) = self.overlay.lock() {
            overlay.clear();
        }
    }

    /// Whether some value currently lives only in memory.
    pub fn is_degraded(&self) -> bool {
        self.overlay
            .lock()
            .map(|overlay| !overlay.is_empty())
            .unwrap_or(true)
    }

    fn read(&self, key: &'static str) -> Option<String> {
        if let Ok(overlay) = self.overlay.lock() {
            if let Some(value) = overlay.get(key) {
                return value.clone();
            }
        }
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to read {} from storage: {}", key, e);
                None
            }
        }
    }

    fn write(&self, key: &'static str, value: &str) {
        let result = self.storage.set(key, value);
        self.record_outcome(key, Some(value.to_string()), result.err());
    }

    fn delete(&self, key: &'static str) {
        let result = self.storage.remove(key);
        self.record_outcome(key, None, result.err());
    }

    fn record_outcome(
        &self,
        key: &'static str,
        value: Option<String>,
        error: Option<crate::traits::StorageError>,
    ) {
        let Ok(mut overlay) = self.overlay.lock() else {
            return;
        };
        match error {
            None => {
                overlay.remove(key);
            }
            Some(e) => {
                warn!("Storage write for {} failed, keeping it in memory: {}", key, e);
                overlay.insert(key, value);
            }
        }
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("degraded", &self.is_degraded())
            .finish_non_exhaustive()
    }
}
