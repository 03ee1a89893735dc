//! Credential data model.
//!
//! The credential pair, the expiry record derived for it, and the identity
//! snapshot that travels with them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::expiry;

/// Short, stable fingerprint of a token for log lines.
///
/// Tokens themselves are never logged.
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}

/// The access/refresh token pair.
///
/// Replaced as a whole on every refresh and cleared as a whole on logout.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPair {
    /// Short-lived credential attached to each request.
    pub access_token: String,
    /// Long-lived credential used only to obtain a new access token.
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &fingerprint(&self.access_token))
            .field("refresh_token", &fingerprint(&self.refresh_token))
            .finish()
    }
}

/// Absolute expiry of the stored access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryRecord {
    pub expires_at_epoch_ms: i64,
}

impl ExpiryRecord {
    pub fn from_epoch_ms(expires_at_epoch_ms: i64) -> Self {
        Self {
            expires_at_epoch_ms,
        }
    }

    /// Milliseconds left until expiry (negative once expired).
    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        self.expires_at_epoch_ms - now_ms
    }

    /// Whether the token is expired, or expires within `buffer_secs`.
    pub fn is_expired_at(&self, now_ms: i64, buffer_secs: u64) -> bool {
        let buffer_ms = i64::try_from(buffer_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        now_ms.saturating_add(buffer_ms) >= self.expires_at_epoch_ms
    }
}

/// Expiry information that may accompany a new credential pair.
///
/// Sources are consulted in priority order: absolute expiry, relative
/// duration, then the access token's own claims.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryHints {
    /// Server-supplied absolute expiry.
    pub expires_at_ms: Option<i64>,
    /// Server-supplied lifetime in seconds, counted from now.
    pub expires_in_secs: Option<u64>,
}

impl ExpiryHints {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn expires_in(secs: u64) -> Self {
        Self {
            expires_at_ms: None,
            expires_in_secs: Some(secs),
        }
    }

    pub fn expires_at(epoch_ms: i64) -> Self {
        Self {
            expires_at_ms: Some(epoch_ms),
            expires_in_secs: None,
        }
    }

    /// Derive the expiry record for `access_token`, or `None` when no source
    /// is available.
    pub fn derive(&self, access_token: &str, now_ms: i64) -> Option<ExpiryRecord> {
        if let Some(at) = self.expires_at_ms {
            return Some(ExpiryRecord::from_epoch_ms(at));
        }
        if let Some(secs) = self.expires_in_secs {
            let ms = i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX);
            return Some(ExpiryRecord::from_epoch_ms(now_ms.saturating_add(ms)));
        }
        expiry::expires_at_ms(access_token).map(ExpiryRecord::from_epoch_ms)
    }
}

/// Last-known user identity, kept so a logout can route to the right login
/// surface even when no in-memory user state exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, alias = "_id", alias = "userId")]
    pub id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            role: Some(role.into()),
        }
    }
}

/// How much is known about the freshness of the stored access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No access token stored.
    Absent,
    /// Valid beyond the buffer window.
    Fresh { expires_at_ms: i64 },
    /// Expired, or expiring inside the buffer window.
    Expiring { expires_at_ms: i64 },
    /// No expiry source; the server decides on the next request.
    Unknown,
}

impl Freshness {
    pub fn is_expiring(&self) -> bool {
        matches!(self, Freshness::Expiring { .. })
    }
}

/// Everything the token store holds, read in one go.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StoredSession {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expiry: Option<ExpiryRecord>,
    pub identity: Option<Identity>,
}

impl StoredSession {
    /// The credential pair, when both halves are present.
    pub fn pair(&self) -> Option<CredentialPair> {
        match (&self.access_token, &self.refresh_token) {
            (Some(access), Some(refresh)) => Some(CredentialPair::new(access, refresh)),
            _ => None,
        }
    }

    pub fn has_token(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none()
            && self.refresh_token.is_none()
            && self.expiry.is_none()
            && self.identity.is_none()
    }

    /// Freshness of the access token at `now_ms`.
    ///
    /// The persisted expiry record wins; tokens without one fall back to
    /// their decoded claims, and opaque tokens are `Unknown`.
    pub fn freshness(&self, now_ms: i64, buffer_secs: u64) -> Freshness {
        let Some(token) = self.access_token.as_deref() else {
            return Freshness::Absent;
        };

        let record = self
            .expiry
            .or_else(|| expiry::expires_at_ms(token).map(ExpiryRecord::from_epoch_ms));

        match record {
            Some(record) if record.is_expired_at(now_ms, buffer_secs) => Freshness::Expiring {
                expires_at_ms: record.expires_at_epoch_ms,
            },
            Some(record) => Freshness::Fresh {
                expires_at_ms: record.expires_at_epoch_ms,
            },
            None => Freshness::Unknown,
        }
    }
}

impl std::fmt::Debug for StoredSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredSession")
            .field("access_token", &self.access_token.as_deref().map(fingerprint))
            .field("refresh_token", &self.refresh_token.as_deref().map(fingerprint))
            .field("expiry", &self.expiry)
            .field("identity", &self.identity)
            .finish()
    }
}
