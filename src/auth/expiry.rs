//! Expiry oracle.
//!
//! Decides whether an access token is expired, or about to expire, by reading
//! the `exp` claim from its payload. The signature is never verified; the
//! server stays the authority and this check only saves a doomed round trip.
//!
//! Every decode failure is treated as "expired": a token we cannot read is a
//! token we should not trust.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;

use crate::traits::{Clock, SystemClock};

/// Seconds before the real expiry at which a token already counts as expired.
pub const DEFAULT_BUFFER_SECS: u64 = 30;

/// Claims read from an access token payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TokenClaims {
    /// Expiry in seconds since the Unix epoch. Some issuers emit floats.
    #[serde(default)]
    pub exp: Option<f64>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Why a token payload could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("token is not a three-segment JWT")]
    Malformed,
    #[error("token payload is not valid base64url: {0}")]
    Base64(String),
    #[error("token payload is not valid JSON: {0}")]
    Json(String),
}

/// Decode the claims segment of a JWT without verifying it.
pub fn decode_claims(token: &str) -> Result<TokenClaims, DecodeError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(DecodeError::Malformed);
    };
    if payload.is_empty() {
        return Err(DecodeError::Malformed);
    }

    // Some encoders keep the '=' padding even in the URL-safe alphabet.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| DecodeError::Base64(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| DecodeError::Json(e.to_string()))
}

/// Absolute expiry of `token` in epoch milliseconds, if its claims carry one.
pub fn expires_at_ms(token: &str) -> Option<i64> {
    let exp = decode_claims(token).ok()?.exp?;
    if !exp.is_finite() {
        return None;
    }
    Some((exp * 1000.0) as i64)
}

/// Whether `token` is expired, or will be within `buffer_secs`.
///
/// Returns `true` for a missing token, an undecodable token, and a token
/// without an `exp` claim.
pub fn is_expired(token: Option<&str>, buffer_secs: u64) -> bool {
    is_expired_with(token, buffer_secs, &SystemClock)
}

/// Same as [`is_expired`], reading the time from `clock`.
pub fn is_expired_with(token: Option<&str>, buffer_secs: u64, clock: &dyn Clock) -> bool {
    is_expired_at(token, buffer_secs, clock.now_ms())
}

/// Same as [`is_expired`] at a fixed instant.
pub fn is_expired_at(token: Option<&str>, buffer_secs: u64, now_ms: i64) -> bool {
    let Some(token) = token else {
        return true;
    };
    match expires_at_ms(token) {
        Some(exp_ms) => {
            let buffer_ms = i64::try_from(buffer_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
            now_ms.saturating_add(buffer_ms) >= exp_ms
        }
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW_MS: i64 = 1_700_000_000_000;
    const NOW_SECS: i64 = NOW_MS / 1000;

    fn token_with_payload(payload: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(payload);
        let signature = URL_SAFE_NO_PAD.encode("fake-signature");
        format!("{}.{}.{}", header, payload, signature)
    }

    fn token_with_exp(exp: i64) -> String {
        token_with_payload(&format!(r#"{{"exp":{}}}"#, exp))
    }

    #[test]
    fn test_buffer_boundaries() {
        let token = token_with_exp(NOW_SECS + 10);
        assert!(is_expired_at(Some(&token), 30, NOW_MS));
        assert!(!is_expired_at(Some(&token), 5, NOW_MS));
    }

    #[test]
    fn test_exact_boundary_counts_as_expired() {
        let token = token_with_exp(NOW_SECS + 30);
        assert!(is_expired_at(Some(&token), 30, NOW_MS));
        assert!(!is_expired_at(Some(&token), 29, NOW_MS));
    }

    #[test]
    fn test_missing_token_is_expired() {
        assert!(is_expired_at(None, 0, NOW_MS));
        assert!(is_expired(None, DEFAULT_BUFFER_SECS));
    }

    #[test]
    fn test_undecodable_tokens_are_expired() {
        assert!(is_expired_at(Some(""), 0, NOW_MS));
        assert!(is_expired_at(Some("not-a-jwt"), 0, NOW_MS));
        assert!(is_expired_at(Some("only.two"), 0, NOW_MS));
        assert!(is_expired_at(Some("a.b.c.d"), 0, NOW_MS));
        assert!(is_expired_at(Some("header.!!!invalid!!!.sig"), 0, NOW_MS));

        let not_json = format!("h.{}.s", URL_SAFE_NO_PAD.encode("plain text"));
        assert!(is_expired_at(Some(&not_json), 0, NOW_MS));
    }

    #[test]
    fn test_missing_exp_is_expired() {
        let token = token_with_payload(r#"{"sub":"user-1"}"#);
        assert!(is_expired_at(Some(&token), 0, NOW_MS));
    }

    #[test]
    fn test_padded_payload_decodes() {
        let header = URL_SAFE_NO_PAD.encode("{}");
        let payload = base64::engine::general_purpose::URL_SAFE
            .encode(format!(r#"{{"exp":{}}}"#, NOW_SECS + 3600));
        let token = format!("{}.{}.sig", header, payload);
        assert!(!is_expired_at(Some(&token), 30, NOW_MS));
    }

    #[test]
    fn test_float_exp() {
        let token = token_with_payload(&format!(r#"{{"exp":{}.5}}"#, NOW_SECS + 60));
        assert_eq!(expires_at_ms(&token), Some((NOW_SECS + 60) * 1000 + 500));
    }

    #[test]
    fn test_decode_claims_reads_subject_and_role() {
        let token = token_with_payload(r#"{"exp":1,"sub":"u1","role":"admin"}"#);
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("u1"));
        assert_eq!(claims.role.as_deref(), Some("admin"));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode_claims("x"), Err(DecodeError::Malformed));
        assert_eq!(decode_claims("a..c"), Err(DecodeError::Malformed));
        assert!(matches!(
            decode_claims("a.%%%.c"),
            Err(DecodeError::Base64(_))
        ));
    }

    #[test]
    fn test_system_clock_variant() {
        let far_future = token_with_exp(chrono::Utc::now().timestamp() + 3600);
        assert!(!is_expired(Some(&far_future), DEFAULT_BUFFER_SECS));
        let past = token_with_exp(chrono::Utc::now().timestamp() - 1);
        assert!(is_expired(Some(&past), 0));
    }
}
