//! Pure token inspection helpers
//!
//! Decodes the payload segment of a JWT without verifying its signature and
//! answers the three questions the session core keeps asking: how long is
//! this token still valid, is it valid at all, and is it close enough to
//! expiry that a silent refresh is due.
//!
//! Signature verification deliberately does not happen here: the client only
//! reads expiry and identity claims for UX decisions, and every claim read
//! client-side is advisory only. The server remains the authority that
//! actually verifies tokens.
//!
//! Malformed input (wrong segment count, undecodable base64, non-JSON
//! payload, missing `exp`) is never an error: it uniformly decodes to
//! "already expired". Callers that need to distinguish a malformed token
//! from an expired one use [`is_structurally_valid`] first.

use base64::{engine::general_purpose::URL_SAFE as B64_URL_SAFE, Engine};
use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::defaults::REFRESH_DUE_WINDOW_SECS;

/// JWT claims (only includes fields we care about)
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Expiration time (seconds since Unix epoch)
    #[serde(default)]
    pub exp: Option<i64>,

    /// Subject (user id)
    #[serde(default)]
    pub sub: Option<String>,

    /// Role claim (admin / instructor / student)
    #[serde(default)]
    pub role: Option<String>,
}

/// Current Unix time in whole seconds
#[allow(clippy::cast_possible_wrap)] // System time in seconds won't overflow i64 for centuries
fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Decode the payload segment of a token into [`Claims`].
///
/// Returns `None` for anything that is not a three-segment token with a
/// base64url JSON payload. No signature check is performed.
#[must_use]
pub fn decode_claims(token: &str) -> Option<Claims> {
    // JWT format: header.payload.signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    let payload = parts[1];

    // Base64url has different padding rules - add padding if missing
    let mut padded = payload.to_string();
    match padded.len() % 4 {
        2 => padded.push_str("=="),
        3 => padded.push('='),
        _ => {}
    }

    let decoded = B64_URL_SAFE.decode(&padded).ok()?;
    serde_json::from_slice::<Claims>(&decoded).ok()
}

/// Remaining validity at an explicit clock reading, in whole seconds.
///
/// Malformed tokens and tokens without an `exp` claim report 0.
#[must_use]
pub fn remaining_seconds_at(token: &str, now: i64) -> u64 {
    let Some(exp) = decode_claims(token).and_then(|c| c.exp) else {
        return 0;
    };

    u64::try_from(exp.saturating_sub(now)).unwrap_or(0)
}

/// Remaining validity of `token` in whole seconds, 0 if expired or malformed
#[must_use]
pub fn remaining_seconds(token: &str) -> u64 {
    remaining_seconds_at(token, now_secs())
}

/// Whether the token is still valid at an explicit clock reading
#[must_use]
pub fn is_valid_at(token: &str, now: i64) -> bool {
    remaining_seconds_at(token, now) > 0
}

/// Whether the token is currently valid (non-zero remaining lifetime)
#[must_use]
pub fn is_valid(token: &str) -> bool {
    is_valid_at(token, now_secs())
}

/// Whether a refresh is due at an explicit clock reading.
///
/// True when the token's remaining lifetime has dropped to the low-water
/// mark or below. The window is generous enough to cover a slow refresh
/// round trip before the token actually expires.
#[must_use]
pub fn is_refresh_due_at(token: &str, now: i64) -> bool {
    remaining_seconds_at(token, now) <= REFRESH_DUE_WINDOW_SECS
}

/// Whether a silent refresh should be triggered for `token` now
#[must_use]
pub fn is_refresh_due(token: &str) -> bool {
    is_refresh_due_at(token, now_secs())
}

/// Whether the token has the three-segment shape of a signed token.
///
/// A structurally invalid access or refresh credential is unrecoverable:
/// callers must force a logout instead of attempting a refresh.
#[must_use]
pub fn is_structurally_valid(token: &str) -> bool {
    token.split('.').count() == 3
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    /// Create a minimal JWT token for testing (header.payload.signature)
    /// The payload contains: {"exp": <`exp_time`>}
    pub(crate) fn jwt_with_exp(exp: i64) -> String {
        let header = B64_URL_SAFE.encode(r#"{"typ":"JWT","alg":"HS256"}"#);
        let payload = B64_URL_SAFE.encode(format!(r#"{{"exp":{exp}}}"#));
        let signature = B64_URL_SAFE.encode("dummy_signature");

        format!("{header}.{payload}.{signature}")
    }

    /// Create a JWT token with identity claims
    pub(crate) fn jwt_with_claims(exp: i64, sub: &str, role: &str) -> String {
        let header = B64_URL_SAFE.encode(r#"{"typ":"JWT","alg":"HS256"}"#);
        let payload =
            B64_URL_SAFE.encode(format!(r#"{{"exp":{exp},"sub":"{sub}","role":"{role}"}}"#));
        let signature = B64_URL_SAFE.encode("dummy_signature");

        format!("{header}.{payload}.{signature}")
    }

    #[test]
    fn remaining_seconds_fresh_token() {
        let now = now_secs();
        let token = jwt_with_exp(now + 3600);

        // Within +-1 of the nominal lifetime immediately after construction
        let remaining = remaining_seconds(&token);
        assert!((3599..=3600).contains(&remaining), "got {remaining}");
    }

    #[test]
    fn remaining_seconds_expired_token_is_zero() {
        let now = now_secs();
        let token = jwt_with_exp(now - 10);

        assert_eq!(remaining_seconds(&token), 0);
        assert!(!is_valid(&token));
    }

    #[test]
    fn remaining_seconds_malformed_inputs_are_zero() {
        assert_eq!(remaining_seconds("not.a.jwt.with.four.parts"), 0);
        assert_eq!(remaining_seconds("not.jwt"), 0);
        assert_eq!(remaining_seconds("notajwt"), 0);
        assert_eq!(remaining_seconds(""), 0);
        assert_eq!(remaining_seconds("header.!!!bad_base64!!!.sig"), 0);
    }

    #[test]
    fn remaining_seconds_non_json_payload_is_zero() {
        let header = B64_URL_SAFE.encode(r#"{"typ":"JWT","alg":"HS256"}"#);
        let payload = B64_URL_SAFE.encode("not valid json");
        let token = format!("{header}.{payload}.sig");

        assert_eq!(remaining_seconds(&token), 0);
    }

    #[test]
    fn remaining_seconds_missing_exp_is_zero() {
        let header = B64_URL_SAFE.encode(r#"{"typ":"JWT","alg":"HS256"}"#);
        let payload = B64_URL_SAFE.encode(r#"{"sub":"user123"}"#);
        let token = format!("{header}.{payload}.sig");

        assert_eq!(remaining_seconds(&token), 0);
        assert!(!is_valid(&token));
    }

    #[test]
    fn expired_implies_invalid() {
        let now = 1_700_000_000;
        for offset in [-3600, -1, 0] {
            let token = jwt_with_exp(now + offset);
            assert_eq!(remaining_seconds_at(&token, now), 0);
            assert!(!is_valid_at(&token, now));
        }
    }

    #[test]
    fn refresh_due_boundary() {
        let now = 1_700_000_000;

        // Exactly 190 seconds remaining: refresh is due
        let at_mark = jwt_with_exp(now + 190);
        assert_eq!(remaining_seconds_at(&at_mark, now), 190);
        assert!(is_refresh_due_at(&at_mark, now));

        // 191 seconds remaining: not yet
        let above_mark = jwt_with_exp(now + 191);
        assert_eq!(remaining_seconds_at(&above_mark, now), 191);
        assert!(!is_refresh_due_at(&above_mark, now));
    }

    #[test]
    fn refresh_due_for_expired_and_malformed() {
        let now = 1_700_000_000;
        assert!(is_refresh_due_at(&jwt_with_exp(now - 100), now));
        assert!(is_refresh_due_at("garbage", now));
    }

    #[test]
    fn structural_validity() {
        assert!(is_structurally_valid("a.b.c"));
        assert!(is_structurally_valid(&jwt_with_exp(0)));
        assert!(!is_structurally_valid("a.b"));
        assert!(!is_structurally_valid("a.b.c.d"));
        assert!(!is_structurally_valid("abc"));
        assert!(!is_structurally_valid(""));
    }

    #[test]
    fn decode_claims_reads_identity() {
        let token = jwt_with_claims(1_800_000_000, "user-42", "student");
        let claims = decode_claims(&token).unwrap();

        assert_eq!(claims.exp, Some(1_800_000_000));
        assert_eq!(claims.sub.as_deref(), Some("user-42"));
        assert_eq!(claims.role.as_deref(), Some("student"));
    }

    #[test]
    fn decode_claims_opaque_token() {
        // Opaque API tokens are not an error, just not decodable
        assert!(decode_claims("lh_abcd1234efgh5678ijkl9012mnop").is_none());
    }
}
