//! Credential types and token inspection
//!
//! A credential pair (access + refresh token) is the unit of session
//! currency: the two tokens are issued together, stored together, and
//! rotated together. [`inspect`] provides the pure decoding/expiry helpers
//! used everywhere a token's remaining lifetime matters.

use serde::{Deserialize, Serialize};

pub mod inspect;

/// An access/refresh token pair issued by the LearnHub API.
///
/// Invariant: a pair is only ever persisted as a unit. A lone access or
/// refresh token in storage is treated as a malformed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    /// Short-lived bearer token attached to authenticated requests
    pub access_token: String,

    /// Longer-lived token exchanged for a fresh pair
    pub refresh_token: String,
}

impl CredentialPair {
    /// Create a new pair from its two tokens
    #[must_use]
    pub const fn new(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
        }
    }
}
