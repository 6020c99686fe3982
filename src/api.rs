//! Wire types for the LearnHub API's login family
//!
//! The backend wraps every response in a `{success, data, message}` envelope.
//! Only the login-family contract is modeled here: feature endpoints are the
//! business of the pages calling them, and the auth layer never interprets
//! their bodies.

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};
use crate::session::{Role, UserIdentity};
use crate::token::CredentialPair;

/// Standard response envelope used by the LearnHub API
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Application-level success flag; a 2xx with `success = false` is still
    /// a failure
    pub success: bool,

    /// Payload, present on success
    // A bare `default` would put a `T: Default` bound on the Deserialize
    // impl; the path form keeps the envelope usable for any payload type
    #[serde(default = "Option::default")]
    pub data: Option<T>,

    /// Human-readable message, usually present on failure
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Unwrap the envelope into its payload, converting application-level
    /// failure into an [`AuthError::Api`]
    pub fn into_data(self, status: u16) -> Result<T> {
        if self.success {
            self.data.ok_or_else(|| {
                AuthError::InvalidResponse("success envelope without data".to_string())
            })
        } else {
            Err(AuthError::Api {
                status,
                message: self
                    .message
                    .unwrap_or_else(|| "request rejected".to_string()),
            })
        }
    }
}

/// Body of `POST /auth/refresh`
#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    /// The refresh credential being exchanged
    pub refresh_token: String,
}

/// Payload of a successful refresh: the rotated credential pair
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPayload {
    /// New access token
    pub access_token: String,

    /// New refresh token (rotating-refresh-token backend)
    pub refresh_token: String,
}

impl From<TokenPayload> for CredentialPair {
    fn from(payload: TokenPayload) -> Self {
        Self::new(payload.access_token, payload.refresh_token)
    }
}

/// Body of `POST /auth/login` and `POST /auth/instructor-login`
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    /// Account email
    pub email: String,

    /// Account password (or one-time temporary password for students)
    pub password: String,
}

/// User record returned by the login family
#[derive(Debug, Clone, Deserialize)]
pub struct UserPayload {
    /// Stable user id
    pub id: String,

    /// Display name
    pub name: String,

    /// Role claim
    pub role: Role,

    /// Assigned instructor name, for students
    #[serde(default)]
    pub assigned_instructor: Option<String>,
}

impl From<UserPayload> for UserIdentity {
    fn from(payload: UserPayload) -> Self {
        Self {
            id: payload.id,
            name: payload.name,
            role: payload.role,
            assigned_instructor: payload.assigned_instructor,
        }
    }
}

/// Payload of a successful login.
///
/// Tokens are optional: the temporary-password student flow authenticates
/// without issuing a JWT pair (a tokenless session).
#[derive(Debug, Clone, Deserialize)]
pub struct LoginPayload {
    /// Access token, absent for tokenless logins
    #[serde(default)]
    pub access_token: Option<String>,

    /// Refresh token, absent for tokenless logins
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// The authenticated user
    pub user: UserPayload,
}

impl LoginPayload {
    /// Split the payload into identity and optional credential pair
    #[must_use]
    pub fn into_parts(self) -> (UserIdentity, Option<CredentialPair>) {
        let pair = match (self.access_token, self.refresh_token) {
            (Some(access), Some(refresh)) => Some(CredentialPair::new(access, refresh)),
            _ => None,
        };
        (self.user.into(), pair)
    }
}
