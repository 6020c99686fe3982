//! Endpoint classification for the request interceptor
//!
//! Three classes matter to the auth layer: login-family endpoints bypass all
//! credential handling (they must stay reachable with no session), a small
//! allow-list stays reachable while auth-failure recovery is underway, and
//! everything else is a protected feature endpoint.

/// How the interceptor must treat a target endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointClass {
    /// Login, register, refresh, password reset: no header injection, no
    /// failure interception
    LoginFamily,

    /// Health checks and similar: reachable even during auth recovery
    AllowListed,

    /// Regular feature endpoint requiring a bearer credential
    Protected,
}

/// Endpoints exempt from all auth handling
const LOGIN_FAMILY: &[&str] = &[
    "/auth/login",
    "/auth/instructor-login",
    "/auth/register",
    "/auth/refresh",
    "/auth/password-reset",
];

/// Endpoints that stay reachable while the recovery circuit breaker is open
const ALLOW_LIST: &[&str] = &["/health", "/ip"];

/// Classify an API path (without the server base URL)
#[must_use]
pub fn classify(path: &str) -> EndpointClass {
    let bare = path.split('?').next().unwrap_or(path);

    if LOGIN_FAMILY
        .iter()
        .any(|prefix| bare == *prefix || bare.starts_with(&format!("{prefix}/")))
    {
        return EndpointClass::LoginFamily;
    }

    if ALLOW_LIST
        .iter()
        .any(|prefix| bare == *prefix || bare.starts_with(&format!("{prefix}/")))
    {
        return EndpointClass::AllowListed;
    }

    EndpointClass::Protected
}

impl EndpointClass {
    /// Whether a bearer credential should be attached to this endpoint
    #[must_use]
    pub const fn requires_auth(self) -> bool {
        matches!(self, Self::Protected)
    }
}
