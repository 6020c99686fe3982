//! Error types and handling for the LearnHub CLI
//!
//! Provides structured error types for the session/token subsystem with
//! proper context and error chains for debugging. The taxonomy mirrors the
//! failure-handling policy of the session core: transient refresh failures
//! are retried only by the next independent trigger, exhausted/expired
//! refresh credentials always route to a forced logout, and requests
//! rejected while auth recovery is in progress are distinguishable and
//! non-fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for LearnHub CLI operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// Why a session was forcibly terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The user asked to log out.
    UserRequested,
    /// The refresh credential itself has expired.
    RefreshTokenExpired,
    /// The refresh attempt budget was spent without a successful renewal.
    RefreshExhausted,
    /// A stored credential did not parse as a three-segment token.
    MalformedCredential,
    /// A foreground (startup or reactive) refresh attempt failed.
    RefreshFailed,
}

impl LogoutReason {
    /// User-facing explanation shown before the redirect to the login route.
    #[must_use]
    pub const fn message(self) -> Option<&'static str> {
        match self {
            Self::UserRequested => None,
            Self::RefreshTokenExpired => {
                Some("Your session has expired. Please log in again.")
            }
            Self::RefreshExhausted => {
                Some("Your session could not be renewed. Please log in again.")
            }
            Self::MalformedCredential => {
                Some("Your stored session is invalid. Please log in again.")
            }
            Self::RefreshFailed => Some("Session renewal failed. Please log in again."),
        }
    }
}

/// Comprehensive error types for session and API operations
#[derive(Error, Debug)]
pub enum AuthError {
    // ═══════════════════════════════════════════════════════════════
    // Network & HTTP Errors
    // ═══════════════════════════════════════════════════════════════
    /// HTTP request failed at the transport level
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// API error response from server
    #[error("LearnHub API error: {status} - {message}")]
    Api {
        /// HTTP status code returned by the server
        status: u16,
        /// Message extracted from the response body, if any
        message: String,
    },

    /// Invalid API response format
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    // ═══════════════════════════════════════════════════════════════
    // Session & Refresh Errors
    // ═══════════════════════════════════════════════════════════════
    /// No session is present; the caller must log in first
    #[error("Not logged in. Run 'learnhub login' first")]
    NotLoggedIn,

    /// A request was rejected because auth-failure recovery is underway
    #[error("Authentication recovery in progress; request rejected")]
    RecoveryInProgress,

    /// A refresh was requested while another refresh was already in flight
    #[error("Token refresh already in progress")]
    RefreshInProgress,

    /// One refresh attempt failed; a later trigger may retry
    #[error("Token refresh failed: {0}")]
    RefreshTransient(String),

    /// The refresh attempt budget is spent; the session must end
    #[error("Token refresh attempts exhausted")]
    RefreshExhausted,

    /// The refresh credential is expired or malformed; the session must end
    #[error("Refresh token expired")]
    RefreshTokenExpired,

    /// The session was forcibly terminated
    #[error("Session terminated: {0:?}")]
    SessionTerminated(LogoutReason),

    // ═══════════════════════════════════════════════════════════════
    // Configuration & Storage Errors
    // ═══════════════════════════════════════════════════════════════
    /// Failed to read configuration file
    #[error("Failed to read config from {path}: {reason}")]
    ConfigRead {
        /// Path that could not be read
        path: PathBuf,
        /// Underlying failure description
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to write configuration file
    #[error("Failed to write config to {path}: {reason}")]
    ConfigWrite {
        /// Path that could not be written
        path: PathBuf,
        /// Underlying failure description
        reason: String,
    },

    /// Session storage operation failed
    #[error("Session storage error: {0}")]
    Storage(String),

    // ═══════════════════════════════════════════════════════════════
    // Validation & Input Errors
    // ═══════════════════════════════════════════════════════════════
    /// Invalid input argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Get the exit code for this error
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::NotLoggedIn => 1,
            Self::InvalidArgument(_) | Self::InvalidConfig(_) => 2,
            Self::RefreshExhausted | Self::RefreshTokenExpired | Self::SessionTerminated(_) => 3,
            Self::Http(_) | Self::Api { .. } | Self::InvalidResponse(_) => 4,
            Self::RecoveryInProgress | Self::RefreshInProgress => 5,
            _ => 1,
        }
    }

    /// Whether this error must terminate the session (forced logout)
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::RefreshExhausted | Self::RefreshTokenExpired | Self::SessionTerminated(_)
        )
    }

    /// Whether this error is the non-fatal circuit-breaker rejection
    #[must_use]
    pub const fn is_recovery_rejection(&self) -> bool {
        matches!(self, Self::RecoveryInProgress | Self::RefreshInProgress)
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_force_logout() {
        assert!(AuthError::RefreshExhausted.is_fatal());
        assert!(AuthError::RefreshTokenExpired.is_fatal());
        assert!(!AuthError::RecoveryInProgress.is_fatal());
        assert!(!AuthError::RefreshTransient("timeout".to_string()).is_fatal());
    }

    #[test]
    fn recovery_rejection_is_distinguishable() {
        assert!(AuthError::RecoveryInProgress.is_recovery_rejection());
        assert!(!AuthError::RefreshExhausted.is_recovery_rejection());
    }

    #[test]
    fn user_requested_logout_has_no_message() {
        assert!(LogoutReason::UserRequested.message().is_none());
        assert!(LogoutReason::RefreshExhausted.message().is_some());
    }
}
