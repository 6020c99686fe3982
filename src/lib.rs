#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

//! # LearnHub CLI
//!
//! Client-side session management for the LearnHub learning platform.
//!
//! ## Architecture
//!
//! This library is organized into several key modules:
//!
//! - **[`error`]** - Error types and the session failure taxonomy
//! - **[`config`]** - Configuration and session tuning constants
//! - **[`storage`]** - Credential and identity persistence
//! - **[`token`]** - Credential pair types and signature-free token inspection
//! - **[`refresh`]** - Serialized, budget-bounded token refresh
//! - **[`interceptor`]** - The HTTP gateway with transparent auth recovery
//! - **[`session`]** - The top-level session controller and route guard
//! - **[`api`]** - Wire types for the login-family endpoints
//! - **[`cli`]** - Command-line argument parsing
//!
//! ## Quick Start
//!
//! ```bash
//! learnhub login    # Authenticate
//! learnhub status   # Inspect the session and token validity
//! learnhub logout   # End the session
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod interceptor;
pub mod refresh;
pub mod session;
pub mod storage;
pub mod token;

#[cfg(test)]
pub(crate) mod testutil;

/// Error type aliases for convenience
pub use error::{AuthError, LogoutReason, Result};

/// Configuration type alias for convenience
pub use config::Config;

/// Session types for convenience
pub use session::{Role, Session, SessionController, UserIdentity};

/// Credential pair type for convenience
pub use token::CredentialPair;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = "learnhub";
