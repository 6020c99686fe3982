//! Command-line interface argument parsing
//!
//! Defines all CLI commands and their arguments using Clap.

use clap::{Parser, Subcommand};

/// LearnHub CLI - Session management and authenticated API access
#[derive(Parser, Debug)]
#[command(name = "learnhub")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Manage your LearnHub session: login, silent token refresh, and logout")]
#[command(long_about = concat!(
    "LearnHub (v", env!("CARGO_PKG_VERSION"), ")\n",
    "Client for the LearnHub learning-management API.\n\n",
    "Use 'login' to authenticate, 'status' to inspect the current session and\n",
    "token validity, 'refresh' to renew tokens manually, and 'logout' to end\n",
    "the session."
))]
pub struct Cli {
    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// LearnHub API server URL (overrides config and LEARNHUB_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Storage profile to use (separate profiles never share a session)
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with LearnHub
    ///
    /// Prompts for credentials and saves the session to the profile's
    /// storage file.
    ///
    /// Examples:
    ///   learnhub login
    ///   learnhub login --email ada@example.com
    ///   learnhub login --instructor
    #[command(visible_alias = "auth")]
    #[command(display_order = 1)]
    Login {
        /// Account email (prompted when omitted)
        #[arg(long)]
        email: Option<String>,

        /// Use the instructor login endpoint
        #[arg(long)]
        instructor: bool,
    },

    /// Logout and clear the saved session
    ///
    /// Example:
    ///   learnhub logout
    #[command(display_order = 2)]
    Logout,

    /// Show the current session and token validity
    ///
    /// Runs the same startup check the application performs on load: an
    /// expired refresh token or malformed credentials end the session.
    ///
    /// Example:
    ///   learnhub status
    #[command(visible_alias = "whoami")]
    #[command(display_order = 3)]
    Status,

    /// Renew the session tokens now
    ///
    /// Exchanges the stored refresh token for a fresh pair, the same way
    /// the silent background refresh does.
    ///
    /// Example:
    ///   learnhub refresh
    #[command(display_order = 4)]
    Refresh,

    /// Check CLI version
    ///
    /// Example:
    ///   learnhub version
    #[command(display_order = 5)]
    Version,
}

impl Cli {
    /// Parse command-line arguments
    ///
    /// # Returns
    ///
    /// Parsed CLI arguments
    #[must_use]
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }
}
