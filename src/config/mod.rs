//! Configuration management for the LearnHub CLI
//!
//! Handles loading, validating, and persisting CLI configuration: the API
//! server URL, request timeout, and the storage profile that scopes the
//! on-disk session file.

use crate::error::{AuthError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub mod defaults;

pub use defaults::{
    MAX_REFRESH_ATTEMPTS, PERIODIC_CHECK_INTERVAL_SECS, RECOVERY_COOLDOWN_MS,
    REFRESH_DUE_WINDOW_SECS,
};

/// Main CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API server URL
    #[serde(default = "defaults::default_api_url")]
    pub api_url: String,

    /// Connection timeout in seconds
    #[serde(default = "defaults::default_timeout")]
    pub timeout_secs: u64,

    /// Storage profile name; scopes the session file so parallel profiles
    /// never share credentials
    #[serde(default = "defaults::default_profile")]
    pub profile: String,

    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
}

impl Config {
    /// Load configuration from the default location, falling back to
    /// defaults when no config file exists.
    ///
    /// The `LEARNHUB_API_URL` environment variable overrides the configured
    /// API URL in either case.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };

        if let Ok(url) = std::env::var("LEARNHUB_API_URL") {
            if !url.is_empty() {
                config.api_url = url;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| AuthError::ConfigRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&contents).map_err(|e| AuthError::InvalidConfig(e.to_string()))
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| AuthError::ConfigWrite {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| AuthError::Internal(format!("Config serialization failed: {e}")))?;

        fs::write(path, contents).map_err(|e| AuthError::ConfigWrite {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        // Restrictive permissions: the file sits next to credential storage
        #[cfg(unix)]
        {
            use std::fs::Permissions;
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, Permissions::from_mode(0o600)).map_err(|e| {
                AuthError::ConfigWrite {
                    path: path.to_path_buf(),
                    reason: format!("Failed to set permissions: {e}"),
                }
            })?;
        }

        Ok(())
    }

    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_home = std::env::var("XDG_CONFIG_HOME")
            .ok()
            .and_then(|path| if path.is_empty() { None } else { Some(path) })
            .or_else(|| {
                dirs::home_dir().map(|home| home.join(".config").to_string_lossy().to_string())
            });

        config_home
            .ok_or_else(|| {
                AuthError::Internal(
                    "Could not determine config directory: XDG_CONFIG_HOME not set and no home directory found"
                        .to_string(),
                )
            })
            .map(|path| PathBuf::from(path).join("learnhub").join("config.toml"))
    }

    /// Get the session storage directory path
    pub fn session_dir() -> Result<PathBuf> {
        let cache_home = std::env::var("XDG_CACHE_HOME")
            .ok()
            .and_then(|path| if path.is_empty() { None } else { Some(path) })
            .or_else(|| {
                dirs::home_dir().map(|home| home.join(".cache").to_string_lossy().to_string())
            });

        cache_home
            .ok_or_else(|| {
                AuthError::Internal(
                    "Could not determine cache directory: XDG_CACHE_HOME not set and no home directory found"
                        .to_string(),
                )
            })
            .map(|path| PathBuf::from(path).join("learnhub"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_url.is_empty() {
            return Err(AuthError::InvalidConfig(
                "api_url cannot be empty".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(AuthError::InvalidConfig(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.profile.is_empty() {
            return Err(AuthError::InvalidConfig(
                "profile cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: defaults::default_api_url(),
            timeout_secs: defaults::default_timeout(),
            profile: defaults::default_profile(),
            verbose: false,
        }
    }
}
