//! Default configuration values and session tuning constants

/// Default API server URL
pub fn default_api_url() -> String {
    "https://api.learnhub.app".to_string()
}

/// Default request timeout in seconds
pub const fn default_timeout() -> u64 {
    30
}

/// Default storage profile name
pub fn default_profile() -> String {
    "default".to_string()
}

/// Refresh low-water mark: a silent refresh is due once a token's remaining
/// lifetime drops to this many seconds. Chosen to trigger renewal well before
/// expiry, covering slow network round trips.
pub const REFRESH_DUE_WINDOW_SECS: u64 = 190;

/// Maximum consecutive failed refresh attempts before the session is ended
pub const MAX_REFRESH_ATTEMPTS: u32 = 3;

/// How long the auth-recovery circuit breaker stays closed to new requests
/// after a 401/403 recovery resolves
pub const RECOVERY_COOLDOWN_MS: u64 = 1000;

/// Interval between background session re-validations (5 minutes)
pub const PERIODIC_CHECK_INTERVAL_SECS: u64 = 300;
