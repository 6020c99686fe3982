//! Refresh coordinator
//!
//! Exchanges a refresh credential for a new pair at `POST /auth/refresh`,
//! serializing concurrent refresh attempts into a single in-flight network
//! call and enforcing a bounded attempt budget. On a rotating-refresh-token
//! backend a doubled refresh call invalidates one of the two resulting
//! pairs, so the in-flight guard is a correctness requirement, not an
//! optimization.
//!
//! The coordinator never retries internally: a transient failure is only
//! retried by the next independent trigger (another request's 401 or the
//! periodic timer). Once the budget is spent, further calls are refused
//! without touching the network and the caller must force a logout.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::api::{ApiEnvelope, RefreshRequest, TokenPayload};
use crate::config::defaults::MAX_REFRESH_ATTEMPTS;
use crate::error::{AuthError, Result};
use crate::storage::SessionStore;
use crate::token::{inspect, CredentialPair};

/// Serializes and budgets refresh attempts against the backend
#[derive(Debug)]
pub struct RefreshCoordinator {
    http: reqwest::Client,
    refresh_url: String,
    store: Arc<dyn SessionStore>,
    in_flight: AtomicBool,
    attempts: AtomicU32,
    max_attempts: u32,
}

/// Clears the in-flight flag when the owning refresh call completes,
/// including on early return and panic unwind
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl RefreshCoordinator {
    /// Create a coordinator against `base_url` using the given store
    #[must_use]
    pub fn new(base_url: &str, store: Arc<dyn SessionStore>, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            http,
            refresh_url: format!("{}/auth/refresh", base_url.trim_end_matches('/')),
            store,
            in_flight: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
            max_attempts: MAX_REFRESH_ATTEMPTS,
        }
    }

    /// Whether a refresh network call is currently outstanding
    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Consecutive failed attempts since the last success or login
    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Reset the attempt budget (successful refresh or fresh login)
    pub fn reset_attempts(&self) {
        self.attempts.store(0, Ordering::SeqCst);
    }

    /// Exchange the stored refresh credential for a new pair.
    ///
    /// Refused without a network call when:
    /// - the stored refresh credential is absent, malformed, or expired
    ///   ([`AuthError::RefreshTokenExpired`] - the caller must force logout);
    /// - the attempt budget is spent ([`AuthError::RefreshExhausted`]);
    /// - another refresh is already in flight ([`AuthError::RefreshInProgress`] -
    ///   the original triggering caller owns the retry).
    ///
    /// On success the new pair is persisted and the budget resets. On failure
    /// the error is [`AuthError::RefreshExhausted`] once the budget is spent,
    /// otherwise [`AuthError::RefreshTransient`].
    pub async fn refresh(&self) -> Result<CredentialPair> {
        let tokens = self.store.read_tokens();
        let Some(refresh_token) = tokens.refresh_token else {
            return Err(AuthError::RefreshTokenExpired);
        };

        // An expired or malformed refresh credential can never succeed;
        // route straight to forced logout without spending the budget.
        if !inspect::is_valid(&refresh_token) {
            return Err(AuthError::RefreshTokenExpired);
        }

        if self.attempts.load(Ordering::SeqCst) >= self.max_attempts {
            return Err(AuthError::RefreshExhausted);
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AuthError::RefreshInProgress);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(attempt, max = self.max_attempts, "refreshing session tokens");

        match self.exchange(refresh_token).await {
            Ok(pair) => {
                self.store.store_tokens(&pair)?;
                self.attempts.store(0, Ordering::SeqCst);
                tracing::info!("session tokens refreshed");
                Ok(pair)
            }
            Err(err) => {
                tracing::warn!(attempt, error = %err, "token refresh failed");
                if attempt >= self.max_attempts {
                    Err(AuthError::RefreshExhausted)
                } else {
                    Err(AuthError::RefreshTransient(err.to_string()))
                }
            }
        }
    }

    /// One network round trip against the refresh endpoint
    async fn exchange(&self, refresh_token: String) -> Result<CredentialPair> {
        let response = self
            .http
            .post(&self.refresh_url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(AuthError::Api {
                status,
                message: "refresh rejected".to_string(),
            });
        }

        let envelope: ApiEnvelope<TokenPayload> = response.json().await?;
        envelope.into_data(status).map(CredentialPair::from)
    }
}
