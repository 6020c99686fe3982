//! Request interceptor
//!
//! The single HTTP gateway all feature code calls through. It attaches the
//! stored bearer credential to protected endpoints, detects authorization
//! failures (401/403), drives one silent refresh-and-retry cycle, and holds
//! a short-lived circuit breaker open while a recovery is underway so a
//! storm of simultaneous requests cannot each independently rediscover the
//! same expired session.
//!
//! Per-call state machine:
//! `NORMAL -> (401/403) -> RECOVERING -> (refresh ok) -> RETRIED -> NORMAL`,
//! or `RECOVERING -> (refresh failed / refresh token expired) -> LOGGED_OUT`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;

use crate::config::defaults::RECOVERY_COOLDOWN_MS;
use crate::endpoints::{classify, EndpointClass};
use crate::error::{AuthError, LogoutReason, Result};
use crate::refresh::RefreshCoordinator;
use crate::session::SessionState;
use crate::storage::SessionStore;
use crate::token::inspect;

/// An outgoing API call, relative to the configured base URL
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,

    /// Path relative to the base URL, e.g. `/courses`
    pub path: String,

    /// Optional JSON body
    pub body: Option<serde_json::Value>,

    /// Caller-supplied bearer credential; when set, the interceptor does not
    /// attach the stored one
    pub bearer: Option<String>,
}

impl ApiRequest {
    /// A GET request to `path`
    #[must_use]
    pub fn get(path: &str) -> Self {
        Self {
            method: Method::GET,
            path: path.to_string(),
            body: None,
            bearer: None,
        }
    }

    /// A POST request with a JSON body
    pub fn post_json<T: serde::Serialize>(path: &str, body: &T) -> Result<Self> {
        Ok(Self {
            method: Method::POST,
            path: path.to_string(),
            body: Some(serde_json::to_value(body)?),
            bearer: None,
        })
    }
}

/// Globally installed HTTP wrapper with transparent auth recovery
#[derive(Debug)]
pub struct Interceptor {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn SessionStore>,
    coordinator: Arc<RefreshCoordinator>,
    session: Arc<SessionState>,
    recovering: Arc<AtomicBool>,
    cooldown: Duration,
}

impl Interceptor {
    /// Create an interceptor against `base_url`
    #[must_use]
    pub fn new(
        base_url: &str,
        store: Arc<dyn SessionStore>,
        coordinator: Arc<RefreshCoordinator>,
        session: Arc<SessionState>,
        timeout_secs: u64,
    ) -> Self {
        Self::with_cooldown(
            base_url,
            store,
            coordinator,
            session,
            timeout_secs,
            Duration::from_millis(RECOVERY_COOLDOWN_MS),
        )
    }

    /// Create an interceptor with an explicit recovery cooldown
    #[must_use]
    pub fn with_cooldown(
        base_url: &str,
        store: Arc<dyn SessionStore>,
        coordinator: Arc<RefreshCoordinator>,
        session: Arc<SessionState>,
        timeout_secs: u64,
        cooldown: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
            coordinator,
            session,
            recovering: Arc::new(AtomicBool::new(false)),
            cooldown,
        }
    }

    /// Whether an auth-failure recovery is currently suppressing new calls
    #[must_use]
    pub fn recovering(&self) -> bool {
        self.recovering.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn set_recovering(&self, value: bool) {
        self.recovering.store(value, Ordering::SeqCst);
    }

    /// Execute an API call with credential attachment and auth recovery.
    ///
    /// Login-family endpoints bypass all handling. While a recovery is in
    /// progress, calls to anything but the allow-list are rejected with
    /// [`AuthError::RecoveryInProgress`] before reaching the network.
    pub async fn execute(&self, request: ApiRequest) -> Result<reqwest::Response> {
        let class = classify(&request.path);

        // Login-family calls must be reachable with no session at all, and
        // their 401/403 responses are application responses, not session
        // failures.
        if class == EndpointClass::LoginFamily {
            // No injection from the store, but a bearer the caller set
            // explicitly still goes out
            return self.send(&request, request.bearer.as_deref()).await;
        }

        if self.recovering() && class != EndpointClass::AllowListed {
            tracing::debug!(path = %request.path, "rejected: auth recovery in progress");
            return Err(AuthError::RecoveryInProgress);
        }

        let bearer = if request.bearer.is_some() {
            request.bearer.clone()
        } else if class.requires_auth() {
            self.store.read_tokens().access_token
        } else {
            None
        };

        let response = self.send(&request, bearer.as_deref()).await?;
        let status = response.status().as_u16();
        if status != 401 && status != 403 {
            return Ok(response);
        }

        // Tokenless sessions have nothing to refresh; an authorization
        // failure there is the caller's application response
        if self.session.snapshot().tokenless {
            return Ok(response);
        }

        // Entering recovery: suppress new feature calls until the recovery
        // resolves. The cooldown only starts at resolution, so a slow
        // refresh round trip keeps the breaker closed the whole way.
        self.recovering.store(true, Ordering::SeqCst);
        tracing::warn!(path = %request.path, status, "authorization failure, entering recovery");

        if !class.requires_auth() {
            // 401/403 on an allow-listed endpoint is a meaningful
            // application response, not a session failure
            self.schedule_cooldown();
            return Ok(response);
        }

        let result = self.recover_and_retry(request).await;
        self.schedule_cooldown();
        result
    }

    /// Run one refresh and replay the original call once
    async fn recover_and_retry(&self, request: ApiRequest) -> Result<reqwest::Response> {
        let tokens = self.store.read_tokens();
        let refresh_usable = tokens
            .refresh_token
            .as_deref()
            .is_some_and(inspect::is_valid);
        if !refresh_usable {
            return Err(self.force_logout(LogoutReason::RefreshTokenExpired));
        }

        match self.coordinator.refresh().await {
            Ok(pair) => {
                tracing::debug!(path = %request.path, "retrying request with refreshed credentials");
                let retried = self.send(&request, Some(&pair.access_token)).await?;
                Ok(retried)
            }
            // Another trigger owns the in-flight refresh; this caller
            // abandons rather than stacking a second retry.
            Err(AuthError::RefreshInProgress) => Err(AuthError::RecoveryInProgress),
            Err(AuthError::RefreshTokenExpired) => {
                Err(self.force_logout(LogoutReason::RefreshTokenExpired))
            }
            Err(AuthError::RefreshExhausted) => {
                Err(self.force_logout(LogoutReason::RefreshExhausted))
            }
            Err(_) => Err(self.force_logout(LogoutReason::RefreshFailed)),
        }
    }

    fn force_logout(&self, reason: LogoutReason) -> AuthError {
        self.session.force_logout(reason);
        AuthError::SessionTerminated(reason)
    }

    /// Reopen the circuit breaker one cooldown after the recovery resolved,
    /// whatever its outcome
    fn schedule_cooldown(&self) {
        let recovering = self.recovering.clone();
        let cooldown = self.cooldown;
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            recovering.store(false, Ordering::SeqCst);
        });
    }

    async fn send(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.http.request(request.method.clone(), &url);

        if let Some(token) = bearer {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        Ok(builder.send().await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::session::testhooks;
    use crate::storage::{MemoryStore, SessionStore};
    use crate::testutil::{failure_body, token_response_body, TestServer};
    use crate::token::inspect::tests::jwt_with_exp;
    use crate::token::CredentialPair;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[allow(clippy::cast_possible_wrap)]
    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        session: Arc<SessionState>,
        interceptor: Interceptor,
    }

    fn fixture(server: &TestServer) -> Fixture {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let session = testhooks::session_state(store.clone());
        let coordinator = Arc::new(RefreshCoordinator::new(&server.url(), store.clone(), 5));
        let interceptor = Interceptor::with_cooldown(
            &server.url(),
            store.clone(),
            coordinator,
            session.clone(),
            5,
            Duration::from_millis(100),
        );
        Fixture {
            store,
            session,
            interceptor,
        }
    }

    fn seed_tokens(store: &MemoryStore, access_offset: i64, refresh_offset: i64) -> String {
        let access = jwt_with_exp(now() + access_offset);
        store
            .store_tokens(&CredentialPair::new(
                access.clone(),
                jwt_with_exp(now() + refresh_offset),
            ))
            .unwrap();
        access
    }

    #[tokio::test]
    async fn attaches_bearer_to_protected_endpoints() {
        let server = TestServer::with_fixed_response(200, r#"{"success":true,"data":[]}"#);
        let fx = fixture(&server);
        let access = seed_tokens(&fx.store, 3600, 86400);

        let response = fx.interceptor.execute(ApiRequest::get("/courses")).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].bearer(), Some(access.as_str()));
    }

    #[tokio::test]
    async fn caller_supplied_bearer_is_not_overwritten() {
        let server = TestServer::with_fixed_response(200, "{}");
        let fx = fixture(&server);
        seed_tokens(&fx.store, 3600, 86400);

        let mut request = ApiRequest::get("/courses");
        request.bearer = Some("caller.supplied.token".to_string());
        fx.interceptor.execute(request).await.unwrap();

        assert_eq!(server.requests()[0].bearer(), Some("caller.supplied.token"));
    }

    #[tokio::test]
    async fn login_family_bypasses_auth_handling() {
        let server = TestServer::with_fixed_response(401, &failure_body("wrong password"));
        let fx = fixture(&server);
        seed_tokens(&fx.store, 3600, 86400);

        let response = fx
            .interceptor
            .execute(
                ApiRequest::post_json("/auth/login", &serde_json::json!({"email": "a@b.c"}))
                    .unwrap(),
            )
            .await
            .unwrap();

        // Raw 401 comes back: no bearer attached, no recovery, no refresh
        assert_eq!(response.status().as_u16(), 401);
        assert_eq!(server.hits(), 1);
        assert_eq!(server.requests()[0].bearer(), None);
        assert!(!fx.interceptor.recovering());
    }

    #[tokio::test]
    async fn unauthorized_triggers_refresh_and_single_retry() {
        // Distinct expiry from the seeded token so the two never collide
        let new_access = jwt_with_exp(now() + 7200);
        let refresh_body = token_response_body(&new_access, &jwt_with_exp(now() + 86400));
        let server = TestServer::start(Box::new(move |req| {
            if req.path == "/auth/refresh" {
                (200, refresh_body.clone())
            } else if req.bearer().is_some_and(|b| b == new_access) {
                (200, r#"{"success":true,"data":[]}"#.to_string())
            } else {
                (401, failure_body("expired"))
            }
        }));

        let fx = fixture(&server);
        seed_tokens(&fx.store, 3600, 86400); // server treats the old token as expired

        let response = fx.interceptor.execute(ApiRequest::get("/lessons")).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);

        // Original call, refresh, retried call
        assert_eq!(server.hits(), 3);
        let requests = server.requests();
        assert_eq!(requests[0].path, "/lessons");
        assert_eq!(requests[1].path, "/auth/refresh");
        assert_eq!(requests[2].path, "/lessons");
    }

    #[tokio::test]
    async fn expired_refresh_token_forces_logout_without_refresh_call() {
        let server = TestServer::with_fixed_response(401, &failure_body("expired"));
        let fx = fixture(&server);
        seed_tokens(&fx.store, -10, -10);
        testhooks::mark_authenticated(&fx.session);

        let err = fx
            .interceptor
            .execute(ApiRequest::get("/courses"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AuthError::SessionTerminated(LogoutReason::RefreshTokenExpired)
        ));
        // Only the original call reached the network
        assert_eq!(server.hits(), 1);
        assert!(!fx.session.snapshot().authenticated);
        assert!(fx.store.read_tokens().is_empty());
    }

    #[tokio::test]
    async fn failed_recovery_forces_logout() {
        let server = TestServer::start(Box::new(move |req| {
            if req.path == "/auth/refresh" {
                (200, failure_body("rotation conflict"))
            } else {
                (401, failure_body("expired"))
            }
        }));

        let fx = fixture(&server);
        seed_tokens(&fx.store, -10, 86400);
        testhooks::mark_authenticated(&fx.session);

        let err = fx
            .interceptor
            .execute(ApiRequest::get("/courses"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AuthError::SessionTerminated(LogoutReason::RefreshFailed)
        ));
        assert!(!fx.session.snapshot().authenticated);
    }

    #[tokio::test]
    async fn recovery_in_progress_rejects_before_the_network() {
        let server = TestServer::with_fixed_response(200, "{}");
        let fx = fixture(&server);
        seed_tokens(&fx.store, 3600, 86400);

        fx.interceptor.set_recovering(true);

        let err = fx
            .interceptor
            .execute(ApiRequest::get("/courses"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RecoveryInProgress));
        assert_eq!(server.hits(), 0);

        // Allow-listed endpoints stay reachable
        let response = fx.interceptor.execute(ApiRequest::get("/health")).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn unauthorized_on_allow_listed_endpoint_returns_raw_response() {
        let server = TestServer::with_fixed_response(403, &failure_body("nope"));
        let fx = fixture(&server);
        seed_tokens(&fx.store, 3600, 86400);

        let response = fx.interceptor.execute(ApiRequest::get("/health")).await.unwrap();
        assert_eq!(response.status().as_u16(), 403);

        // The breaker still opens, but no refresh was attempted
        assert!(fx.interceptor.recovering());
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn login_family_keeps_caller_supplied_bearer() {
        let server = TestServer::with_fixed_response(200, "{}");
        let fx = fixture(&server);
        seed_tokens(&fx.store, 3600, 86400);

        let mut request =
            ApiRequest::post_json("/auth/password-reset", &serde_json::json!({})).unwrap();
        request.bearer = Some("caller.supplied.token".to_string());
        fx.interceptor.execute(request).await.unwrap();

        assert_eq!(server.requests()[0].bearer(), Some("caller.supplied.token"));
    }

    #[tokio::test]
    async fn breaker_stays_closed_until_recovery_resolves() {
        let new_access = jwt_with_exp(now() + 7200);
        let refresh_body = token_response_body(&new_access, &jwt_with_exp(now() + 86400));
        let server = TestServer::start(Box::new(move |req| {
            if req.path == "/auth/refresh" {
                // Refresh round trip outlasts the 100 ms cooldown
                std::thread::sleep(Duration::from_millis(400));
                (200, refresh_body.clone())
            } else if req.bearer().is_some_and(|b| b == new_access) {
                (200, "{}".to_string())
            } else {
                (401, failure_body("expired"))
            }
        }));

        let fx = fixture(&server);
        seed_tokens(&fx.store, 3600, 86400);

        let interceptor = Arc::new(fx.interceptor);
        let first = {
            let i = interceptor.clone();
            tokio::spawn(async move { i.execute(ApiRequest::get("/lessons")).await })
        };

        // Well past the cooldown but before the refresh resolves: the
        // breaker must still be closed to feature calls
        tokio::time::sleep(Duration::from_millis(250)).await;
        let err = interceptor
            .execute(ApiRequest::get("/courses"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RecoveryInProgress));

        let first = first.await.unwrap().unwrap();
        assert_eq!(first.status().as_u16(), 200);

        // The cooldown runs from resolution
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!interceptor.recovering());
    }

    #[tokio::test]
    async fn recovery_flag_clears_after_cooldown() {
        let server = TestServer::with_fixed_response(403, &failure_body("nope"));
        let fx = fixture(&server);

        let _ = fx.interceptor.execute(ApiRequest::get("/health")).await.unwrap();
        assert!(fx.interceptor.recovering());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!fx.interceptor.recovering());
    }

    #[tokio::test]
    async fn tokenless_session_gets_raw_unauthorized_response() {
        let server = TestServer::with_fixed_response(401, &failure_body("not allowed"));
        let fx = fixture(&server);
        testhooks::mark_tokenless(&fx.session);

        let response = fx.interceptor.execute(ApiRequest::get("/courses")).await.unwrap();
        assert_eq!(response.status().as_u16(), 401);

        // No recovery: session untouched, breaker closed, one network call
        assert!(fx.session.snapshot().authenticated);
        assert!(!fx.interceptor.recovering());
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn no_bearer_attached_for_tokenless_session() {
        let server = TestServer::with_fixed_response(200, "{}");
        let fx = fixture(&server);
        // No tokens in the store at all

        fx.interceptor.execute(ApiRequest::get("/courses")).await.unwrap();
        assert_eq!(server.requests()[0].bearer(), None);
    }
}
