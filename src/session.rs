//! Session controller
//!
//! Top-level coordinator exposed to the rest of the application. Holds the
//! current-user identity and authenticated flag, runs the startup session
//! check, schedules the periodic background re-validation, enforces access
//! control on route changes, and implements logout (clear state, clear
//! storage, redirect).
//!
//! Two independent triggers feed the same [`RefreshCoordinator`]: the
//! reactive path (a request's 401 handled by the interceptor) and the
//! periodic timer here. They are coordinated only through the coordinator's
//! in-flight guard; the timer keeps running even when no requests are being
//! made so idle sessions stay fresh. The two paths deliberately differ in
//! failure tolerance: the reactive path gets one retry via request replay,
//! while a failure detected by the timer ends the session immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::config::defaults::PERIODIC_CHECK_INTERVAL_SECS;
use crate::config::Config;
use crate::error::{AuthError, LogoutReason, Result};
use crate::interceptor::Interceptor;
use crate::refresh::RefreshCoordinator;
use crate::storage::SessionStore;
use crate::token::{inspect, CredentialPair};

/// Role of an authenticated user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Platform administrator
    Admin,
    /// Course instructor
    Instructor,
    /// Enrolled student
    Student,
}

/// Identity of the authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
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

/// Read-only snapshot of the current session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Whether a user is currently authenticated
    pub authenticated: bool,

    /// Whether the startup check is still running
    pub loading: bool,

    /// Whether this is a tokenless (temporary-password) session, for which
    /// refresh and credential attachment are no-ops
    pub tokenless: bool,

    /// The authenticated user, if any
    pub current_user: Option<UserIdentity>,
}

/// Routes reachable without a session
const PUBLIC_ROUTES: &[&str] = &["/login", "/instructor-login", "/register", "/forgot-password"];

/// Whether a route is reachable without authentication
#[must_use]
pub fn is_public_route(route: &str) -> bool {
    let bare = route.split('?').next().unwrap_or(route);
    PUBLIC_ROUTES
        .iter()
        .any(|prefix| bare == *prefix || bare.starts_with(&format!("{prefix}/")))
}

/// Where navigation lands after a route decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// The destination may be rendered
    Allowed,
    /// The user was redirected to the login route
    RedirectedToLogin,
}

/// Outcome of one periodic background check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodicOutcome {
    /// Nothing to do (unauthenticated, tokenless, or refresh already owned
    /// by another trigger)
    Skipped,
    /// Token still comfortably valid; no refresh performed
    NotDue,
    /// A refresh was performed and succeeded
    Refreshed,
    /// An unrecoverable failure ended the session
    LoggedOut,
}

/// Receives hard redirects to the unauthenticated entry route.
///
/// `message` carries the user-facing reason for a forced logout; it is
/// `None` when the redirect should be silent (user-requested logout, or the
/// user is already on a public route).
pub trait NavigationSink: Send + Sync + std::fmt::Debug {
    /// Redirect to the login route, optionally showing a reason first
    fn redirect_to_login(&self, message: Option<&str>);
}

/// Navigation sink for the CLI: prints the reason and the destination
#[derive(Debug, Default)]
pub struct ConsoleNav;

impl NavigationSink for ConsoleNav {
    fn redirect_to_login(&self, message: Option<&str>) {
        use console::style;
        if let Some(message) = message {
            println!("{} {message}", style("!").yellow());
        }
        println!("{} Session ended. Run 'learnhub login' to sign in.", style("→").cyan());
    }
}

/// Shared mutable session state.
///
/// All flags live here as encapsulated per-instance fields (never module
/// globals) so tests can construct isolated instances. The interceptor and
/// the controller both hold an `Arc` to the same instance; the forced-logout
/// decision is centralized in [`SessionState::force_logout`].
#[derive(Debug)]
pub struct SessionState {
    authenticated: AtomicBool,
    loading: AtomicBool,
    tokenless: AtomicBool,
    current_user: Mutex<Option<UserIdentity>>,
    current_route: Mutex<String>,
    store: Arc<dyn SessionStore>,
    nav: Arc<dyn NavigationSink>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl SessionState {
    /// Create empty session state over the given store and navigation sink
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, nav: Arc<dyn NavigationSink>) -> Self {
        Self {
            authenticated: AtomicBool::new(false),
            loading: AtomicBool::new(false),
            tokenless: AtomicBool::new(false),
            current_user: Mutex::new(None),
            current_route: Mutex::new(String::from("/")),
            store,
            nav,
        }
    }

    /// Read-only snapshot of the session
    #[must_use]
    pub fn snapshot(&self) -> Session {
        Session {
            authenticated: self.authenticated.load(Ordering::SeqCst),
            loading: self.loading.load(Ordering::SeqCst),
            tokenless: self.tokenless.load(Ordering::SeqCst),
            current_user: lock(&self.current_user).clone(),
        }
    }

    /// The storage this session reads and clears
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub(crate) fn set_route(&self, route: &str) {
        *lock(&self.current_route) = route.to_string();
    }

    fn on_public_route(&self) -> bool {
        is_public_route(&lock(&self.current_route))
    }

    fn set_authenticated(&self, value: bool) {
        self.authenticated.store(value, Ordering::SeqCst);
    }

    fn set_loading(&self, value: bool) {
        self.loading.store(value, Ordering::SeqCst);
    }

    fn set_tokenless(&self, value: bool) {
        self.tokenless.store(value, Ordering::SeqCst);
    }

    fn set_user(&self, identity: Option<UserIdentity>) {
        *lock(&self.current_user) = identity;
    }

    /// End the session: clear storage and state, then redirect.
    ///
    /// Safe to call repeatedly; a second call on an already-ended session
    /// clears nothing and redirects again. The explanatory message is
    /// suppressed on public routes (the user is already where they need to
    /// be) and for user-requested logouts.
    pub fn force_logout(&self, reason: LogoutReason) {
        if let Err(err) = self.store.clear_all() {
            tracing::warn!(error = %err, "failed to clear session storage during logout");
        }

        self.set_authenticated(false);
        self.set_tokenless(false);
        self.set_loading(false);
        self.set_user(None);

        tracing::info!(?reason, "session ended");

        let message = if self.on_public_route() {
            None
        } else {
            reason.message()
        };
        self.nav.redirect_to_login(message);
    }
}

/// Top-level session coordinator
#[derive(Debug)]
pub struct SessionController {
    state: Arc<SessionState>,
    store: Arc<dyn SessionStore>,
    coordinator: Arc<RefreshCoordinator>,
    interceptor: Arc<Interceptor>,
    periodic: Mutex<Option<JoinHandle<()>>>,
    periodic_interval: Duration,
}

impl SessionController {
    /// Assemble the full session stack from configuration
    #[must_use]
    pub fn new(
        config: &Config,
        store: Arc<dyn SessionStore>,
        nav: Arc<dyn NavigationSink>,
    ) -> Self {
        let state = Arc::new(SessionState::new(store.clone(), nav));
        let coordinator = Arc::new(RefreshCoordinator::new(
            &config.api_url,
            store.clone(),
            config.timeout_secs,
        ));
        let interceptor = Arc::new(Interceptor::new(
            &config.api_url,
            store.clone(),
            coordinator.clone(),
            state.clone(),
            config.timeout_secs,
        ));

        Self {
            state,
            store,
            coordinator,
            interceptor,
            periodic: Mutex::new(None),
            periodic_interval: Duration::from_secs(PERIODIC_CHECK_INTERVAL_SECS),
        }
    }

    /// Override the periodic re-validation interval
    #[must_use]
    pub fn with_periodic_interval(mut self, interval: Duration) -> Self {
        self.periodic_interval = interval;
        self
    }

    /// Read-only snapshot of the session
    #[must_use]
    pub fn session(&self) -> Session {
        self.state.snapshot()
    }

    /// The globally installed HTTP wrapper all feature code must use
    #[must_use]
    pub fn interceptor(&self) -> Arc<Interceptor> {
        self.interceptor.clone()
    }

    /// The refresh coordinator (shared by the timer and the interceptor)
    #[must_use]
    pub fn coordinator(&self) -> Arc<RefreshCoordinator> {
        self.coordinator.clone()
    }

    /// Establish a session after a successful login call.
    ///
    /// When `tokens` is absent the session runs tokenless (the student
    /// temporary-password flow): identity is trusted locally and both the
    /// periodic refresh and interceptor credential attachment become no-ops.
    pub fn login(&self, identity: UserIdentity, tokens: Option<CredentialPair>) -> Result<()> {
        self.store.store_identity(&identity)?;

        match &tokens {
            Some(pair) => {
                self.store.store_tokens(pair)?;
                self.state.set_tokenless(false);
            }
            None => {
                // Drop any stale pair from a previous session
                self.store.clear_tokens()?;
                self.state.set_tokenless(true);
            }
        }

        self.state.set_user(Some(identity));
        self.state.set_authenticated(true);
        self.coordinator.reset_attempts();

        if tokens.is_some() {
            self.spawn_periodic();
        }

        tracing::info!(tokenless = tokens.is_none(), "session established");
        Ok(())
    }

    /// End the session: stop timers, clear storage and state, redirect.
    /// Idempotent.
    pub fn logout(&self) {
        self.stop_periodic();
        self.state.force_logout(LogoutReason::UserRequested);
    }

    /// Startup session check, run once on load.
    ///
    /// Skipped entirely on public routes. A persisted identity without
    /// tokens restores a tokenless session. With tokens, refresh-credential
    /// expiry and access-credential structure are terminal failures; an
    /// invalid access credential triggers a foreground refresh (fatal on
    /// failure), while a merely refresh-due one triggers a best-effort
    /// background refresh that never ends the session.
    pub async fn startup_check(&self, route: &str) -> Result<()> {
        self.state.set_route(route);
        if is_public_route(route) {
            return Ok(());
        }

        self.state.set_loading(true);
        let result = self.startup_inner().await;
        self.state.set_loading(false);
        result
    }

    async fn startup_inner(&self) -> Result<()> {
        let Some(identity) = self.store.read_identity() else {
            // No persisted session: remain unauthenticated
            return Ok(());
        };

        let tokens = self.store.read_tokens();
        if tokens.is_empty() {
            // Tokenless session: trust the locally stored identity
            self.state.set_tokenless(true);
            self.state.set_user(Some(identity));
            self.state.set_authenticated(true);
            tracing::debug!("restored tokenless session");
            return Ok(());
        }

        let (Some(access), Some(refresh)) = (tokens.access_token, tokens.refresh_token) else {
            // Half a pair violates the stored-together invariant
            return Err(self.terminal(LogoutReason::MalformedCredential));
        };

        if !inspect::is_structurally_valid(&refresh) {
            return Err(self.terminal(LogoutReason::MalformedCredential));
        }
        if !inspect::is_valid(&refresh) {
            return Err(self.terminal(LogoutReason::RefreshTokenExpired));
        }
        if !inspect::is_structurally_valid(&access) {
            return Err(self.terminal(LogoutReason::MalformedCredential));
        }

        if !inspect::is_valid(&access) {
            // Foreground refresh before the session is declared usable
            if let Err(err) = self.coordinator.refresh().await {
                let reason = match err {
                    AuthError::RefreshTokenExpired => LogoutReason::RefreshTokenExpired,
                    AuthError::RefreshExhausted => LogoutReason::RefreshExhausted,
                    _ => LogoutReason::RefreshFailed,
                };
                return Err(self.terminal(reason));
            }
        } else if inspect::is_refresh_due(&access) {
            // Best-effort background refresh; startup still succeeds if it
            // fails, the next trigger will retry
            let coordinator = self.coordinator.clone();
            tokio::spawn(async move {
                if let Err(err) = coordinator.refresh().await {
                    tracing::warn!(error = %err, "background startup refresh failed");
                }
            });
        }

        self.state.set_tokenless(false);
        self.state.set_user(Some(identity));
        self.state.set_authenticated(true);
        self.spawn_periodic();
        Ok(())
    }

    fn terminal(&self, reason: LogoutReason) -> AuthError {
        self.state.force_logout(reason);
        AuthError::SessionTerminated(reason)
    }

    /// Route-change enforcement: protected destinations require an
    /// authenticated session, otherwise the user is redirected immediately
    /// (no flash of protected content).
    pub fn guard_route(&self, route: &str) -> RouteDecision {
        self.state.set_route(route);
        if is_public_route(route) || self.state.snapshot().authenticated {
            RouteDecision::Allowed
        } else {
            self.state.nav.redirect_to_login(None);
            RouteDecision::RedirectedToLogin
        }
    }

    /// Run one periodic re-validation now (the timer calls this on its
    /// interval)
    pub async fn periodic_check_once(&self) -> PeriodicOutcome {
        periodic_check(&self.state, &self.coordinator).await
    }

    fn spawn_periodic(&self) {
        let state = self.state.clone();
        let coordinator = self.coordinator.clone();
        let interval = self.periodic_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; the startup check already
            // validated the session, so skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if periodic_check(&state, &coordinator).await == PeriodicOutcome::LoggedOut {
                    break;
                }
            }
        });

        let mut guard = lock(&self.periodic);
        if let Some(old) = guard.replace(handle) {
            old.abort();
        }
    }

    fn stop_periodic(&self) {
        if let Some(handle) = lock(&self.periodic).take() {
            handle.abort();
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        // Timers must not outlive the session they check
        self.stop_periodic();
    }
}

/// One background re-validation pass.
///
/// Failures detected here are immediately fatal, unlike the interceptor's
/// reactive path which gives a refresh one retry via request replay.
pub(crate) async fn periodic_check(
    state: &SessionState,
    coordinator: &RefreshCoordinator,
) -> PeriodicOutcome {
    let session = state.snapshot();
    if !session.authenticated || session.tokenless {
        return PeriodicOutcome::Skipped;
    }

    let tokens = state.store().read_tokens();
    let (Some(access), Some(refresh)) = (tokens.access_token, tokens.refresh_token) else {
        state.force_logout(LogoutReason::MalformedCredential);
        return PeriodicOutcome::LoggedOut;
    };

    // A structurally invalid credential can never be refreshed into a
    // usable session; same terminal handling as the startup check
    if !inspect::is_structurally_valid(&refresh) || !inspect::is_structurally_valid(&access) {
        state.force_logout(LogoutReason::MalformedCredential);
        return PeriodicOutcome::LoggedOut;
    }

    if !inspect::is_valid(&refresh) {
        state.force_logout(LogoutReason::RefreshTokenExpired);
        return PeriodicOutcome::LoggedOut;
    }

    if inspect::is_valid(&access) && !inspect::is_refresh_due(&access) {
        return PeriodicOutcome::NotDue;
    }

    match coordinator.refresh().await {
        Ok(_) => PeriodicOutcome::Refreshed,
        // Another trigger already owns the in-flight refresh
        Err(AuthError::RefreshInProgress) => PeriodicOutcome::Skipped,
        Err(AuthError::RefreshExhausted) => {
            state.force_logout(LogoutReason::RefreshExhausted);
            PeriodicOutcome::LoggedOut
        }
        Err(AuthError::RefreshTokenExpired) => {
            state.force_logout(LogoutReason::RefreshTokenExpired);
            PeriodicOutcome::LoggedOut
        }
        Err(_) => {
            state.force_logout(LogoutReason::RefreshFailed);
            PeriodicOutcome::LoggedOut
        }
    }
}
