//! Auth session controller.
//!
//! Owns one [`AuthState`] and keeps it in step with the identity provider:
//! fetches the current session on start, follows the provider's change
//! notifications, and runs an admin check every time a user shows up.
//!
//! A session close to expiry is handed back to the provider, which refreshes
//! it and announces the new one, so the admin check runs again. A session the
//! provider cannot renew ends at its expiry.
//!
//! Admin checks run concurrently with everything else. A check only lands
//! if the identity it was started for is still the current one.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use masjid_core::{AuthEventKind, Email, Session, UserIdentity};

use super::capability::{AuthChange, AuthSubscription, IdentityProvider};
use super::error::AuthError;
use super::resolver::AdminResolver;
use super::store::{AuthState, SessionStore};

/// Shortest password the identity provider accepts.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Default bound on [`AuthController::settled`].
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

// Access tokens of sessions ended locally; notifications carrying them are late.
const SUPERSEDED_TOKENS_KEPT: usize = 8;

/// Wait before asking the provider again about a session it failed to check
/// or already replaced.
const SESSION_RECHECK_DELAY: Duration = Duration::from_secs(5);

/// Controller settings.
#[derive(Debug, Clone)]
pub struct AuthControllerOptions {
    /// Where confirmation and password-reset links send the user.
    pub redirect_to: String,
    /// Upper bound on waiting for state to settle.
    pub settle_timeout: Duration,
}

impl AuthControllerOptions {
    /// Options with the given redirect target and the default settle timeout.
    #[must_use]
    pub fn new(redirect_to: impl Into<String>) -> Self {
        Self {
            redirect_to: redirect_to.into(),
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
        }
    }
}

struct ControllerCore {
    identity: Arc<dyn IdentityProvider>,
    resolver: AdminResolver,
    store: SessionStore,
    options: AuthControllerOptions,
    initialized: AtomicBool,
    superseded: Mutex<VecDeque<String>>,
    last_issued: Mutex<Option<String>>,
    resolution: Mutex<Option<JoinHandle<()>>>,
    // Access token and the earliest time it is checked again.
    deferred_check: Mutex<Option<(String, Instant)>>,
}

/// Single source of truth for who is signed in and whether they are an admin.
///
/// Reads go through [`AuthController::state`] / [`AuthController::watch`];
/// writes only happen inside the controller. Dropping the controller stops
/// its listener and releases the provider subscription.
pub struct AuthController {
    core: Arc<ControllerCore>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl AuthController {
    /// Start a controller.
    ///
    /// Subscribes to the provider first, then fetches the current session,
    /// then processes notifications in arrival order. Must be called from
    /// within a Tokio runtime.
    #[must_use]
    pub fn start(
        identity: Arc<dyn IdentityProvider>,
        resolver: AdminResolver,
        options: AuthControllerOptions,
    ) -> Self {
        let subscription = identity.subscribe();
        let core = Arc::new(ControllerCore {
            identity,
            resolver,
            store: SessionStore::new(),
            options,
            initialized: AtomicBool::new(false),
            superseded: Mutex::new(VecDeque::new()),
            last_issued: Mutex::new(None),
            resolution: Mutex::new(None),
            deferred_check: Mutex::new(None),
        });

        let listener = tokio::spawn(Arc::clone(&core).run(subscription));

        Self {
            core,
            listener: Mutex::new(Some(listener)),
        }
    }

    // =========================================================================
    // Read interface
    // =========================================================================

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.core.store.snapshot()
    }

    /// Receiver observing every state change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.core.store.watch()
    }

    /// Wait until the state is no longer loading, bounded by the settle timeout.
    ///
    /// On timeout returns whatever the state is at that point, which fails
    /// closed in the route guard.
    pub async fn settled(&self) -> AuthState {
        let mut rx = self.core.store.watch();
        let wait = rx.wait_for(|state| !state.loading());
        match tokio::time::timeout(self.core.options.settle_timeout, wait).await {
            Ok(Ok(state)) => state.clone(),
            Ok(Err(_)) | Err(_) => {
                warn!("Auth state did not settle in time");
                self.state()
            }
        }
    }

    /// Whether the listener is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.listener)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Sign in with email and password.
    ///
    /// The state change follows from the provider's `signed_in`
    /// notification, so `loading` stays true until the admin check for the
    /// new user lands.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed email, rejected credentials, an
    /// unconfirmed email, or a provider failure. State is left untouched.
    #[instrument(skip(self, email, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let email = Email::parse(email)?;
        self.core.store.update(AuthState::begin_operation);

        match self.core.identity.sign_in_with_password(&email, password).await {
            Ok(session) => {
                *lock(&self.core.last_issued) = Some(session.access_token);
                debug!("Sign-in accepted, waiting for notification");
                Ok(())
            }
            Err(e) => {
                self.core.store.update(AuthState::end_operation);
                debug!(error = %e, "Sign-in rejected");
                Err(e.into())
            }
        }
    }

    /// Register a new account. Grants nothing: admin rights only ever come
    /// from the admin directory.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed email, a password shorter than
    /// [`MIN_PASSWORD_LENGTH`], an existing account, or a provider failure.
    #[instrument(skip(self, email, password))]
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<UserIdentity, AuthError> {
        let email = Email::parse(email)?;
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::WeakPassword {
                min: MIN_PASSWORD_LENGTH,
            });
        }

        self.core.store.update(AuthState::begin_operation);
        let result = self
            .core
            .identity
            .sign_up(&email, password, &self.core.options.redirect_to)
            .await;
        self.core.store.update(AuthState::end_operation);

        let user = result?;
        info!(user_id = %user.id, "Account registered, awaiting email confirmation");
        Ok(user)
    }

    /// Sign out.
    ///
    /// Local state is cleared before the provider is called, so no admin
    /// view survives past this call even if the provider fails. Calling it
    /// while signed out changes nothing.
    ///
    /// # Errors
    ///
    /// Returns an error when the provider fails to end its session.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let current = self.core.store.snapshot().session().map(|s| s.access_token.clone());
        let issued = lock(&self.core.last_issued).take();
        for token in current.into_iter().chain(issued) {
            self.core.supersede(token);
        }

        if self.core.store.update(AuthState::settle_anonymous) {
            info!("Signed out");
        }

        self.core.identity.sign_out().await.map_err(|e| {
            warn!(error = %e, "Provider sign-out failed after local state was cleared");
            AuthError::from(e)
        })
    }

    /// Email a password-reset link. Does not touch auth state.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed email or a provider failure.
    #[instrument(skip(self, email))]
    pub async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        let email = Email::parse(email)?;
        self.core
            .identity
            .send_password_reset(&email, &self.core.options.redirect_to)
            .await
            .map_err(AuthError::from)
    }

    /// Stop the listener and wait until the subscription is released.
    pub async fn shutdown(&self) {
        self.close();
        let handle = lock(&self.listener).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Abort the listener and any admin check in flight without waiting.
    pub fn close(&self) {
        if let Some(handle) = lock(&self.listener).as_ref() {
            handle.abort();
        }
        if let Some(handle) = lock(&self.core.resolution).take() {
            handle.abort();
        }
    }
}

impl Drop for AuthController {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for AuthController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthController")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Listener
// =============================================================================

impl ControllerCore {
    async fn run(self: Arc<Self>, mut subscription: AuthSubscription) {
        self.initialize().await;

        loop {
            let check_at = self.next_session_check();
            tokio::select! {
                change = subscription.recv() => match change {
                    Some(change) => self.handle(change),
                    None => break,
                },
                () = wait_until(check_at) => self.check_session().await,
            }
        }

        debug!("Identity provider closed its notification stream");
    }

    /// When the cached session next needs the provider's attention.
    fn next_session_check(&self) -> Option<Instant> {
        let state = self.store.snapshot();
        let session = state.session()?;
        let due = instant_at(session.refresh_due());
        match &*lock(&self.deferred_check) {
            Some((token, until)) if *token == session.access_token => Some(due.max(*until)),
            _ => Some(due),
        }
    }

    /// Ask the provider for the current session once the cached one is due.
    ///
    /// A provider that refreshes announces the new session itself. A session
    /// that is gone or past its expiry ends here.
    #[instrument(skip(self))]
    async fn check_session(self: &Arc<Self>) {
        let state = self.store.snapshot();
        let Some(cached) = state.session().cloned() else {
            return;
        };
        let epoch = state.epoch();

        let result = self.identity.current_session().await;
        let now = Utc::now();
        match result {
            Ok(Some(current)) if current.access_token != cached.access_token => {
                debug!("Provider replaced the session, waiting for its notification");
                self.defer_check(&cached.access_token, instant_after(SESSION_RECHECK_DELAY));
            }
            Ok(Some(_)) if !cached.is_expired(now) => {
                debug!("Session cannot be refreshed, checking again at expiry");
                self.defer_check(
                    &cached.access_token,
                    instant_at(cached.expires_at).max(instant_after(Duration::from_millis(50))),
                );
            }
            Ok(_) => self.end_session(epoch, cached.access_token),
            Err(e) if cached.is_expired(now) => {
                warn!(error = %e, "Session expired and the provider could not renew it");
                self.end_session(epoch, cached.access_token);
            }
            Err(e) => {
                warn!(error = %e, "Failed to check session, retrying");
                self.defer_check(&cached.access_token, instant_after(SESSION_RECHECK_DELAY));
            }
        }
    }

    fn defer_check(&self, token: &str, until: Instant) {
        *lock(&self.deferred_check) = Some((token.to_owned(), until));
    }

    /// Drop an expired session unless the identity already moved on.
    fn end_session(&self, epoch: u64, token: String) {
        self.supersede(token);
        let ended = self
            .store
            .update(|state| state.epoch() == epoch && state.settle_anonymous());
        if ended {
            info!("Session expired, signed out");
        }
    }

    async fn initialize(self: &Arc<Self>) {
        self.store.update(AuthState::begin_initializing);

        match self.identity.current_session().await {
            Ok(session) => {
                self.initialized.store(true, Ordering::SeqCst);
                self.apply_session(session);
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch current session, starting anonymous");
                self.store.update(AuthState::settle_anonymous);
            }
        }
    }

    fn handle(self: &Arc<Self>, change: AuthChange) {
        debug!(event = %change.kind, "Auth change");

        match change.kind {
            AuthEventKind::InitialSession => {
                if self.initialized.swap(true, Ordering::SeqCst) {
                    debug!("Ignoring initial session, already initialized");
                    return;
                }
                self.apply_session(change.session);
            }
            AuthEventKind::SignedOut => {
                self.store.update(AuthState::settle_anonymous);
            }
            AuthEventKind::SignedIn | AuthEventKind::TokenRefreshed => {
                self.apply_session(change.session);
            }
        }
    }

    fn apply_session(self: &Arc<Self>, session: Option<Session>) {
        match session {
            Some(session) if self.is_superseded(&session.access_token) => {
                debug!("Ignoring notification for a session that already ended");
            }
            Some(session) => self.enter_authenticated(session),
            None => {
                self.store.update(AuthState::settle_anonymous);
            }
        }
    }

    fn enter_authenticated(self: &Arc<Self>, session: Session) {
        let user = session.user.clone();
        let mut epoch = 0;
        self.store.update(|state| {
            epoch = state.authenticate(session);
            true
        });
        debug!(user_id = %user.id, epoch, "User present, checking admin status");

        let core = Arc::clone(self);
        let handle = tokio::spawn(async move { core.resolve_admin(epoch, user).await });
        *lock(&self.resolution) = Some(handle);
    }

    async fn resolve_admin(&self, epoch: u64, user: UserIdentity) {
        let resolution = self.resolver.resolve(&user).await;
        let applied = self.store.update(|state| {
            state.apply_admin_check(
                epoch,
                user.id,
                resolution.is_admin(),
                resolution.check_failed(),
            )
        });

        if applied {
            info!(
                user_id = %user.id,
                is_admin = resolution.is_admin(),
                check_failed = resolution.check_failed(),
                "Admin status settled"
            );
        } else {
            debug!(user_id = %user.id, epoch, "Discarding admin check for superseded identity");
        }
    }

    fn supersede(&self, token: String) {
        let mut superseded = lock(&self.superseded);
        if superseded.contains(&token) {
            return;
        }
        if superseded.len() == SUPERSEDED_TOKENS_KEPT {
            superseded.pop_front();
        }
        superseded.push_back(token);
    }

    fn is_superseded(&self, token: &str) -> bool {
        lock(&self.superseded).iter().any(|t| t == token)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn instant_after(delay: Duration) -> Instant {
    Instant::now() + delay
}

/// The runtime instant matching wall-clock `at`; now if `at` has passed.
fn instant_at(at: DateTime<Utc>) -> Instant {
    instant_after((at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
}

async fn wait_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
