//! Integration tests for the Masjid portal.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p masjid-integration-tests
//! ```
//!
//! No Supabase project is needed: the identity provider, admin directory,
//! security log, submissions and prayer times source are in-memory fakes
//! that follow the same contracts as the Supabase clients.
//!
//! # Test Categories
//!
//! - `auth_controller` - Controller state machine and concurrency properties
//! - `login_flow` - Login view, route guard and visitor registry
//! - `site_routes` - HTTP routes driven through the router

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use secrecy::SecretString;
use url::Url;

use masjid_core::{
    AdminRecord, AdminRecordId, AdminRole, AuthEventKind, BookRequest, ContactId,
    ContactMessage, Email, LessonRegistration, PrayerTimes, SecurityEvent, SecurityEventId,
    SecurityEventKind, SecurityEventRecord, Session, UserId, UserIdentity,
};
use masjid_site::config::{
    AuthConfig, LogFormat, PrayerTimesConfig, SiteConfig, SupabaseConfig,
};
use masjid_site::services::auth::{
    AdminDirectory, AdminResolver, AuthController, AuthControllerOptions, AuthEventHub,
    AuthSubscription, IdentityFactory, IdentityProvider, ProviderError, SecurityLog,
};
use masjid_site::services::{PrayerTimesSource, SubmissionsSource};
use masjid_site::state::AppState;

/// Redirect target handed to the controllers under test.
pub const REDIRECT_TO: &str = "http://localhost:3000/dashboard";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Parse a test email.
///
/// # Panics
///
/// Panics if `email` is not a valid address.
#[must_use]
pub fn email(email: &str) -> Email {
    Email::parse(email).expect("valid test email")
}

// =============================================================================
// Identity provider
// =============================================================================

#[derive(Debug, Clone)]
struct Account {
    id: UserId,
    password: String,
    confirmed: bool,
}

/// In-memory identity provider.
///
/// Behaves like the browser SDK: emits `INITIAL_SESSION` on subscribe and
/// `SIGNED_IN`/`SIGNED_OUT` after the matching calls. `current_session`
/// refreshes a session close to expiry and emits `TOKEN_REFRESHED`, or ends
/// an expired one it cannot refresh with `SIGNED_OUT`. Clones made with
/// [`FakeIdentity::another_browser`] share accounts but not sessions.
pub struct FakeIdentity {
    accounts: Arc<Mutex<HashMap<Email, Account>>>,
    session: Mutex<Option<Session>>,
    last_issued: Mutex<Option<Session>>,
    session_lifetime: Mutex<chrono::Duration>,
    refreshes: AtomicUsize,
    hub: AuthEventHub,
    sign_in_delay: Mutex<Duration>,
    fail_current_session: AtomicBool,
    fail_sign_out: AtomicBool,
    redirects: Mutex<Vec<String>>,
    resets: Mutex<Vec<Email>>,
}

impl Default for FakeIdentity {
    fn default() -> Self {
        Self {
            accounts: Arc::default(),
            session: Mutex::new(None),
            last_issued: Mutex::new(None),
            session_lifetime: Mutex::new(chrono::Duration::hours(1)),
            refreshes: AtomicUsize::new(0),
            hub: AuthEventHub::new(),
            sign_in_delay: Mutex::new(Duration::ZERO),
            fail_current_session: AtomicBool::new(false),
            fail_sign_out: AtomicBool::new(false),
            redirects: Mutex::default(),
            resets: Mutex::default(),
        }
    }
}

impl FakeIdentity {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A provider for another browser: same accounts, no session.
    #[must_use]
    pub fn another_browser(&self) -> Arc<Self> {
        Arc::new(Self {
            accounts: Arc::clone(&self.accounts),
            ..Self::default()
        })
    }

    /// Register a confirmed account.
    pub fn add_user(&self, address: &str, password: &str) -> UserIdentity {
        let email = email(address);
        let id = UserId::new(uuid::Uuid::new_v4());
        lock(&self.accounts).insert(
            email.clone(),
            Account {
                id,
                password: password.to_owned(),
                confirmed: true,
            },
        );
        UserIdentity {
            id,
            email,
            email_confirmed_at: Some(Utc::now()),
        }
    }

    /// Mark an account's email as confirmed.
    pub fn confirm(&self, address: &str) {
        if let Some(account) = lock(&self.accounts).get_mut(&email(address)) {
            account.confirmed = true;
        }
    }

    /// Start with a persisted session for `user`, as after a page reload.
    pub fn restore_session(&self, user: &UserIdentity) {
        *lock(&self.session) = Some(session_for(user));
    }

    /// Start with a persisted session for `user` expiring after `lifetime`.
    /// Without a refresh token the session cannot be renewed.
    pub fn restore_expiring_session(
        &self,
        user: &UserIdentity,
        lifetime: chrono::Duration,
        refreshable: bool,
    ) {
        let mut session = session_lasting(user, lifetime);
        if !refreshable {
            session.refresh_token = None;
        }
        *lock(&self.session) = Some(session);
    }

    /// Lifetime of sessions issued from now on, refreshes included.
    pub fn set_session_lifetime(&self, lifetime: chrono::Duration) {
        *lock(&self.session_lifetime) = lifetime;
    }

    /// The session this browser holds.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        lock(&self.session).clone()
    }

    /// How many times a session was refreshed.
    #[must_use]
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Delay every password sign-in.
    pub fn set_sign_in_delay(&self, delay: Duration) {
        *lock(&self.sign_in_delay) = delay;
    }

    /// Make `current_session` fail with a transient error.
    pub fn fail_current_session(&self, fail: bool) {
        self.fail_current_session.store(fail, Ordering::SeqCst);
    }

    /// Make `sign_out` fail after dropping the local session.
    pub fn fail_sign_out(&self, fail: bool) {
        self.fail_sign_out.store(fail, Ordering::SeqCst);
    }

    /// Emit a notification, as the provider would on its own.
    pub fn emit(&self, kind: AuthEventKind, session: Option<Session>) {
        self.hub.emit(kind, session);
    }

    /// The most recent session handed out by `sign_in_with_password`.
    #[must_use]
    pub fn last_issued(&self) -> Option<Session> {
        lock(&self.last_issued).clone()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    /// Redirect targets passed to sign-up.
    #[must_use]
    pub fn redirects(&self) -> Vec<String> {
        lock(&self.redirects).clone()
    }

    /// Emails that were sent a password reset.
    #[must_use]
    pub fn resets(&self) -> Vec<Email> {
        lock(&self.resets).clone()
    }
}

/// A fresh one-hour session for `user`.
#[must_use]
pub fn session_for(user: &UserIdentity) -> Session {
    session_lasting(user, chrono::Duration::hours(1))
}

/// A fresh session for `user` expiring after `lifetime`.
#[must_use]
pub fn session_lasting(user: &UserIdentity, lifetime: chrono::Duration) -> Session {
    let now = Utc::now();
    Session {
        access_token: format!("access-{}", uuid::Uuid::new_v4()),
        refresh_token: Some(format!("refresh-{}", uuid::Uuid::new_v4())),
        user: user.clone(),
        issued_at: now,
        expires_at: now + lifetime,
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn current_session(&self) -> Result<Option<Session>, ProviderError> {
        if self.fail_current_session.load(Ordering::SeqCst) {
            return Err(ProviderError::Transient("auth service unavailable".into()));
        }

        let now = Utc::now();
        let Some(session) = self.session() else {
            return Ok(None);
        };
        if !session.needs_refresh(now) {
            return Ok(Some(session));
        }

        if session.refresh_token.is_some() {
            let lifetime = *lock(&self.session_lifetime);
            let refreshed = session_lasting(&session.user, lifetime);
            *lock(&self.session) = Some(refreshed.clone());
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            self.hub
                .emit(AuthEventKind::TokenRefreshed, Some(refreshed.clone()));
            return Ok(Some(refreshed));
        }

        if session.is_expired(now) {
            *lock(&self.session) = None;
            self.hub.emit(AuthEventKind::SignedOut, None);
            return Ok(None);
        }
        Ok(Some(session))
    }

    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<Session, ProviderError> {
        let delay = *lock(&self.sign_in_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let account = lock(&self.accounts)
            .get(email)
            .cloned()
            .ok_or(ProviderError::InvalidCredentials)?;
        if account.password != password {
            return Err(ProviderError::InvalidCredentials);
        }
        if !account.confirmed {
            return Err(ProviderError::EmailNotConfirmed);
        }

        let lifetime = *lock(&self.session_lifetime);
        let session = session_lasting(
            &UserIdentity {
                id: account.id,
                email: email.clone(),
                email_confirmed_at: Some(Utc::now()),
            },
            lifetime,
        );
        *lock(&self.session) = Some(session.clone());
        *lock(&self.last_issued) = Some(session.clone());
        self.hub.emit(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        redirect_to: &str,
    ) -> Result<UserIdentity, ProviderError> {
        if password.chars().count() < 6 {
            return Err(ProviderError::Validation(
                "Password should be at least 6 characters.".into(),
            ));
        }

        let mut accounts = lock(&self.accounts);
        if accounts.contains_key(email) {
            return Err(ProviderError::AlreadyRegistered);
        }
        let id = UserId::new(uuid::Uuid::new_v4());
        accounts.insert(
            email.clone(),
            Account {
                id,
                password: password.to_owned(),
                confirmed: false,
            },
        );
        lock(&self.redirects).push(redirect_to.to_owned());

        Ok(UserIdentity {
            id,
            email: email.clone(),
            email_confirmed_at: None,
        })
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let had_session = lock(&self.session).take().is_some();
        if had_session {
            self.hub.emit(AuthEventKind::SignedOut, None);
        }
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(ProviderError::Transient("logout request failed".into()));
        }
        Ok(())
    }

    async fn send_password_reset(
        &self,
        email: &Email,
        _redirect_to: &str,
    ) -> Result<(), ProviderError> {
        lock(&self.resets).push(email.clone());
        Ok(())
    }

    fn subscribe(&self) -> AuthSubscription {
        let subscription = self.hub.subscribe();
        self.hub
            .emit(AuthEventKind::InitialSession, lock(&self.session).clone());
        subscription
    }
}

// =============================================================================
// Admin directory
// =============================================================================

/// In-memory admin directory with per-user latency and failure injection.
#[derive(Default)]
pub struct FakeDirectory {
    records: Mutex<HashMap<UserId, AdminRecord>>,
    delays: Mutex<HashMap<UserId, Duration>>,
    failing: AtomicBool,
    touched: Mutex<Vec<UserId>>,
}

impl FakeDirectory {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Give `user` an admin record.
    pub fn grant(&self, user: &UserIdentity, role: AdminRole, is_active: bool) {
        lock(&self.records).insert(
            user.id,
            AdminRecord {
                id: AdminRecordId::new(uuid::Uuid::new_v4()),
                user_id: user.id,
                email: user.email.clone(),
                role: role.as_str().to_owned(),
                is_active,
                last_login: None,
            },
        );
    }

    /// Deactivate `user`'s record.
    pub fn revoke(&self, user: &UserIdentity) {
        if let Some(record) = lock(&self.records).get_mut(&user.id) {
            record.is_active = false;
        }
    }

    /// Make lookups for `user` take `delay`.
    pub fn set_delay(&self, user: &UserIdentity, delay: Duration) {
        lock(&self.delays).insert(user.id, delay);
    }

    /// Make every lookup fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Users whose `last_login` was stamped.
    #[must_use]
    pub fn touched(&self) -> Vec<UserId> {
        lock(&self.touched).clone()
    }
}

#[async_trait]
impl AdminDirectory for FakeDirectory {
    async fn find_active_admin_record(
        &self,
        user_id: UserId,
    ) -> Result<Option<AdminRecord>, ProviderError> {
        let delay = lock(&self.delays).get(&user_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Transient("directory unavailable".into()));
        }
        Ok(lock(&self.records)
            .get(&user_id)
            .filter(|record| record.is_active)
            .cloned())
    }

    async fn touch_last_login(&self, user_id: UserId) -> Result<(), ProviderError> {
        lock(&self.touched).push(user_id);
        if let Some(record) = lock(&self.records).get_mut(&user_id) {
            record.last_login = Some(Utc::now());
        }
        Ok(())
    }
}

// =============================================================================
// Security log
// =============================================================================

/// Security log that keeps every event in memory.
#[derive(Default)]
pub struct RecordingSecurityLog {
    events: Mutex<Vec<SecurityEvent>>,
}

impl RecordingSecurityLog {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every recorded event, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<SecurityEvent> {
        lock(&self.events).clone()
    }

    /// Recorded events of `kind`.
    #[must_use]
    pub fn of_kind(&self, kind: SecurityEventKind) -> Vec<SecurityEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.kind == kind)
            .collect()
    }
}

#[async_trait]
impl SecurityLog for RecordingSecurityLog {
    async fn record(&self, event: SecurityEvent) -> Result<(), ProviderError> {
        lock(&self.events).push(event);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<SecurityEventRecord>, ProviderError> {
        Ok(lock(&self.events)
            .iter()
            .rev()
            .take(limit)
            .map(|event| SecurityEventRecord {
                id: SecurityEventId::new(uuid::Uuid::new_v4()),
                user_id: None,
                event_type: event.kind.as_str().to_owned(),
                event_description: event.description.clone(),
                ip_address: event.ip_address.clone(),
                user_agent: event.user_agent.clone(),
                created_at: Utc::now(),
            })
            .collect())
    }
}

// =============================================================================
// Prayer times
// =============================================================================

/// Prayer times source holding one current row.
#[derive(Default)]
pub struct FakePrayerTimes {
    current: Mutex<Option<PrayerTimes>>,
}

impl FakePrayerTimes {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Set the current row to a fixed timetable for `date`.
    pub fn set_current(&self, date: NaiveDate) {
        *lock(&self.current) = Some(PrayerTimes {
            date,
            fajr: "05:01:00".into(),
            sunrise: "06:30:00".into(),
            dhuhr: "12:34:00".into(),
            asr: "15:52:00".into(),
            maghrib: "18:38:00".into(),
            isha: "19:59:00".into(),
        });
    }
}

#[async_trait]
impl PrayerTimesSource for FakePrayerTimes {
    async fn current(&self) -> Result<Option<PrayerTimes>, ProviderError> {
        Ok(lock(&self.current).clone())
    }

    async fn for_date(&self, date: NaiveDate) -> Result<Option<PrayerTimes>, ProviderError> {
        Ok(lock(&self.current).clone().filter(|times| times.is_for(date)))
    }

    async fn refresh(&self) -> Result<(), ProviderError> {
        Err(ProviderError::Transient("edge function unavailable".into()))
    }
}

// =============================================================================
// Submissions
// =============================================================================

/// Submissions source with whatever rows a test adds, newest first.
#[derive(Default)]
pub struct FakeSubmissions {
    contacts: Mutex<Vec<ContactMessage>>,
    book_requests: Mutex<Vec<BookRequest>>,
    lesson_registrations: Mutex<Vec<LessonRegistration>>,
    failing: AtomicBool,
}

impl FakeSubmissions {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a contact message received now.
    pub fn add_contact(&self, name: &str, email: &str, message: &str) {
        lock(&self.contacts).insert(
            0,
            ContactMessage {
                id: ContactId::new(uuid::Uuid::new_v4()),
                name: name.to_owned(),
                email: email.to_owned(),
                message: message.to_owned(),
                response_status: None,
                responded_at: None,
                created_at: Utc::now(),
            },
        );
    }

    /// Add a book request.
    pub fn add_book_request(&self, request: BookRequest) {
        lock(&self.book_requests).insert(0, request);
    }

    /// Add a lesson registration.
    pub fn add_lesson_registration(&self, registration: LessonRegistration) {
        lock(&self.lesson_registrations).insert(0, registration);
    }

    /// Make every listing fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn list<T: Clone>(&self, rows: &Mutex<Vec<T>>, limit: usize) -> Result<Vec<T>, ProviderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Transient("rest api unavailable".into()));
        }
        Ok(lock(rows).iter().take(limit).cloned().collect())
    }
}

#[async_trait]
impl SubmissionsSource for FakeSubmissions {
    async fn contacts(&self, limit: usize) -> Result<Vec<ContactMessage>, ProviderError> {
        self.list(&self.contacts, limit)
    }

    async fn book_requests(&self, limit: usize) -> Result<Vec<BookRequest>, ProviderError> {
        self.list(&self.book_requests, limit)
    }

    async fn lesson_registrations(
        &self,
        limit: usize,
    ) -> Result<Vec<LessonRegistration>, ProviderError> {
        self.list(&self.lesson_registrations, limit)
    }
}

// =============================================================================
// Assembly
// =============================================================================

/// Controller settings with short bounds so failures show up quickly.
#[must_use]
pub fn test_options() -> AuthControllerOptions {
    AuthControllerOptions {
        redirect_to: REDIRECT_TO.to_owned(),
        settle_timeout: Duration::from_secs(2),
    }
}

/// Resolver over `directory` with a short lookup timeout.
#[must_use]
pub fn test_resolver(
    directory: &Arc<FakeDirectory>,
    log: &Arc<RecordingSecurityLog>,
) -> AdminResolver {
    AdminResolver::new(
        Arc::clone(directory) as Arc<dyn AdminDirectory>,
        Arc::clone(log) as Arc<dyn SecurityLog>,
    )
    .with_timeout(Duration::from_millis(500))
}

/// Start a controller over the fakes.
#[must_use]
pub fn start_controller(
    identity: &Arc<FakeIdentity>,
    directory: &Arc<FakeDirectory>,
    log: &Arc<RecordingSecurityLog>,
) -> AuthController {
    AuthController::start(
        Arc::clone(identity) as Arc<dyn IdentityProvider>,
        test_resolver(directory, log),
        test_options(),
    )
}

/// Identity factory giving every visitor their own browser over shared accounts.
#[must_use]
pub fn identity_factory(accounts: &Arc<FakeIdentity>) -> IdentityFactory {
    let accounts = Arc::clone(accounts);
    Arc::new(move || accounts.another_browser() as Arc<dyn IdentityProvider>)
}

/// Site configuration for tests; no network access happens with it.
///
/// # Panics
///
/// Panics if the hardcoded URLs fail to parse.
#[must_use]
pub fn test_config() -> SiteConfig {
    SiteConfig {
        host: std::net::IpAddr::from([127, 0, 0, 1]),
        port: 3000,
        base_url: Url::parse("http://localhost:3000").expect("valid base url"),
        supabase: SupabaseConfig {
            url: Url::parse("http://127.0.0.1:54321").expect("valid supabase url"),
            anon_key: SecretString::from("anon-test-key".to_owned()),
            service_role_key: Some(SecretString::from("service-role-test-key".to_owned())),
        },
        auth: AuthConfig {
            admin_check_timeout: Duration::from_millis(500),
            settle_timeout: Duration::from_secs(2),
            session_idle: Duration::from_secs(60),
        },
        prayer_times: PrayerTimesConfig {
            timezone: chrono_tz::Europe::Rome,
            cache_ttl: Duration::from_secs(60),
        },
        log_format: LogFormat::Text,
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// Everything a router test needs.
pub struct TestSite {
    pub state: AppState,
    pub accounts: Arc<FakeIdentity>,
    pub directory: Arc<FakeDirectory>,
    pub log: Arc<RecordingSecurityLog>,
    pub submissions: Arc<FakeSubmissions>,
    pub prayer_times: Arc<FakePrayerTimes>,
}

impl TestSite {
    #[must_use]
    pub fn new() -> Self {
        let accounts = FakeIdentity::new();
        let directory = FakeDirectory::new();
        let log = RecordingSecurityLog::new();
        let submissions = FakeSubmissions::new();
        let prayer_times = FakePrayerTimes::new();

        let state = AppState::from_parts(
            test_config(),
            identity_factory(&accounts),
            Arc::clone(&directory) as Arc<dyn AdminDirectory>,
            Arc::clone(&log) as Arc<dyn SecurityLog>,
            Arc::clone(&submissions) as Arc<dyn SubmissionsSource>,
            Arc::clone(&prayer_times) as Arc<dyn PrayerTimesSource>,
        );

        Self {
            state,
            accounts,
            directory,
            log,
            submissions,
            prayer_times,
        }
    }
}

impl Default for TestSite {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll `condition` until it holds or `within` elapses.
pub async fn eventually(within: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
