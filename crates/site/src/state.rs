//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::SiteConfig;
use crate::services::auth::{
    AdminDirectory, AdminResolver, AuthControllerOptions, AuthSessions, IdentityFactory,
    IdentityProvider, SecurityLog,
};
use crate::services::{PrayerTimesService, PrayerTimesSource, SubmissionsSource};
use crate::supabase::{SupabaseAuth, SupabaseClient, SupabaseError, SupabaseRest};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// per-visitor auth registry, the backend tables and prayer times.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: SiteConfig,
    sessions: AuthSessions,
    security_log: Arc<dyn SecurityLog>,
    submissions: Arc<dyn SubmissionsSource>,
    prayer_times: PrayerTimesService,
}

impl AppState {
    /// Create application state backed by the configured Supabase project.
    ///
    /// Each visitor gets their own GoTrue client on the anon key. The admin
    /// directory, security log, submissions and prayer times share one
    /// PostgREST client on the service-role key, since those requests carry
    /// no user JWT.
    ///
    /// # Errors
    ///
    /// Returns an error if the service-role key is missing or a Supabase
    /// client cannot be built.
    pub fn new(config: SiteConfig) -> Result<Self, SupabaseError> {
        let supabase = &config.supabase;
        let anon = SupabaseClient::new(&supabase.url, supabase.anon_key.clone())?;

        let service_key = supabase
            .require_service_role_key()
            .map_err(|e| SupabaseError::InvalidConfig(e.to_string()))?;
        let rest = Arc::new(SupabaseRest::new(SupabaseClient::new(
            &supabase.url,
            service_key.clone(),
        )?));

        let identity_factory: IdentityFactory = Arc::new(move || {
            Arc::new(SupabaseAuth::new(anon.clone())) as Arc<dyn IdentityProvider>
        });

        Ok(Self::from_parts(
            config,
            identity_factory,
            Arc::clone(&rest) as Arc<dyn AdminDirectory>,
            Arc::clone(&rest) as Arc<dyn SecurityLog>,
            Arc::clone(&rest) as Arc<dyn SubmissionsSource>,
            rest as Arc<dyn PrayerTimesSource>,
        ))
    }

    /// Assemble state from explicit capabilities.
    #[must_use]
    pub fn from_parts(
        config: SiteConfig,
        identity_factory: IdentityFactory,
        directory: Arc<dyn AdminDirectory>,
        security_log: Arc<dyn SecurityLog>,
        submissions: Arc<dyn SubmissionsSource>,
        prayer_source: Arc<dyn PrayerTimesSource>,
    ) -> Self {
        let resolver = AdminResolver::new(directory, Arc::clone(&security_log))
            .with_timeout(config.auth.admin_check_timeout);

        let options = AuthControllerOptions {
            redirect_to: config.auth_redirect_url(),
            settle_timeout: config.auth.settle_timeout,
        };

        let sessions = AuthSessions::new(
            identity_factory,
            resolver,
            options,
            config.auth.session_idle,
        );

        let prayer_times = PrayerTimesService::new(
            prayer_source,
            config.prayer_times.timezone,
            config.prayer_times.cache_ttl,
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                sessions,
                security_log,
                submissions,
                prayer_times,
            }),
        }
    }

    /// Get a reference to the site configuration.
    #[must_use]
    pub fn config(&self) -> &SiteConfig {
        &self.inner.config
    }

    /// Per-visitor auth controllers.
    #[must_use]
    pub fn sessions(&self) -> &AuthSessions {
        &self.inner.sessions
    }

    /// The security audit log.
    #[must_use]
    pub fn security_log(&self) -> &Arc<dyn SecurityLog> {
        &self.inner.security_log
    }

    /// Contact messages and registrations.
    #[must_use]
    pub fn submissions(&self) -> &Arc<dyn SubmissionsSource> {
        &self.inner.submissions
    }

    /// Prayer times lookup.
    #[must_use]
    pub fn prayer_times(&self) -> &PrayerTimesService {
        &self.inner.prayer_times
    }
}
