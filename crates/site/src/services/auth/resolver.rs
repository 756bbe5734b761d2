//! Admin role resolution.
//!
//! Looks a user up in the admin directory and settles on a yes/no answer.
//! Every failure path answers "no".

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use masjid_core::{AdminRecord, SecurityEvent, SecurityEventKind, UserIdentity};

use super::capability::{AdminDirectory, SecurityLog};

/// Default bound on a single directory lookup.
pub const DEFAULT_ADMIN_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of one admin check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminResolution {
    /// Active admin record found.
    Admin(AdminRecord),
    /// No record, or the record is inactive.
    NotAdmin,
    /// The directory could not be queried; treated as not admin.
    CheckFailed(String),
}

impl AdminResolution {
    /// Whether this outcome grants admin rights.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self, Self::Admin(_))
    }

    /// Whether this outcome came from a failed lookup.
    #[must_use]
    pub const fn check_failed(&self) -> bool {
        matches!(self, Self::CheckFailed(_))
    }
}

/// Resolves admin status against the directory.
#[derive(Clone)]
pub struct AdminResolver {
    directory: Arc<dyn AdminDirectory>,
    security_log: Arc<dyn SecurityLog>,
    timeout: Duration,
}

impl AdminResolver {
    /// Create a resolver with the default lookup timeout.
    #[must_use]
    pub fn new(directory: Arc<dyn AdminDirectory>, security_log: Arc<dyn SecurityLog>) -> Self {
        Self {
            directory,
            security_log,
            timeout: DEFAULT_ADMIN_CHECK_TIMEOUT,
        }
    }

    /// Override the lookup timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The security log this resolver writes to.
    #[must_use]
    pub fn security_log(&self) -> &Arc<dyn SecurityLog> {
        &self.security_log
    }

    /// Decide whether `user` is an admin.
    ///
    /// The lookup is bounded by the configured timeout. On an active record
    /// the `last_login` stamp is written in the background; on a missing or
    /// inactive record an unauthorized-access event is logged in the
    /// background. Neither write delays the answer.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn resolve(&self, user: &UserIdentity) -> AdminResolution {
        let lookup = self.directory.find_active_admin_record(user.id);

        let resolution = match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(Some(record))) if record.grants_admin() && record.user_id == user.id => {
                AdminResolution::Admin(record)
            }
            Ok(Ok(_)) => AdminResolution::NotAdmin,
            Ok(Err(e)) => {
                warn!(error = %e, "Admin directory lookup failed, denying admin access");
                AdminResolution::CheckFailed(e.to_string())
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis(),
                    "Admin directory lookup timed out, denying admin access"
                );
                AdminResolution::CheckFailed("admin directory lookup timed out".to_owned())
            }
        };

        match &resolution {
            AdminResolution::Admin(record) => {
                debug!(role = %record.role, "Admin record found");
                self.spawn_touch_last_login(user);
            }
            AdminResolution::NotAdmin => {
                debug!("No active admin record");
                self.spawn_unauthorized_access_log(user);
            }
            AdminResolution::CheckFailed(_) => {}
        }

        resolution
    }

    fn spawn_touch_last_login(&self, user: &UserIdentity) {
        let directory = Arc::clone(&self.directory);
        let user_id = user.id;
        tokio::spawn(async move {
            if let Err(e) = directory.touch_last_login(user_id).await {
                warn!(%user_id, error = %e, "Failed to update admin last_login");
            }
        });
    }

    fn spawn_unauthorized_access_log(&self, user: &UserIdentity) {
        let log = Arc::clone(&self.security_log);
        let event = SecurityEvent::new(
            SecurityEventKind::AdminUnauthorizedAccess,
            format!("Unauthorized admin access attempt by: {}", user.email),
        );
        tokio::spawn(async move {
            if let Err(e) = log.record(event).await {
                warn!(error = %e, "Failed to record unauthorized access attempt");
            }
        });
    }
}

impl std::fmt::Debug for AdminResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminResolver")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
