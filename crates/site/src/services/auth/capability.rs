//! Capabilities the auth session core consumes.
//!
//! The identity provider, the admin directory and the security log are
//! external services. The core only sees these traits, so tests can swap in
//! in-memory fakes and the site can plug in the Supabase clients.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use masjid_core::{
    AdminRecord, AuthEventKind, Email, SecurityEvent, SecurityEventRecord, Session, UserId,
    UserIdentity,
};

/// Failure reported by a capability, normalized at the boundary.
///
/// Every provider-specific error payload maps onto exactly one of these.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Email/password pair rejected.
    #[error("invalid login credentials")]
    InvalidCredentials,

    /// Account exists but the confirmation link was never followed.
    #[error("email not confirmed")]
    EmailNotConfirmed,

    /// Sign-up for an email that already has an account.
    #[error("user already registered")]
    AlreadyRegistered,

    /// Permanent rejection of the request itself (weak password, bad input).
    #[error("request rejected: {0}")]
    Validation(String),

    /// Network failure, rate limit or provider outage. Safe to retry.
    #[error("provider unavailable: {0}")]
    Transient(String),
}

impl ProviderError {
    /// Whether the caller may retry the same request.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// One notification from the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChange {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

/// Identity provider: sessions, sign-in, sign-up, password reset.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The session the provider currently holds, refreshed if needed.
    async fn current_session(&self) -> Result<Option<Session>, ProviderError>;

    /// Exchange an email/password pair for a session.
    ///
    /// On success the provider also emits [`AuthEventKind::SignedIn`].
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<Session, ProviderError>;

    /// Register a new account; the confirmation link points at `redirect_to`.
    async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        redirect_to: &str,
    ) -> Result<UserIdentity, ProviderError>;

    /// End the current session. A no-op when there is none.
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Email a password-reset link pointing at `redirect_to`.
    async fn send_password_reset(
        &self,
        email: &Email,
        redirect_to: &str,
    ) -> Result<(), ProviderError>;

    /// Subscribe to auth change notifications.
    ///
    /// The subscription stays registered until the returned value is dropped.
    fn subscribe(&self) -> AuthSubscription;
}

/// Directory of admin records.
#[async_trait]
pub trait AdminDirectory: Send + Sync {
    /// The active admin record for `user_id`, if any.
    async fn find_active_admin_record(
        &self,
        user_id: UserId,
    ) -> Result<Option<AdminRecord>, ProviderError>;

    /// Stamp `last_login` on the user's record.
    async fn touch_last_login(&self, user_id: UserId) -> Result<(), ProviderError>;
}

/// Security audit log.
#[async_trait]
pub trait SecurityLog: Send + Sync {
    /// Append an event.
    async fn record(&self, event: SecurityEvent) -> Result<(), ProviderError>;

    /// The most recent events, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<SecurityEventRecord>, ProviderError>;
}

// =============================================================================
// Event fan-out
// =============================================================================

type Subscribers = Mutex<HashMap<u64, mpsc::UnboundedSender<AuthChange>>>;

#[derive(Default)]
struct HubInner {
    next_id: AtomicU64,
    subscribers: Subscribers,
}

/// Fan-out of [`AuthChange`] notifications to subscribers.
///
/// Identity providers own one hub and hand out subscriptions from it. Each
/// subscriber gets its own unbounded channel, so notifications arrive in
/// emission order and a slow subscriber never blocks the provider.
#[derive(Clone, Default)]
pub struct AuthEventHub {
    inner: Arc<HubInner>,
}

impl AuthEventHub {
    /// Create a hub with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    #[must_use]
    pub fn subscribe(&self) -> AuthSubscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(id, tx);

        AuthSubscription {
            id,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `kind` with `session` to every live subscriber.
    pub fn emit(&self, kind: AuthEventKind, session: Option<Session>) {
        let change = AuthChange { kind, session };
        self.lock()
            .retain(|_, tx| tx.send(change.clone()).is_ok());
    }

    /// Number of registered subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, mpsc::UnboundedSender<AuthChange>>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A registered interest in auth change notifications.
///
/// Dropping the subscription unregisters it from its hub.
pub struct AuthSubscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<AuthChange>,
    hub: Weak<HubInner>,
}

impl AuthSubscription {
    /// Wait for the next notification.
    ///
    /// Returns `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<AuthChange> {
        self.rx.recv().await
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.id);
        }
    }
}

impl std::fmt::Debug for AuthSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSubscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hub_delivers_in_emission_order() {
        let hub = AuthEventHub::new();
        let mut sub = hub.subscribe();

        hub.emit(AuthEventKind::SignedOut, None);
        hub.emit(AuthEventKind::InitialSession, None);

        assert_eq!(sub.recv().await.unwrap().kind, AuthEventKind::SignedOut);
        assert_eq!(sub.recv().await.unwrap().kind, AuthEventKind::InitialSession);
    }

    #[test]
    fn test_dropping_subscription_unregisters_it() {
        let hub = AuthEventHub::new();
        let first = hub.subscribe();
        let second = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        drop(first);
        assert_eq!(hub.subscriber_count(), 1);
        drop(second);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_recv_ends_when_hub_is_dropped() {
        let hub = AuthEventHub::new();
        let mut sub = hub.subscribe();
        drop(hub);
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(ProviderError::Transient("timeout".into()).is_transient());
        assert!(!ProviderError::InvalidCredentials.is_transient());
        assert!(!ProviderError::Validation("weak password".into()).is_transient());
    }
}
