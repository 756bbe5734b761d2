//! In-memory auth state and its single-writer store.

use std::sync::Arc;

use tokio::sync::watch;

use masjid_core::{Session, UserId, UserIdentity};

/// Where the controller's state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthPhase {
    /// Constructed, nothing fetched yet.
    Uninitialized,
    /// Fetching the provider's current session.
    Initializing,
    /// No user.
    Anonymous,
    /// A user is present and the admin check has not settled.
    AuthenticatedUnknownRole,
    /// A user with an active admin record.
    AuthenticatedAdmin,
    /// A user without admin rights, or whose admin check failed.
    AuthenticatedNonAdmin,
}

/// Snapshot of who is signed in and whether they are an admin.
///
/// Only the controller changes this; everybody else reads clones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    phase: AuthPhase,
    session: Option<Session>,
    operation_pending: bool,
    admin_check_failed: bool,
    epoch: u64,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            phase: AuthPhase::Uninitialized,
            session: None,
            operation_pending: false,
            admin_check_failed: false,
            epoch: 0,
        }
    }
}

impl AuthState {
    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> AuthPhase {
        self.phase
    }

    /// The signed-in user.
    #[must_use]
    pub fn user(&self) -> Option<&UserIdentity> {
        self.session.as_ref().map(|s| &s.user)
    }

    /// The cached provider session.
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// `Some(true)`/`Some(false)` once settled, `None` while unknown.
    ///
    /// Anonymous visitors are never admins.
    #[must_use]
    pub const fn is_admin(&self) -> Option<bool> {
        match self.phase {
            AuthPhase::AuthenticatedAdmin => Some(true),
            AuthPhase::AuthenticatedNonAdmin | AuthPhase::Anonymous => Some(false),
            AuthPhase::Uninitialized
            | AuthPhase::Initializing
            | AuthPhase::AuthenticatedUnknownRole => None,
        }
    }

    /// Whether a decision depending on admin status must wait.
    #[must_use]
    pub const fn loading(&self) -> bool {
        self.operation_pending || self.is_admin().is_none()
    }

    /// Whether the last admin check failed and was settled as non-admin.
    #[must_use]
    pub const fn admin_check_failed(&self) -> bool {
        self.admin_check_failed
    }

    /// Identity generation; bumps whenever the user or session changes.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    fn user_id(&self) -> Option<UserId> {
        self.user().map(|u| u.id)
    }

    // -------------------------------------------------------------------------
    // Transitions. Each returns whether anything changed.
    // -------------------------------------------------------------------------

    pub(crate) fn begin_initializing(&mut self) -> bool {
        if self.phase != AuthPhase::Uninitialized {
            return false;
        }
        self.phase = AuthPhase::Initializing;
        true
    }

    pub(crate) fn settle_anonymous(&mut self) -> bool {
        let changed = self.phase != AuthPhase::Anonymous
            || self.session.is_some()
            || self.operation_pending;
        if !changed {
            return false;
        }
        if self.session.is_some() || self.phase != AuthPhase::Anonymous {
            self.epoch += 1;
        }
        self.phase = AuthPhase::Anonymous;
        self.session = None;
        self.operation_pending = false;
        self.admin_check_failed = false;
        true
    }

    /// Enter `AuthenticatedUnknownRole` for `session`; returns the new epoch.
    pub(crate) fn authenticate(&mut self, session: Session) -> u64 {
        self.epoch += 1;
        self.phase = AuthPhase::AuthenticatedUnknownRole;
        self.session = Some(session);
        self.admin_check_failed = false;
        self.epoch
    }

    /// Apply an admin check started at `epoch` for `user_id`.
    ///
    /// Discarded when the identity moved on since the check started.
    pub(crate) fn apply_admin_check(
        &mut self,
        epoch: u64,
        user_id: UserId,
        is_admin: bool,
        check_failed: bool,
    ) -> bool {
        if self.epoch != epoch
            || self.user_id() != Some(user_id)
            || self.phase != AuthPhase::AuthenticatedUnknownRole
        {
            return false;
        }
        self.phase = if is_admin {
            AuthPhase::AuthenticatedAdmin
        } else {
            AuthPhase::AuthenticatedNonAdmin
        };
        self.admin_check_failed = check_failed;
        self.operation_pending = false;
        true
    }

    pub(crate) fn begin_operation(&mut self) -> bool {
        if self.operation_pending {
            return false;
        }
        self.operation_pending = true;
        true
    }

    pub(crate) fn end_operation(&mut self) -> bool {
        if !self.operation_pending {
            return false;
        }
        self.operation_pending = false;
        true
    }
}

/// Holder of the one [`AuthState`] value.
///
/// Cloning shares the value. Writes go through [`SessionStore::update`],
/// which only notifies watchers when the transition changed something.
#[derive(Clone, Default)]
pub struct SessionStore {
    tx: Arc<watch::Sender<AuthState>>,
}

impl SessionStore {
    /// A store in [`AuthPhase::Uninitialized`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the current state.
    #[must_use]
    pub fn snapshot(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    /// Receiver that observes every change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    /// Run a transition under the store lock.
    pub(crate) fn update(&self, transition: impl FnOnce(&mut AuthState) -> bool) -> bool {
        self.tx.send_if_modified(transition)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, Utc};
    use masjid_core::Email;
    use uuid::Uuid;

    use super::*;

    fn session_for(email: &str) -> Session {
        let now = Utc::now();
        Session {
            access_token: "token".into(),
            refresh_token: None,
            user: UserIdentity {
                id: UserId::new(Uuid::new_v4()),
                email: Email::parse(email).unwrap(),
                email_confirmed_at: Some(now),
            },
            issued_at: now,
            expires_at: now + Duration::hours(1),
        }
    }

    #[test]
    fn test_fresh_state_is_loading_and_unresolved() {
        let state = AuthState::default();
        assert_eq!(state.phase(), AuthPhase::Uninitialized);
        assert!(state.loading());
        assert_eq!(state.is_admin(), None);
        assert!(state.user().is_none());
    }

    #[test]
    fn test_stale_admin_check_is_discarded() {
        let mut state = AuthState::default();
        let first = session_for("first@example.com");
        let first_id = first.user.id;
        let first_epoch = state.authenticate(first);

        let second = session_for("second@example.com");
        let second_id = second.user.id;
        let second_epoch = state.authenticate(second);

        assert!(!state.apply_admin_check(first_epoch, first_id, true, false));
        assert_eq!(state.phase(), AuthPhase::AuthenticatedUnknownRole);

        assert!(state.apply_admin_check(second_epoch, second_id, false, false));
        assert_eq!(state.is_admin(), Some(false));
    }

    #[test]
    fn test_admin_check_after_sign_out_is_discarded() {
        let mut state = AuthState::default();
        let session = session_for("admin@example.com");
        let id = session.user.id;
        let epoch = state.authenticate(session);
        assert!(state.settle_anonymous());

        assert!(!state.apply_admin_check(epoch, id, true, false));
        assert_eq!(state.phase(), AuthPhase::Anonymous);
        assert_eq!(state.is_admin(), Some(false));
    }

    #[test]
    fn test_settle_anonymous_is_idempotent() {
        let mut state = AuthState::default();
        assert!(state.settle_anonymous());
        let before = state.clone();
        assert!(!state.settle_anonymous());
        assert_eq!(state, before);
    }

    #[test]
    fn test_store_skips_notification_when_unchanged() {
        let store = SessionStore::new();
        let mut rx = store.watch();
        assert!(store.update(AuthState::settle_anonymous));
        assert!(rx.has_changed().unwrap());
        rx.mark_unchanged();

        assert!(!store.update(AuthState::settle_anonymous));
        assert!(!rx.has_changed().unwrap());
    }
}
