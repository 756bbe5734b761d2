//! Route guard and the admin extractor.
//!
//! The guard reads the visitor's [`AuthState`] and picks one of three
//! renderings: a loading page, the login view, or the protected content.
//! It never writes auth state.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};

use chrono::{DateTime, Utc};
use masjid_core::UserIdentity;

use crate::error::AppError;
use crate::services::auth::{AuthError, AuthState, VisitorAuth, VisitorId};
use crate::state::AppState;
use crate::views::LoadingTemplate;
use crate::views::login::{Notice, user_message};

use super::session::CurrentVisitor;

/// What the guard renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// A user is present but their role has not settled.
    Loading,
    /// Show the login view.
    Login,
    /// Render the protected content.
    Protected,
}

/// Access rule for a group of routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteGuard {
    require_admin: bool,
}

impl RouteGuard {
    /// Only active admins get through.
    #[must_use]
    pub const fn admin() -> Self {
        Self {
            require_admin: true,
        }
    }

    /// Any signed-in user gets through.
    #[must_use]
    pub const fn authenticated() -> Self {
        Self {
            require_admin: false,
        }
    }

    /// Decide what to render for `state` right now.
    #[must_use]
    pub fn decide(self, state: &AuthState) -> GuardDecision {
        self.decide_at(state, Utc::now())
    }

    /// Decide what to render for `state` at `now`.
    ///
    /// A session past its expiry counts as signed out, whatever role it
    /// settled with.
    #[must_use]
    pub fn decide_at(self, state: &AuthState, now: DateTime<Utc>) -> GuardDecision {
        match state.session() {
            None => return GuardDecision::Login,
            Some(session) if session.is_expired(now) => return GuardDecision::Login,
            Some(_) => {}
        }
        if !self.require_admin {
            return GuardDecision::Protected;
        }
        match state.is_admin() {
            Some(true) => GuardDecision::Protected,
            Some(false) => GuardDecision::Login,
            None => GuardDecision::Loading,
        }
    }
}

/// Extractor that requires a settled admin.
///
/// Waits for the visitor's auth state to settle (bounded), then applies
/// [`RouteGuard::admin`].
pub struct RequireAdmin {
    pub visitor: VisitorId,
    pub user: UserIdentity,
    pub auth: Arc<VisitorAuth>,
}

/// Why a guarded request did not get the protected content.
pub enum GuardRejection {
    /// Role still unresolved; render the loading page.
    Loading,
    /// Redirect to the login view.
    RedirectToLogin,
    /// Unauthorized response (for API requests).
    Unauthorized,
    /// The visitor could not be established.
    Error(AppError),
}

impl IntoResponse for GuardRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Loading => (
                StatusCode::SERVICE_UNAVAILABLE,
                [("Retry-After", "1")],
                LoadingTemplate,
            )
                .into_response(),
            Self::RedirectToLogin => Redirect::to("/auth/login").into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            Self::Error(e) => e.into_response(),
        }
    }
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = GuardRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let visitor = CurrentVisitor::from_request_parts(parts, state)
            .await
            .map_err(GuardRejection::Error)?;

        let auth_state = visitor.auth.controller.settled().await;
        let is_api = parts.uri.path().starts_with("/api/");

        let now = Utc::now();
        match RouteGuard::admin().decide_at(&auth_state, now) {
            GuardDecision::Protected => {
                let user = auth_state
                    .user()
                    .cloned()
                    .ok_or(GuardRejection::RedirectToLogin)?;
                Ok(Self {
                    visitor: visitor.id,
                    user,
                    auth: visitor.auth,
                })
            }
            GuardDecision::Loading if is_api => Err(GuardRejection::Unauthorized),
            GuardDecision::Loading => Err(GuardRejection::Loading),
            GuardDecision::Login if is_api => Err(GuardRejection::Unauthorized),
            GuardDecision::Login => {
                let live_session = auth_state.session().filter(|s| !s.is_expired(now));
                if let Some(user) = live_session.map(|s| &s.user) {
                    tracing::info!(user_id = %user.id, "Signed-in user without admin rights turned away");
                    visitor.auth.login.set_notice(Notice::Error(
                        user_message(&AuthError::UnauthorizedNonAdmin).to_owned(),
                    ));
                }
                Err(GuardRejection::RedirectToLogin)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, Utc};
    use masjid_core::{Email, Session, UserId};

    use super::*;

    fn session() -> Session {
        session_expiring_in(Duration::hours(1))
    }

    fn session_expiring_in(lifetime: Duration) -> Session {
        let now = Utc::now();
        Session {
            access_token: "access".into(),
            refresh_token: None,
            user: UserIdentity {
                id: UserId::new(uuid::Uuid::new_v4()),
                email: Email::parse("admin@example.com").unwrap(),
                email_confirmed_at: Some(now),
            },
            issued_at: now,
            expires_at: now + lifetime,
        }
    }

    fn anonymous() -> AuthState {
        let mut state = AuthState::default();
        state.settle_anonymous();
        state
    }

    fn unresolved() -> AuthState {
        let mut state = AuthState::default();
        state.authenticate(session());
        state
    }

    fn resolved(is_admin: bool) -> AuthState {
        let mut state = AuthState::default();
        let session = session();
        let user_id = session.user.id;
        let epoch = state.authenticate(session);
        assert!(state.apply_admin_check(epoch, user_id, is_admin, false));
        state
    }

    #[test]
    fn test_anonymous_gets_login_view() {
        assert_eq!(RouteGuard::admin().decide(&anonymous()), GuardDecision::Login);
        assert_eq!(
            RouteGuard::authenticated().decide(&anonymous()),
            GuardDecision::Login
        );
    }

    #[test]
    fn test_unresolved_role_shows_loading_for_admin_routes() {
        assert_eq!(
            RouteGuard::admin().decide(&unresolved()),
            GuardDecision::Loading
        );
        assert_eq!(
            RouteGuard::authenticated().decide(&unresolved()),
            GuardDecision::Protected
        );
    }

    #[test]
    fn test_non_admin_gets_login_view() {
        assert_eq!(
            RouteGuard::admin().decide(&resolved(false)),
            GuardDecision::Login
        );
        assert_eq!(
            RouteGuard::authenticated().decide(&resolved(false)),
            GuardDecision::Protected
        );
    }

    #[test]
    fn test_admin_gets_protected_content() {
        assert_eq!(
            RouteGuard::admin().decide(&resolved(true)),
            GuardDecision::Protected
        );
    }

    #[test]
    fn test_uninitialized_state_never_protected() {
        assert_eq!(
            RouteGuard::admin().decide(&AuthState::default()),
            GuardDecision::Login
        );
    }

    #[test]
    fn test_expired_admin_session_gets_login_view() {
        let mut state = AuthState::default();
        let session = session_expiring_in(Duration::minutes(5));
        let (user_id, expires_at) = (session.user.id, session.expires_at);
        let epoch = state.authenticate(session);
        assert!(state.apply_admin_check(epoch, user_id, true, false));

        let guard = RouteGuard::admin();
        assert_eq!(
            guard.decide_at(&state, expires_at - Duration::seconds(1)),
            GuardDecision::Protected
        );
        assert_eq!(guard.decide_at(&state, expires_at), GuardDecision::Login);
        assert_eq!(
            RouteGuard::authenticated().decide_at(&state, expires_at + Duration::hours(1)),
            GuardDecision::Login
        );
    }
}
