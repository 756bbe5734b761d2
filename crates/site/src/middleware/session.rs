//! Session middleware configuration and the visitor extractor.
//!
//! Sets up in-memory cookie sessions using tower-sessions. The cookie
//! session only carries the visitor id; the visitor's auth state lives in
//! [`AuthSessions`](crate::services::AuthSessions).

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer};

use crate::config::SiteConfig;
use crate::error::AppError;
use crate::services::auth::{VisitorAuth, VisitorId};
use crate::state::AppState;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "masjid_session";

/// Keys stored in the cookie session.
pub mod session_keys {
    /// The visitor's [`VisitorId`](crate::services::auth::VisitorId).
    pub const VISITOR_ID: &str = "visitor_id";
}

/// Create the session layer with an in-memory store.
///
/// Cookie inactivity expiry matches the visitor idle timeout, so a visitor's
/// cookie and auth controller expire together.
#[must_use]
pub fn create_session_layer(config: &SiteConfig) -> SessionManagerLayer<MemoryStore> {
    let idle_seconds = i64::try_from(config.auth.session_idle.as_secs()).unwrap_or(i64::MAX);

    SessionManagerLayer::new(MemoryStore::default())
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(idle_seconds),
        ))
        .with_secure(config.is_secure())
        .with_same_site(tower_sessions::cookie::SameSite::Strict)
        .with_http_only(true)
        .with_path("/")
}

/// The visitor behind the request, with their auth controller started.
///
/// Assigns a fresh visitor id on the first request of a browser session.
pub struct CurrentVisitor {
    pub id: VisitorId,
    pub session: Session,
    pub auth: Arc<VisitorAuth>,
}

impl FromRequestParts<AppState> for CurrentVisitor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal("session layer missing".to_string()))?;

        let id = match session.get::<VisitorId>(session_keys::VISITOR_ID).await? {
            Some(id) => id,
            None => {
                let id = VisitorId::generate();
                session.insert(session_keys::VISITOR_ID, id).await?;
                tracing::debug!(visitor = %id, "New visitor");
                id
            }
        };

        let auth = state.sessions().get_or_start(id).await;
        Ok(Self { id, session, auth })
    }
}
