//! HTTP route handlers for the site.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Health check
//!
//! # API
//! GET  /api/prayer-times       - Today's prayer times (JSON)
//!
//! # Auth
//! GET  /auth/login?mode=       - Login view (login | register)
//! POST /auth/login             - Sign in, or register when mode=register
//! POST /auth/reset             - Send password reset email
//! POST /auth/logout            - Sign out
//!
//! # Admin (requires an active admin record)
//! GET  /dashboard              - Admin dashboard
//! ```

pub mod auth;
pub mod dashboard;
pub mod prayer_times;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/reset", post(auth::reset_password))
        .route("/logout", post(auth::logout))
}

/// Create the API routes router.
pub fn api_routes() -> Router<AppState> {
    Router::new().route("/prayer-times", get(prayer_times::today))
}

/// Create all routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/dashboard", get(dashboard::dashboard))
        .nest("/auth", auth_routes())
        .nest("/api", api_routes())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}
