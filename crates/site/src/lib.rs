//! Masjid site library.
//!
//! This crate provides the public site and the role-gated admin dashboard
//! as a library, allowing it to be tested and reused by the CLI.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod supabase;
pub mod views;

use axum::{Router, middleware::from_fn};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the application router with sessions, security headers and
/// request tracing.
///
/// Sentry layers are added by the binary, outside this router.
pub fn app(state: AppState) -> Router {
    let session_layer = middleware::create_session_layer(state.config());

    Router::new()
        .merge(routes::routes())
        .layer(session_layer)
        .layer(from_fn(middleware::security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
