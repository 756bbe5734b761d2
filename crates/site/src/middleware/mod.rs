//! HTTP middleware for the site.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (capture errors, one transaction per request)
//! 2. `TraceLayer` (request tracing)
//! 3. Security headers
//! 4. Session layer (tower-sessions with in-memory store)
//!
//! Guarded routes take [`RequireAdmin`] as an extractor instead of a layer,
//! so the guard runs after the session layer has loaded the cookie session.

pub mod guard;
pub mod security_headers;
pub mod session;

pub use guard::{GuardDecision, GuardRejection, RequireAdmin, RouteGuard};
pub use security_headers::security_headers_middleware;
pub use session::{CurrentVisitor, SESSION_COOKIE_NAME, create_session_layer, session_keys};
