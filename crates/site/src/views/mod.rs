//! View state and shared templates.
//!
//! Page templates live next to their route handlers; this module holds
//! the login view's behavior and templates used by more than one route.

pub mod login;

use askama::Template;
use askama_web::WebTemplate;

/// Shown while the visitor's admin status is still being checked.
///
/// Reloads itself until the guard can decide.
#[derive(Template, WebTemplate)]
#[template(path = "loading.html")]
pub struct LoadingTemplate;
