//! Authentication route handlers.
//!
//! Admin sign-in, registration, password reset and sign-out through the
//! visitor's [`AuthController`](crate::services::AuthController). Form
//! results are carried to the next render as a one-shot notice on the
//! visitor's login view.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    http::{HeaderMap, header::USER_AGENT},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::middleware::CurrentVisitor;
use crate::services::auth::MIN_PASSWORD_LENGTH;
use crate::state::AppState;
use crate::views::login::{LoginMode, LoginOutcome, Notice};

// =============================================================================
// Form Types
// =============================================================================

/// Login/registration form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub mode: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Password reset form data.
#[derive(Debug, Deserialize)]
pub struct ResetForm {
    #[serde(default)]
    pub email: String,
}

/// Query parameters for the login page.
#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub mode: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub mode: &'static str,
    pub error: Option<String>,
    pub success: Option<String>,
    pub submitting: bool,
    pub min_password_length: usize,
}

impl LoginTemplate {
    fn new(mode: LoginMode, notice: Option<Notice>, submitting: bool) -> Self {
        let (error, success) = match notice {
            Some(Notice::Error(message)) => (Some(message), None),
            Some(Notice::Success(message)) => (None, Some(message)),
            None => (None, None),
        };
        Self {
            mode: mode.as_str(),
            error,
            success,
            submitting,
            min_password_length: MIN_PASSWORD_LENGTH,
        }
    }
}

fn login_redirect(mode: LoginMode) -> Redirect {
    Redirect::to(&format!("/auth/login?mode={}", mode.as_str()))
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login view.
pub async fn login_page(
    visitor: CurrentVisitor,
    Query(query): Query<LoginQuery>,
) -> impl IntoResponse {
    let mode = LoginMode::from_param(query.mode.as_deref());
    let login = &visitor.auth.login;
    LoginTemplate::new(mode, login.take_notice(), login.is_submitting())
}

/// Handle login and registration form submission.
///
/// Successful admin sign-in goes to the dashboard; everything else comes
/// back to the login view with a notice.
pub async fn login(
    visitor: CurrentVisitor,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    let mode = LoginMode::from_param(form.mode.as_deref());
    let auth = &visitor.auth;

    let result = auth
        .login
        .submit(
            &auth.controller,
            mode,
            &form.email,
            &form.password,
            user_agent(&headers),
        )
        .await;

    match result {
        Ok(LoginOutcome::SignedIn) => {
            if let Some(user) = auth.controller.state().user() {
                set_sentry_user(user);
            }
            Redirect::to("/dashboard").into_response()
        }
        Ok(LoginOutcome::Registered | LoginOutcome::ResetSent) => {
            login_redirect(LoginMode::Login).into_response()
        }
        Err(e) => {
            tracing::info!(
                visitor = %visitor.id,
                mode = mode.as_str(),
                kind = e.kind().as_str(),
                "Login form rejected"
            );
            login_redirect(mode).into_response()
        }
    }
}

/// Send a password reset email.
pub async fn reset_password(visitor: CurrentVisitor, Form(form): Form<ResetForm>) -> Response {
    let auth = &visitor.auth;
    if let Err(e) = auth.login.reset_password(&auth.controller, &form.email).await {
        tracing::info!(
            visitor = %visitor.id,
            kind = e.kind().as_str(),
            "Password reset rejected"
        );
    }
    login_redirect(LoginMode::Login).into_response()
}

/// Sign out and end the visitor's session.
///
/// # Errors
///
/// Returns an error if the cookie session cannot be cleared.
pub async fn logout(
    State(state): State<AppState>,
    visitor: CurrentVisitor,
) -> Result<Response, AppError> {
    if let Err(e) = visitor.auth.controller.sign_out().await {
        // Local state is already anonymous; the provider session expires on its own.
        tracing::warn!(visitor = %visitor.id, error = %e, "Provider sign-out failed");
    }
    clear_sentry_user();

    state.sessions().end(visitor.id).await;
    visitor.session.flush().await?;

    Ok(login_redirect(LoginMode::Login).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_splits_notice() {
        let template = LoginTemplate::new(
            LoginMode::Login,
            Some(Notice::Error("Unauthorized.".to_string())),
            false,
        );
        assert_eq!(template.error.as_deref(), Some("Unauthorized."));
        assert!(template.success.is_none());

        let template = LoginTemplate::new(
            LoginMode::Register,
            Some(Notice::Success("Registration complete.".to_string())),
            true,
        );
        assert_eq!(template.mode, "register");
        assert_eq!(template.success.as_deref(), Some("Registration complete."));
        assert!(template.submitting);
    }

    #[test]
    fn test_login_template_renders_mode() {
        let html = LoginTemplate::new(LoginMode::Register, None, false)
            .render()
            .unwrap_or_default();
        assert!(html.contains(r#"name="mode" value="register""#));
        assert!(!html.contains("Forgot password?"));

        let html = LoginTemplate::new(LoginMode::Login, None, true)
            .render()
            .unwrap_or_default();
        assert!(html.contains("Forgot password?"));
        assert!(html.contains(" disabled"));
    }
}
