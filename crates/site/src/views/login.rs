//! Login view behavior.
//!
//! Two modes, one form. Submitting runs the matching controller operation,
//! records the attempt in the security log and turns failures into
//! messages that never reveal which emails exist or are admins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use masjid_core::{EmailError, SecurityEvent, SecurityEventKind};

use crate::services::auth::{AuthController, AuthError, SecurityLog};

/// Which form the login view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoginMode {
    #[default]
    Login,
    Register,
}

impl LoginMode {
    /// Parse the `mode` query/form value; anything unknown is `Login`.
    #[must_use]
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some("register") => Self::Register,
            _ => Self::Login,
        }
    }

    /// Value used in links and hidden form fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
        }
    }
}

/// What a successful submission achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Signed in as an admin.
    SignedIn,
    /// Account created; confirmation email sent.
    Registered,
    /// Password-reset email sent.
    ResetSent,
}

impl LoginOutcome {
    /// Message shown after the redirect.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::SignedIn => "Signed in successfully.",
            Self::Registered => {
                "Registration complete. Check your email to confirm the account."
            }
            Self::ResetSent => "Password reset email sent. Check your inbox.",
        }
    }
}

/// One-shot message carried from a form POST to the next render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
}

/// Per-visitor login view state.
pub struct LoginView {
    security_log: Arc<dyn SecurityLog>,
    in_flight: AtomicBool,
    notice: Mutex<Option<Notice>>,
}

/// Held while a submission runs. Dropping it re-enables the form.
#[derive(Debug)]
pub struct SubmitGuard<'a> {
    in_flight: &'a AtomicBool,
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

impl LoginView {
    #[must_use]
    pub fn new(security_log: Arc<dyn SecurityLog>) -> Self {
        Self {
            security_log,
            in_flight: AtomicBool::new(false),
            notice: Mutex::new(None),
        }
    }

    /// Whether the form is disabled because a submission is running.
    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Claim the form for one submission.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::OperationInProgress`] while another submission
    /// holds the form.
    pub fn begin_submit(&self) -> Result<SubmitGuard<'_>, AuthError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| SubmitGuard {
                in_flight: &self.in_flight,
            })
            .map_err(|_| AuthError::OperationInProgress)
    }

    /// Submit the form in `mode`.
    ///
    /// A sign-in only counts as successful once the controller has settled
    /// the new user as an admin.
    ///
    /// # Errors
    ///
    /// Returns the controller's error, [`AuthError::UnauthorizedNonAdmin`]
    /// or [`AuthError::AdminCheck`] for a signed-in user without admin
    /// rights, or [`AuthError::OperationInProgress`] for a double submit.
    pub async fn submit(
        &self,
        controller: &AuthController,
        mode: LoginMode,
        email: &str,
        password: &str,
        user_agent: Option<String>,
    ) -> Result<LoginOutcome, AuthError> {
        let _guard = self.begin_submit()?;

        let result = match mode {
            LoginMode::Login => self.sign_in(controller, email, password, user_agent).await,
            LoginMode::Register => self.register(controller, email, password, user_agent).await,
        };
        self.remember(&result);
        result
    }

    /// Send a password-reset email.
    ///
    /// # Errors
    ///
    /// Returns an error for a missing or malformed email, a provider
    /// failure, or a double submit.
    pub async fn reset_password(
        &self,
        controller: &AuthController,
        email: &str,
    ) -> Result<LoginOutcome, AuthError> {
        let _guard = self.begin_submit()?;

        let result = controller
            .reset_password(email)
            .await
            .map(|()| LoginOutcome::ResetSent);
        self.remember(&result);
        result
    }

    /// Take the pending notice, if any.
    pub fn take_notice(&self) -> Option<Notice> {
        self.notice
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Replace the pending notice.
    pub fn set_notice(&self, notice: Notice) {
        *self.notice.lock().unwrap_or_else(PoisonError::into_inner) = Some(notice);
    }

    async fn sign_in(
        &self,
        controller: &AuthController,
        email: &str,
        password: &str,
        user_agent: Option<String>,
    ) -> Result<LoginOutcome, AuthError> {
        if let Err(e) = controller.sign_in(email, password).await {
            self.log(
                SecurityEventKind::AdminLoginFailed,
                format!("Failed login attempt for email: {}", email.trim()),
                user_agent,
            )
            .await;
            return Err(e);
        }

        self.log(
            SecurityEventKind::AdminLoginSuccess,
            format!("Admin user logged in: {}", email.trim()),
            user_agent,
        )
        .await;

        let state = controller.settled().await;
        match state.is_admin() {
            Some(true) => Ok(LoginOutcome::SignedIn),
            _ if state.admin_check_failed() => {
                Err(AuthError::AdminCheck("admin status could not be verified".to_owned()))
            }
            _ => Err(AuthError::UnauthorizedNonAdmin),
        }
    }

    async fn register(
        &self,
        controller: &AuthController,
        email: &str,
        password: &str,
        user_agent: Option<String>,
    ) -> Result<LoginOutcome, AuthError> {
        controller.sign_up(email, password).await?;
        self.log(
            SecurityEventKind::AdminRegistrationSuccess,
            format!("Admin user registered successfully: {}", email.trim()),
            user_agent,
        )
        .await;
        Ok(LoginOutcome::Registered)
    }

    async fn log(&self, kind: SecurityEventKind, description: String, user_agent: Option<String>) {
        let event = SecurityEvent::new(kind, description).with_user_agent(user_agent);
        if let Err(e) = self.security_log.record(event).await {
            warn!(event = %kind, error = %e, "Failed to log security event");
        }
    }

    fn remember(&self, result: &Result<LoginOutcome, AuthError>) {
        let notice = match result {
            Ok(outcome) => Notice::Success(outcome.message().to_owned()),
            Err(e) => {
                debug!(kind = e.kind().as_str(), "Login view submission failed");
                Notice::Error(user_message(e).to_owned())
            }
        };
        self.set_notice(notice);
    }
}

impl std::fmt::Debug for LoginView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginView")
            .field("in_flight", &self.is_submitting())
            .finish_non_exhaustive()
    }
}

/// Message shown for `err`.
///
/// Bad credentials get their own message; a non-admin gets only
/// "Unauthorized." Provider details never reach the page.
#[must_use]
pub const fn user_message(err: &AuthError) -> &'static str {
    match err {
        AuthError::InvalidEmail(EmailError::Empty) => "Enter your email address.",
        AuthError::InvalidEmail(_) => "Enter a valid email address.",
        AuthError::WeakPassword { .. } => "The password must be at least 6 characters long.",
        AuthError::InvalidCredentials => {
            "Incorrect email or password. Check your credentials or use \"Forgot password?\"."
        }
        AuthError::EmailNotConfirmed => {
            "Confirm your email address using the link we sent you, then sign in."
        }
        AuthError::AlreadyRegistered => "This email is already registered. Try signing in instead.",
        AuthError::UnauthorizedNonAdmin | AuthError::AdminCheck(_) => "Unauthorized.",
        AuthError::Rejected(_) => "The request was rejected. Check the form and try again.",
        AuthError::Provider(_) => "The sign-in service is unavailable. Please try again shortly.",
        AuthError::OperationInProgress => "A request is already in progress.",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use masjid_core::SecurityEventRecord;

    use super::*;
    use crate::services::auth::ProviderError;

    struct NullLog;

    #[async_trait]
    impl SecurityLog for NullLog {
        async fn record(&self, _event: SecurityEvent) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn recent(&self, _limit: usize) -> Result<Vec<SecurityEventRecord>, ProviderError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_form_disabled_while_submission_runs() {
        let view = LoginView::new(Arc::new(NullLog));
        let guard = view.begin_submit().unwrap();
        assert!(view.is_submitting());
        assert_eq!(
            view.begin_submit().unwrap_err(),
            AuthError::OperationInProgress
        );

        drop(guard);
        assert!(!view.is_submitting());
        assert!(view.begin_submit().is_ok());
    }

    #[test]
    fn test_notice_is_taken_once() {
        let view = LoginView::new(Arc::new(NullLog));
        view.set_notice(Notice::Error("Unauthorized.".into()));
        assert_eq!(view.take_notice(), Some(Notice::Error("Unauthorized.".into())));
        assert_eq!(view.take_notice(), None);
    }

    #[test]
    fn test_mode_defaults_to_login() {
        assert_eq!(LoginMode::from_param(None), LoginMode::Login);
        assert_eq!(LoginMode::from_param(Some("register")), LoginMode::Register);
        assert_eq!(LoginMode::from_param(Some("admin")), LoginMode::Login);
    }

    #[test]
    fn test_unauthorized_message_does_not_distinguish_causes() {
        assert_eq!(
            user_message(&AuthError::UnauthorizedNonAdmin),
            user_message(&AuthError::AdminCheck("timeout".into()))
        );
        assert_ne!(
            user_message(&AuthError::InvalidCredentials),
            user_message(&AuthError::AlreadyRegistered)
        );
    }

    #[test]
    fn test_provider_details_never_shown() {
        let msg = user_message(&AuthError::Provider("upstream 502 from 10.0.0.7".into()));
        assert!(!msg.contains("10.0.0.7"));
    }
}
