//! Authentication error types.

use thiserror::Error;

use masjid_core::EmailError;

use super::capability::ProviderError;

/// Errors returned by the auth session controller.
///
/// This is a closed set: every operation resolves to `Ok` or one of these.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Password shorter than the provider accepts.
    #[error("password must be at least {min} characters")]
    WeakPassword { min: usize },

    /// Wrong email/password pair.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Sign-in before following the confirmation link.
    #[error("email not confirmed")]
    EmailNotConfirmed,

    /// Sign-up for an existing account.
    #[error("email already registered")]
    AlreadyRegistered,

    /// Signed in, but not an active admin.
    #[error("unauthorized")]
    UnauthorizedNonAdmin,

    /// The provider rejected the request permanently.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Transient provider failure; the caller may retry.
    #[error("identity provider error: {0}")]
    Provider(String),

    /// The admin directory could not be queried.
    #[error("admin check failed: {0}")]
    AdminCheck(String),

    /// A login-view submission is already running for this visitor.
    #[error("another authentication request is in progress")]
    OperationInProgress,
}

/// Stable, machine-readable error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    Validation,
    InvalidCredentials,
    EmailNotConfirmed,
    AlreadyRegistered,
    UnauthorizedNonAdmin,
    ProviderError,
    AdminCheckError,
    Busy,
}

impl AuthErrorKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::InvalidCredentials => "invalid_credentials",
            Self::EmailNotConfirmed => "email_not_confirmed",
            Self::AlreadyRegistered => "already_registered",
            Self::UnauthorizedNonAdmin => "unauthorized_non_admin",
            Self::ProviderError => "provider_error",
            Self::AdminCheckError => "admin_check_error",
            Self::Busy => "busy",
        }
    }
}

impl AuthError {
    /// The kind of this error.
    #[must_use]
    pub const fn kind(&self) -> AuthErrorKind {
        match self {
            Self::InvalidEmail(_) | Self::WeakPassword { .. } | Self::Rejected(_) => {
                AuthErrorKind::Validation
            }
            Self::InvalidCredentials => AuthErrorKind::InvalidCredentials,
            Self::EmailNotConfirmed => AuthErrorKind::EmailNotConfirmed,
            Self::AlreadyRegistered => AuthErrorKind::AlreadyRegistered,
            Self::UnauthorizedNonAdmin => AuthErrorKind::UnauthorizedNonAdmin,
            Self::Provider(_) => AuthErrorKind::ProviderError,
            Self::AdminCheck(_) => AuthErrorKind::AdminCheckError,
            Self::OperationInProgress => AuthErrorKind::Busy,
        }
    }

    /// Whether retrying the same request can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(_) | Self::OperationInProgress)
    }
}

impl From<ProviderError> for AuthError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidCredentials => Self::InvalidCredentials,
            ProviderError::EmailNotConfirmed => Self::EmailNotConfirmed,
            ProviderError::AlreadyRegistered => Self::AlreadyRegistered,
            ProviderError::Validation(msg) => Self::Rejected(msg),
            ProviderError::Transient(msg) => Self::Provider(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_errors_map_to_closed_kinds() {
        let cases = [
            (ProviderError::InvalidCredentials, "invalid_credentials"),
            (ProviderError::EmailNotConfirmed, "email_not_confirmed"),
            (ProviderError::AlreadyRegistered, "already_registered"),
            (ProviderError::Validation("weak".into()), "validation_error"),
            (ProviderError::Transient("502".into()), "provider_error"),
        ];
        for (provider, kind) in cases {
            assert_eq!(AuthError::from(provider).kind().as_str(), kind);
        }
    }

    #[test]
    fn test_only_transient_failures_are_retryable() {
        assert!(AuthError::Provider("timeout".into()).is_retryable());
        assert!(!AuthError::InvalidCredentials.is_retryable());
        assert!(!AuthError::AdminCheck("timeout".into()).is_retryable());
    }
}
