//! Supabase API errors.

use serde::Deserialize;
use thiserror::Error;

use crate::services::auth::ProviderError;

/// Errors that can occur when talking to Supabase.
#[derive(Debug, Error)]
pub enum SupabaseError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint URL could not be built.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Rate limited.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The API key or bearer token was rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// Failed to parse a response.
    #[error("parse error: {0}")]
    Parse(String),

    /// Client configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Error body shapes returned by GoTrue and PostgREST.
///
/// GoTrue answers with `error_code`/`msg` (newer) or `error`/
/// `error_description` (older); PostgREST with `code`/`message`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    error_code: Option<String>,
    code: Option<serde_json::Value>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl ErrorBody {
    /// Build an [`SupabaseError::Api`] from a raw response body.
    pub(crate) fn into_error(status: u16, body: &str) -> SupabaseError {
        let parsed: Self = serde_json::from_str(body).unwrap_or_default();

        let code = parsed.error_code.or_else(|| match parsed.code {
            Some(serde_json::Value::String(code)) => Some(code),
            _ => None,
        });
        let code = code.or(parsed.error);

        let message = parsed
            .msg
            .or(parsed.message)
            .or(parsed.error_description)
            .unwrap_or_else(|| body.chars().take(200).collect());

        SupabaseError::Api {
            status,
            code,
            message,
        }
    }
}

impl SupabaseError {
    fn has_code(code: Option<&str>, candidates: &[&str]) -> bool {
        code.is_some_and(|c| candidates.contains(&c))
    }
}

impl From<SupabaseError> for ProviderError {
    fn from(err: SupabaseError) -> Self {
        match err {
            SupabaseError::Api {
                status,
                code,
                message,
            } => {
                let code = code.as_deref();
                let lower = message.to_lowercase();

                if SupabaseError::has_code(code, &["invalid_credentials"])
                    || lower.contains("invalid login credentials")
                {
                    Self::InvalidCredentials
                } else if SupabaseError::has_code(code, &["email_not_confirmed"])
                    || lower.contains("email not confirmed")
                {
                    Self::EmailNotConfirmed
                } else if SupabaseError::has_code(code, &["user_already_exists", "email_exists"])
                    || lower.contains("already registered")
                {
                    Self::AlreadyRegistered
                } else if status == 429 || status >= 500 {
                    Self::Transient(format!("{status}: {message}"))
                } else {
                    Self::Validation(message)
                }
            }
            SupabaseError::RateLimited(secs) => {
                Self::Transient(format!("rate limited, retry after {secs}s"))
            }
            SupabaseError::Http(e) => Self::Transient(e.to_string()),
            SupabaseError::Parse(msg) => Self::Transient(msg),
            SupabaseError::Unauthorized => Self::Validation("request not authorized".to_owned()),
            SupabaseError::Url(e) => Self::Validation(e.to_string()),
            SupabaseError::InvalidConfig(msg) => Self::Validation(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(status: u16, body: &str) -> ProviderError {
        ErrorBody::into_error(status, body).into()
    }

    #[test]
    fn test_gotrue_invalid_credentials() {
        let body = r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#;
        assert_eq!(classify(400, body), ProviderError::InvalidCredentials);

        let legacy = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        assert_eq!(classify(400, legacy), ProviderError::InvalidCredentials);
    }

    #[test]
    fn test_gotrue_email_not_confirmed() {
        let body = r#"{"code":400,"error_code":"email_not_confirmed","msg":"Email not confirmed"}"#;
        assert_eq!(classify(400, body), ProviderError::EmailNotConfirmed);
    }

    #[test]
    fn test_gotrue_already_registered() {
        let body = r#"{"code":422,"error_code":"user_already_exists","msg":"User already registered"}"#;
        assert_eq!(classify(422, body), ProviderError::AlreadyRegistered);
    }

    #[test]
    fn test_weak_password_is_permanent() {
        let body = r#"{"code":422,"error_code":"weak_password","msg":"Password should be at least 6 characters."}"#;
        assert_eq!(
            classify(422, body),
            ProviderError::Validation("Password should be at least 6 characters.".into())
        );
    }

    #[test]
    fn test_server_errors_are_transient() {
        assert!(classify(503, "upstream unavailable").is_transient());
        assert!(classify(429, r#"{"msg":"slow down"}"#).is_transient());
    }

    #[test]
    fn test_postgrest_error_body() {
        let body = r#"{"code":"PGRST116","message":"JSON object requested, multiple rows returned","details":null,"hint":null}"#;
        match ErrorBody::into_error(406, body) {
            SupabaseError::Api { code, message, .. } => {
                assert_eq!(code.as_deref(), Some("PGRST116"));
                assert!(message.starts_with("JSON object requested"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
