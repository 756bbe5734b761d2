//! Supabase API clients.
//!
//! The hosted backend provides the identity provider (GoTrue), the admin
//! directory, the security audit log and prayer times (PostgREST), plus
//! edge functions.
//!
//! # API Reference
//!
//! - Auth: `{SUPABASE_URL}/auth/v1/*`
//! - Tables and RPC: `{SUPABASE_URL}/rest/v1/*`
//! - Edge functions: `{SUPABASE_URL}/functions/v1/*`
//! - Authentication: project key in the `apikey` header, bearer token in
//!   `Authorization` (the project key itself or a user access token)

mod auth;
mod error;
mod rest;

pub use auth::SupabaseAuth;
pub use error::SupabaseError;
pub use rest::{AdminGrant, SupabaseRest};

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use url::Url;

use error::ErrorBody;

/// Low-level Supabase HTTP client shared by the auth and REST clients.
#[derive(Clone)]
pub struct SupabaseClient {
    inner: Arc<SupabaseClientInner>,
}

struct SupabaseClientInner {
    http: reqwest::Client,
    base_url: Url,
    api_key: SecretString,
}

impl SupabaseClient {
    /// Create a client for the project at `base_url` using `api_key`.
    ///
    /// # Errors
    ///
    /// Returns error if the key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(base_url: &Url, api_key: SecretString) -> Result<Self, SupabaseError> {
        let mut headers = HeaderMap::new();

        let mut key = HeaderValue::from_str(api_key.expose_secret())
            .map_err(|e| SupabaseError::InvalidConfig(format!("invalid API key format: {e}")))?;
        key.set_sensitive(true);
        headers.insert("apikey", key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(15))
            .build()?;

        // Url::join drops the last path segment unless the base ends in '/'
        let mut base_url = base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            inner: Arc::new(SupabaseClientInner {
                http,
                base_url,
                api_key,
            }),
        })
    }

    /// Project base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Absolute URL for `path` relative to the project.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, SupabaseError> {
        Ok(self.inner.base_url.join(path)?)
    }

    /// Request authorized with the project key.
    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.inner
            .http
            .request(method, url)
            .bearer_auth(self.inner.api_key.expose_secret())
    }

    /// Request authorized with a user's access token.
    pub(crate) fn request_as(&self, method: Method, url: Url, access_token: &str) -> RequestBuilder {
        self.inner.http.request(method, url).bearer_auth(access_token)
    }

    /// Send a request and parse the JSON body.
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, SupabaseError> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| SupabaseError::Parse(format!("failed to parse response: {e}")));
        }

        Err(Self::parse_error(response).await)
    }

    /// Send a request and ignore the body.
    pub(crate) async fn send_empty(&self, request: RequestBuilder) -> Result<(), SupabaseError> {
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(Self::parse_error(response).await)
    }

    async fn parse_error(response: reqwest::Response) -> SupabaseError {
        let status = response.status().as_u16();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return SupabaseError::RateLimited(retry_after);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        tracing::debug!(
            status,
            body = %body.chars().take(500).collect::<String>(),
            "Supabase returned an error"
        );

        // GoTrue answers bad credentials with 400 and a code; a bare 401/403
        // without a recognizable body means the key or token was rejected.
        let error = ErrorBody::into_error(status, &body);
        match &error {
            SupabaseError::Api { code: None, .. } if status == 401 || status == 403 => {
                SupabaseError::Unauthorized
            }
            _ => error,
        }
    }
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_keeps_project_path() {
        let base = Url::parse("https://project.supabase.co").unwrap();
        let client = SupabaseClient::new(&base, SecretString::from("anon-key".to_string())).unwrap();
        assert_eq!(
            client.endpoint("auth/v1/token").unwrap().as_str(),
            "https://project.supabase.co/auth/v1/token"
        );

        let proxied = Url::parse("https://example.com/supabase").unwrap();
        let client = SupabaseClient::new(&proxied, SecretString::from("anon-key".to_string())).unwrap();
        assert_eq!(
            client.endpoint("rest/v1/prayer_times").unwrap().as_str(),
            "https://example.com/supabase/rest/v1/prayer_times"
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let base = Url::parse("https://project.supabase.co").unwrap();
        let client = SupabaseClient::new(&base, SecretString::from("super-secret-key".to_string())).unwrap();
        assert!(!format!("{client:?}").contains("super-secret-key"));
    }
}
