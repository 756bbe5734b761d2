//! GoTrue identity provider.
//!
//! One instance per visitor: it holds that visitor's session and emits
//! auth change notifications the way the browser SDK does.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use masjid_core::{AuthEventKind, Email, Session, UserId, UserIdentity};

use super::{SupabaseClient, SupabaseError};
use crate::services::auth::{AuthEventHub, AuthSubscription, IdentityProvider, ProviderError};

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
struct PasswordCredentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct RecoverRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: UserId,
    email: Option<String>,
    email_confirmed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: UserResponse,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    // Projects with email confirmation disabled sign the user in right away.
    Session(TokenResponse),
    User(UserResponse),
}

impl UserResponse {
    fn into_identity(self) -> Result<UserIdentity, SupabaseError> {
        let raw = self
            .email
            .ok_or_else(|| SupabaseError::Parse("user has no email".to_owned()))?;
        let email =
            Email::parse(&raw).map_err(|e| SupabaseError::Parse(format!("user email: {e}")))?;
        Ok(UserIdentity {
            id: self.id,
            email,
            email_confirmed_at: self.email_confirmed_at,
        })
    }
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Result<Session, SupabaseError> {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(|| now + Duration::seconds(self.expires_in.unwrap_or(3600)));

        Ok(Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            user: self.user.into_identity()?,
            issued_at: now,
            expires_at,
        })
    }
}

// =============================================================================
// SupabaseAuth
// =============================================================================

/// GoTrue-backed [`IdentityProvider`].
pub struct SupabaseAuth {
    client: SupabaseClient,
    session: Mutex<Option<Session>>,
    hub: AuthEventHub,
}

impl SupabaseAuth {
    /// Create a provider with no session.
    #[must_use]
    pub fn new(client: SupabaseClient) -> Self {
        Self {
            client,
            session: Mutex::new(None),
            hub: AuthEventHub::new(),
        }
    }

    fn cached(&self) -> Option<Session> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, session: Option<Session>) -> Option<Session> {
        std::mem::replace(
            &mut *self.session.lock().unwrap_or_else(PoisonError::into_inner),
            session,
        )
    }

    async fn token_request<B: Serialize + Sync>(
        &self,
        grant_type: &str,
        body: &B,
    ) -> Result<Session, SupabaseError> {
        let mut url = self.client.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);

        let response: TokenResponse = self
            .client
            .send_json(self.client.request(Method::POST, url).json(body))
            .await?;
        response.into_session(Utc::now())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Option<Session>, ProviderError> {
        match self
            .token_request("refresh_token", &RefreshRequest { refresh_token })
            .await
        {
            Ok(session) => {
                debug!(user_id = %session.user.id, "Session refreshed");
                self.store(Some(session.clone()));
                self.hub.emit(AuthEventKind::TokenRefreshed, Some(session.clone()));
                Ok(Some(session))
            }
            Err(e) => {
                let err = ProviderError::from(e);
                if err.is_transient() {
                    return Err(err);
                }
                warn!(error = %err, "Refresh token rejected, dropping session");
                self.store(None);
                self.hub.emit(AuthEventKind::SignedOut, None);
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
    #[instrument(skip(self))]
    async fn current_session(&self) -> Result<Option<Session>, ProviderError> {
        let Some(session) = self.cached() else {
            return Ok(None);
        };

        let now = Utc::now();
        if !session.needs_refresh(now) {
            return Ok(Some(session));
        }

        match session.refresh_token.as_deref() {
            Some(refresh_token) => self.refresh(refresh_token).await,
            None if session.is_expired(now) => {
                self.store(None);
                self.hub.emit(AuthEventKind::SignedOut, None);
                Ok(None)
            }
            None => Ok(Some(session)),
        }
    }

    #[instrument(skip(self, email, password))]
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<Session, ProviderError> {
        let session = self
            .token_request(
                "password",
                &PasswordCredentials {
                    email: email.as_str(),
                    password,
                },
            )
            .await?;

        debug!(user_id = %session.user.id, "Password sign-in succeeded");
        self.store(Some(session.clone()));
        self.hub.emit(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    #[instrument(skip(self, email, password))]
    async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        redirect_to: &str,
    ) -> Result<UserIdentity, ProviderError> {
        let mut url = self.client.endpoint("auth/v1/signup").map_err(ProviderError::from)?;
        url.query_pairs_mut().append_pair("redirect_to", redirect_to);

        let request = self.client.request(Method::POST, url).json(&PasswordCredentials {
            email: email.as_str(),
            password,
        });
        let response: SignUpResponse = self.client.send_json(request).await?;

        match response {
            SignUpResponse::Session(tokens) => {
                let session = tokens.into_session(Utc::now())?;
                let user = session.user.clone();
                self.store(Some(session.clone()));
                self.hub.emit(AuthEventKind::SignedIn, Some(session));
                Ok(user)
            }
            SignUpResponse::User(user) => Ok(user.into_identity()?),
        }
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), ProviderError> {
        let Some(session) = self.store(None) else {
            return Ok(());
        };
        self.hub.emit(AuthEventKind::SignedOut, None);

        let url = self.client.endpoint("auth/v1/logout").map_err(ProviderError::from)?;
        let request = self
            .client
            .request_as(Method::POST, url, &session.access_token);

        match self.client.send_empty(request).await {
            Ok(()) => Ok(()),
            // Session already gone on the server side.
            Err(SupabaseError::Unauthorized) => Ok(()),
            Err(SupabaseError::Api { status: 401 | 403 | 404, .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, email))]
    async fn send_password_reset(
        &self,
        email: &Email,
        redirect_to: &str,
    ) -> Result<(), ProviderError> {
        let mut url = self.client.endpoint("auth/v1/recover").map_err(ProviderError::from)?;
        url.query_pairs_mut().append_pair("redirect_to", redirect_to);

        let request = self.client.request(Method::POST, url).json(&RecoverRequest {
            email: email.as_str(),
        });
        self.client.send_empty(request).await.map_err(Into::into)
    }

    fn subscribe(&self) -> AuthSubscription {
        let subscription = self.hub.subscribe();
        self.hub.emit(AuthEventKind::InitialSession, self.cached());
        subscription
    }
}

impl std::fmt::Debug for SupabaseAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseAuth")
            .field("client", &self.client)
            .field("signed_in", &self.cached().is_some())
            .finish_non_exhaustive()
    }
}
