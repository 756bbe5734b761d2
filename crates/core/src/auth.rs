//! Authentication domain types.
//!
//! These mirror what the identity provider and the admin directory hand back,
//! already validated. None of them carry behavior beyond simple queries.

use core::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AdminRecordId, AdminRole, Email, SecurityEventId, UserId};

/// Sessions are refreshed this many seconds before they expire.
pub const SESSION_REFRESH_MARGIN_SECS: i64 = 60;

/// A user known to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Stable provider identifier.
    pub id: UserId,
    /// Login email.
    pub email: Email,
    /// When the email was confirmed; `None` until the confirmation link is used.
    pub email_confirmed_at: Option<DateTime<Utc>>,
}

/// Proof of authentication issued by the identity provider.
///
/// The tokens are opaque to this crate. `Debug` never prints them.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Bearer token for provider calls made on behalf of the user.
    pub access_token: String,
    /// Token used to obtain a new session once this one expires.
    pub refresh_token: Option<String>,
    /// Subject of the session.
    pub user: UserIdentity,
    /// When the provider issued the session.
    pub issued_at: DateTime<Utc>,
    /// When the access token stops being accepted.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Whether the access token is already expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the access token expires within `margin` of `now`.
    #[must_use]
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin >= self.expires_at
    }

    /// When the session should be refreshed.
    #[must_use]
    pub fn refresh_due(&self) -> DateTime<Utc> {
        self.expires_at - Duration::seconds(SESSION_REFRESH_MARGIN_SECS)
    }

    /// Whether the session is due for a refresh at `now`.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now >= self.refresh_due()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("user", &self.user)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Directory entry granting dashboard rights to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRecord {
    /// Row identifier.
    pub id: AdminRecordId,
    /// The identity-provider user this row belongs to.
    pub user_id: UserId,
    /// Email recorded when the row was created.
    pub email: Email,
    /// Free-text role; see [`AdminRole`].
    pub role: String,
    /// Inactive rows never grant admin rights.
    pub is_active: bool,
    /// Last successful admin sign-in.
    pub last_login: Option<DateTime<Utc>>,
}

impl AdminRecord {
    /// Whether this row grants admin rights.
    #[must_use]
    pub const fn grants_admin(&self) -> bool {
        self.is_active
    }

    /// The role, if it is one this codebase knows.
    #[must_use]
    pub fn known_role(&self) -> Option<AdminRole> {
        AdminRole::parse(&self.role)
    }
}

/// Kind of notification emitted by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    /// The provider restored a session on startup.
    InitialSession,
    /// A user signed in.
    SignedIn,
    /// The user signed out or the session was revoked.
    SignedOut,
    /// The access token was renewed.
    TokenRefreshed,
}

impl fmt::Display for AuthEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InitialSession => "initial_session",
            Self::SignedIn => "signed_in",
            Self::SignedOut => "signed_out",
            Self::TokenRefreshed => "token_refreshed",
        })
    }
}

/// Security audit event types written by the site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    AdminLoginSuccess,
    AdminLoginFailed,
    AdminRegistrationSuccess,
    AdminUnauthorizedAccess,
}

impl SecurityEventKind {
    /// Stable event type stored in the audit log.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AdminLoginSuccess => "admin_login_success",
            Self::AdminLoginFailed => "admin_login_failed",
            Self::AdminRegistrationSuccess => "admin_registration_success",
            Self::AdminUnauthorizedAccess => "admin_unauthorized_access",
        }
    }
}

impl fmt::Display for SecurityEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A security event about to be written to the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityEvent {
    pub kind: SecurityEventKind,
    pub description: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl SecurityEvent {
    /// Create an event with no request metadata.
    #[must_use]
    pub fn new(kind: SecurityEventKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            user_agent: None,
            ip_address: None,
        }
    }

    /// Attach the requesting user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// A row read back from the audit log.
///
/// `event_type` stays a string: the log also holds events written by other
/// parts of the backend (contact form, rate limiter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEventRecord {
    pub id: SecurityEventId,
    pub user_id: Option<UserId>,
    pub event_type: String,
    pub event_description: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SecurityEventRecord {
    /// Whether this row was written for `kind`.
    #[must_use]
    pub fn is(&self, kind: SecurityEventKind) -> bool {
        self.event_type == kind.as_str()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn session(expires_in_secs: i64) -> Session {
        let now = Utc::now();
        Session {
            access_token: "access-secret".to_owned(),
            refresh_token: Some("refresh-secret".to_owned()),
            user: UserIdentity {
                id: UserId::new(uuid::Uuid::new_v4()),
                email: Email::parse("admin@example.com").unwrap(),
                email_confirmed_at: Some(now),
            },
            issued_at: now,
            expires_at: now + Duration::seconds(expires_in_secs),
        }
    }

    #[test]
    fn test_session_debug_redacts_tokens() {
        let debug = format!("{:?}", session(3600));
        assert!(!debug.contains("access-secret"));
        assert!(!debug.contains("refresh-secret"));
        assert!(debug.contains("admin@example.com"));
    }

    #[test]
    fn test_session_expiry() {
        let s = session(30);
        let now = Utc::now();
        assert!(!s.is_expired(now));
        assert!(s.expires_within(now, Duration::seconds(60)));
        assert!(s.is_expired(now + Duration::seconds(31)));
    }

    #[test]
    fn test_session_refresh_due_before_expiry() {
        let s = session(3600);
        let now = Utc::now();
        assert!(!s.needs_refresh(now));
        assert!(s.needs_refresh(now + Duration::seconds(3600 - SESSION_REFRESH_MARGIN_SECS)));
        assert!(!s.is_expired(now + Duration::seconds(3600 - SESSION_REFRESH_MARGIN_SECS)));
    }

    #[test]
    fn test_auth_event_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&AuthEventKind::TokenRefreshed).unwrap(),
            "\"TOKEN_REFRESHED\""
        );
        assert_eq!(AuthEventKind::SignedOut.to_string(), "signed_out");
    }

    #[test]
    fn test_inactive_record_never_grants_admin() {
        let record = AdminRecord {
            id: AdminRecordId::new(uuid::Uuid::new_v4()),
            user_id: UserId::new(uuid::Uuid::new_v4()),
            email: Email::parse("former@example.com").unwrap(),
            role: "super_admin".to_owned(),
            is_active: false,
            last_login: None,
        };
        assert!(!record.grants_admin());
        assert_eq!(record.known_role(), Some(AdminRole::SuperAdmin));
    }
}
