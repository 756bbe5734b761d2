//! Admin directory management commands.
//!
//! Admin rights on the site come only from an active row in
//! `admin_users_secure`. Registering on the site never creates one; these
//! commands do.
//!
//! # Usage
//!
//! ```bash
//! masjid-cli admin grant -u <user-id> -e admin@example.com -r super_admin
//! masjid-cli admin revoke -u <user-id>
//! masjid-cli admin list
//! ```
//!
//! # Environment Variables
//!
//! - `SUPABASE_URL` - Supabase project URL
//! - `SUPABASE_ANON_KEY` - Supabase anon key
//! - `SUPABASE_SERVICE_ROLE_KEY` - Service-role key

use masjid_core::{AdminRole, Email, UserId};
use masjid_site::supabase::AdminGrant;
use thiserror::Error;

use super::{BackendError, service_client};

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Supabase could not be reached or rejected the request.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Invalid role.
    #[error("Invalid role: {0}. Valid roles: super_admin, admin")]
    InvalidRole(String),

    /// Invalid email.
    #[error("Invalid email {0}: {1}")]
    InvalidEmail(String, masjid_core::EmailError),

    /// Invalid user id.
    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    /// No admin record for the user.
    #[error("No admin record for user: {0}")]
    NotFound(UserId),
}

impl From<masjid_site::supabase::SupabaseError> for AdminError {
    fn from(err: masjid_site::supabase::SupabaseError) -> Self {
        Self::Backend(err.into())
    }
}

fn parse_user_id(user_id: &str) -> Result<UserId, AdminError> {
    user_id
        .trim()
        .parse()
        .map_err(|_| AdminError::InvalidUserId(user_id.to_owned()))
}

/// Build the row to upsert for a grant.
fn build_grant(user_id: &str, email: &str, role: &str) -> Result<AdminGrant, AdminError> {
    let role = AdminRole::parse(role).ok_or_else(|| AdminError::InvalidRole(role.to_owned()))?;
    let email = Email::parse(email).map_err(|e| AdminError::InvalidEmail(email.to_owned(), e))?;

    Ok(AdminGrant {
        user_id: parse_user_id(user_id)?,
        email,
        role,
        is_active: true,
    })
}

/// Grant admin rights to an existing Supabase user.
///
/// Re-granting a revoked user reactivates their record.
pub async fn grant(user_id: &str, email: &str, role: &str) -> Result<(), AdminError> {
    let grant = build_grant(user_id, email, role)?;
    let rest = service_client()?;

    tracing::info!("Granting {} to {} ({})", grant.role, grant.email, grant.user_id);
    let record = rest.upsert_admin(&grant).await?;

    tracing::info!(
        "Admin record saved. ID: {}, Email: {}, Role: {}",
        record.id,
        record.email,
        record.role
    );
    Ok(())
}

/// Deactivate a user's admin record.
pub async fn revoke(user_id: &str) -> Result<(), AdminError> {
    let user_id = parse_user_id(user_id)?;
    let rest = service_client()?;

    if !rest.deactivate_admin(user_id).await? {
        return Err(AdminError::NotFound(user_id));
    }

    tracing::info!("Admin rights revoked for {}", user_id);
    Ok(())
}

/// List every admin record.
pub async fn list() -> Result<(), AdminError> {
    let rest = service_client()?;
    let admins = rest.list_admins().await?;

    if admins.is_empty() {
        tracing::info!("No admin records");
    }
    for admin in admins {
        let last_login = admin
            .last_login
            .map_or_else(|| "never".to_owned(), |t| t.to_rfc3339());
        tracing::info!(
            "{} {} role={} active={} last_login={}",
            admin.user_id,
            admin.email,
            admin.role,
            admin.is_active,
            last_login
        );
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const USER: &str = "6f1c2a9e-3b4d-4e5f-8a7b-9c0d1e2f3a4b";

    #[test]
    fn test_grant_normalizes_email() {
        let grant = build_grant(USER, " Admin@Example.com ", "super_admin").unwrap();
        assert_eq!(grant.email.as_str(), "admin@example.com");
        assert_eq!(grant.role, AdminRole::SuperAdmin);
        assert!(grant.is_active);
    }

    #[test]
    fn test_grant_rejects_unknown_role() {
        assert!(matches!(
            build_grant(USER, "admin@example.com", "viewer"),
            Err(AdminError::InvalidRole(_))
        ));
    }

    #[test]
    fn test_grant_rejects_bad_user_id() {
        assert!(matches!(
            build_grant("not-a-uuid", "admin@example.com", "admin"),
            Err(AdminError::InvalidUserId(_))
        ));
    }
}
