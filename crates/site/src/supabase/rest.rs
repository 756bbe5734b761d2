//! PostgREST tables, RPC and edge functions.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use masjid_core::{
    AdminRecord, AdminRecordId, AdminRole, BookRequest, ContactMessage, Email,
    LessonRegistration, PrayerTimes, SecurityEvent, SecurityEventRecord, UserId,
};

use super::{SupabaseClient, SupabaseError};
use crate::services::auth::{AdminDirectory, ProviderError, SecurityLog};
use crate::services::prayer_times::PrayerTimesSource;
use crate::services::submissions::SubmissionsSource;

const ADMIN_COLUMNS: &str = "id,user_id,email,role,is_active,last_login";

#[derive(Debug, Deserialize)]
struct AdminRow {
    id: AdminRecordId,
    user_id: UserId,
    email: String,
    role: String,
    is_active: bool,
    last_login: Option<DateTime<Utc>>,
}

impl TryFrom<AdminRow> for AdminRecord {
    type Error = SupabaseError;

    fn try_from(row: AdminRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email)
            .map_err(|e| SupabaseError::Parse(format!("admin email for {}: {e}", row.user_id)))?;
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            email,
            role: row.role,
            is_active: row.is_active,
            last_login: row.last_login,
        })
    }
}

#[derive(Serialize)]
struct LastLoginPatch {
    last_login: DateTime<Utc>,
}

#[derive(Serialize)]
struct ActivePatch {
    is_active: bool,
}

#[derive(Serialize)]
struct LogSecurityEventArgs<'a> {
    p_event_type: &'a str,
    p_event_description: &'a str,
    p_ip_address: Option<&'a str>,
    p_user_agent: Option<&'a str>,
}

/// A row to upsert into `admin_users_secure`.
#[derive(Debug, Clone, Serialize)]
pub struct AdminGrant {
    pub user_id: UserId,
    pub email: Email,
    pub role: AdminRole,
    pub is_active: bool,
}

/// PostgREST client for the site's tables.
///
/// Uses whatever key its [`SupabaseClient`] was built with: the service-role
/// key bypasses row-level security, the anon key only sees what the
/// policies expose.
#[derive(Debug, Clone)]
pub struct SupabaseRest {
    client: SupabaseClient,
}

impl SupabaseRest {
    #[must_use]
    pub const fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    fn table(&self, table: &str) -> Result<url::Url, SupabaseError> {
        self.client.endpoint(&format!("rest/v1/{table}"))
    }

    async fn select<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, &str)],
    ) -> Result<Vec<T>, SupabaseError> {
        let mut url = self.table(table)?;
        url.query_pairs_mut().extend_pairs(filters);
        self.client
            .send_json(self.client.request(Method::GET, url))
            .await
    }

    async fn newest<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        limit: usize,
    ) -> Result<Vec<T>, SupabaseError> {
        let limit = limit.to_string();
        self.select(
            table,
            &[
                ("select", "*"),
                ("order", "created_at.desc"),
                ("limit", limit.as_str()),
            ],
        )
        .await
    }

    // =========================================================================
    // Admin management
    // =========================================================================

    /// Insert or update the admin row for `grant.user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the row cannot be parsed.
    #[instrument(skip(self, grant), fields(user_id = %grant.user_id))]
    pub async fn upsert_admin(&self, grant: &AdminGrant) -> Result<AdminRecord, SupabaseError> {
        let mut url = self.table("admin_users_secure")?;
        url.query_pairs_mut()
            .append_pair("on_conflict", "user_id")
            .append_pair("select", ADMIN_COLUMNS);

        let request = self
            .client
            .request(Method::POST, url)
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&[grant]);
        let rows: Vec<AdminRow> = self.client.send_json(request).await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| SupabaseError::Parse("upsert returned no row".to_owned()))?
            .try_into()
    }

    /// Mark the admin row for `user_id` inactive. Returns whether a row matched.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn deactivate_admin(&self, user_id: UserId) -> Result<bool, SupabaseError> {
        let mut url = self.table("admin_users_secure")?;
        url.query_pairs_mut()
            .append_pair("user_id", &format!("eq.{user_id}"))
            .append_pair("select", "id");

        let request = self
            .client
            .request(Method::PATCH, url)
            .header("Prefer", "return=representation")
            .json(&ActivePatch { is_active: false });
        let rows: Vec<serde_json::Value> = self.client.send_json(request).await?;
        Ok(!rows.is_empty())
    }

    /// Every admin row, active or not, ordered by email.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or a row cannot be parsed.
    pub async fn list_admins(&self) -> Result<Vec<AdminRecord>, SupabaseError> {
        let rows: Vec<AdminRow> = self
            .select(
                "admin_users_secure",
                &[("select", ADMIN_COLUMNS), ("order", "email.asc")],
            )
            .await?;
        rows.into_iter().map(AdminRecord::try_from).collect()
    }

    /// Run the edge function that copies today's calendar entry into
    /// `current_prayer_times`.
    ///
    /// # Errors
    ///
    /// Returns an error if the function call fails.
    #[instrument(skip(self))]
    pub async fn refresh_prayer_times(&self) -> Result<(), SupabaseError> {
        let url = self.client.endpoint("functions/v1/update-daily-prayer-times")?;
        let request = self
            .client
            .request(Method::POST, url)
            .json(&serde_json::json!({}));
        self.client.send_empty(request).await
    }
}

// =============================================================================
// Capabilities
// =============================================================================

#[async_trait]
impl AdminDirectory for SupabaseRest {
    #[instrument(skip(self))]
    async fn find_active_admin_record(
        &self,
        user_id: UserId,
    ) -> Result<Option<AdminRecord>, ProviderError> {
        let user_filter = format!("eq.{user_id}");
        let rows: Vec<AdminRow> = self
            .select(
                "admin_users_secure",
                &[
                    ("select", ADMIN_COLUMNS),
                    ("user_id", user_filter.as_str()),
                    ("is_active", "eq.true"),
                    ("limit", "1"),
                ],
            )
            .await?;

        Ok(rows
            .into_iter()
            .next()
            .map(AdminRecord::try_from)
            .transpose()?)
    }

    #[instrument(skip(self))]
    async fn touch_last_login(&self, user_id: UserId) -> Result<(), ProviderError> {
        let mut url = self.table("admin_users_secure")?;
        url.query_pairs_mut()
            .append_pair("user_id", &format!("eq.{user_id}"));

        let request = self
            .client
            .request(Method::PATCH, url)
            .header("Prefer", "return=minimal")
            .json(&LastLoginPatch {
                last_login: Utc::now(),
            });
        Ok(self.client.send_empty(request).await?)
    }
}

#[async_trait]
impl SecurityLog for SupabaseRest {
    #[instrument(skip(self, event), fields(event = %event.kind))]
    async fn record(&self, event: SecurityEvent) -> Result<(), ProviderError> {
        let url = self.client.endpoint("rest/v1/rpc/log_security_event")?;
        let request = self
            .client
            .request(Method::POST, url)
            .json(&LogSecurityEventArgs {
                p_event_type: event.kind.as_str(),
                p_event_description: &event.description,
                p_ip_address: event.ip_address.as_deref(),
                p_user_agent: event.user_agent.as_deref(),
            });
        Ok(self.client.send_empty(request).await?)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<SecurityEventRecord>, ProviderError> {
        Ok(self.newest("security_audit_log", limit).await?)
    }
}

#[async_trait]
impl SubmissionsSource for SupabaseRest {
    async fn contacts(&self, limit: usize) -> Result<Vec<ContactMessage>, ProviderError> {
        Ok(self.newest("contacts", limit).await?)
    }

    async fn book_requests(&self, limit: usize) -> Result<Vec<BookRequest>, ProviderError> {
        Ok(self.newest("book_requests", limit).await?)
    }

    async fn lesson_registrations(
        &self,
        limit: usize,
    ) -> Result<Vec<LessonRegistration>, ProviderError> {
        Ok(self.newest("lesson_registrations", limit).await?)
    }
}

#[async_trait]
impl PrayerTimesSource for SupabaseRest {
    async fn current(&self) -> Result<Option<PrayerTimes>, ProviderError> {
        let rows: Vec<PrayerTimes> = self
            .select("current_prayer_times", &[("select", "*"), ("limit", "1")])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn for_date(&self, date: NaiveDate) -> Result<Option<PrayerTimes>, ProviderError> {
        let date_filter = format!("eq.{}", date.format("%Y-%m-%d"));
        let rows: Vec<PrayerTimes> = self
            .select(
                "prayer_times",
                &[("select", "*"), ("date", date_filter.as_str()), ("limit", "1")],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn refresh(&self) -> Result<(), ProviderError> {
        Ok(self.refresh_prayer_times().await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_row_into_record() {
        let body = r#"[{
            "id": "0d4f7b7e-1a2b-4c3d-9e8f-112233445566",
            "user_id": "6f1c2a9e-3b4d-4e5f-8a7b-9c0d1e2f3a4b",
            "email": "admin@example.com",
            "role": "admin",
            "is_active": true,
            "last_login": null
        }]"#;
        let rows: Vec<AdminRow> = serde_json::from_str(body).unwrap();
        let record = AdminRecord::try_from(rows.into_iter().next().unwrap()).unwrap();
        assert!(record.grants_admin());
        assert_eq!(record.known_role(), Some(AdminRole::Admin));
    }

    #[test]
    fn test_prayer_row_ignores_extra_columns() {
        let body = r#"[{
            "id": 42,
            "date": "2026-03-20",
            "fajr": "05:01:00",
            "sunrise": "06:30:00",
            "dhuhr": "12:34:00",
            "asr": "15:52:00",
            "maghrib": "18:38:00",
            "isha": "19:59:00",
            "created_at": "2026-03-19T23:00:00Z"
        }]"#;
        let rows: Vec<PrayerTimes> = serde_json::from_str(body).unwrap();
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2026, 3, 20).unwrap());
    }

    #[test]
    fn test_security_event_args_shape() {
        let args = LogSecurityEventArgs {
            p_event_type: "admin_login_failed",
            p_event_description: "Failed login attempt for email: x@example.com",
            p_ip_address: None,
            p_user_agent: Some("Mozilla/5.0"),
        };
        let json = serde_json::to_value(&args).unwrap();
        assert_eq!(json["p_event_type"], "admin_login_failed");
        assert!(json["p_ip_address"].is_null());
    }
}
