//! Dashboard route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};
use tracing::instrument;

use masjid_core::{
    BookRequest, ContactMessage, LessonRegistration, SecurityEventKind, SecurityEventRecord,
};

use crate::middleware::RequireAdmin;
use crate::services::auth::ProviderError;
use crate::state::AppState;

/// How many audit log rows the dashboard summarizes.
const RECENT_EVENTS: usize = 100;

/// How many of those rows are listed.
const LISTED_EVENTS: usize = 10;

/// How many rows of each submission table are listed.
const LISTED_SUBMISSIONS: usize = 50;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Security audit statistics over the recent events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecurityStats {
    pub total: usize,
    pub failed_logins: usize,
    pub admin_logins: usize,
}

impl SecurityStats {
    /// Count events by kind.
    #[must_use]
    pub fn from_events(events: &[SecurityEventRecord]) -> Self {
        let count = |kind| events.iter().filter(|e| e.is(kind)).count();
        Self {
            total: events.len(),
            failed_logins: count(SecurityEventKind::AdminLoginFailed),
            admin_logins: count(SecurityEventKind::AdminLoginSuccess),
        }
    }
}

/// Audit log row view for the dashboard.
#[derive(Debug, Clone)]
pub struct SecurityEventView {
    pub created_at: String,
    pub event_type: String,
    pub description: String,
}

impl From<&SecurityEventRecord> for SecurityEventView {
    fn from(event: &SecurityEventRecord) -> Self {
        Self {
            created_at: event.created_at.format(DATE_FORMAT).to_string(),
            event_type: event.event_type.clone(),
            description: event.event_description.clone(),
        }
    }
}

/// Contact message view for the dashboard.
#[derive(Debug, Clone)]
pub struct ContactView {
    pub created_at: String,
    pub name: String,
    pub email: String,
    pub message: String,
    pub answered: bool,
}

impl From<ContactMessage> for ContactView {
    fn from(contact: ContactMessage) -> Self {
        Self {
            created_at: contact.created_at.format(DATE_FORMAT).to_string(),
            answered: contact.is_answered(),
            name: contact.name,
            email: contact.email,
            message: contact.message,
        }
    }
}

/// Book request view for the dashboard.
#[derive(Debug, Clone)]
pub struct BookRequestView {
    pub created_at: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub request_type: String,
    pub selected_book: String,
    pub notes: String,
}

impl From<BookRequest> for BookRequestView {
    fn from(request: BookRequest) -> Self {
        Self {
            created_at: request.created_at.format(DATE_FORMAT).to_string(),
            name: request.name,
            email: request.email,
            phone: request.phone.unwrap_or_default(),
            address: request.address.unwrap_or_default(),
            request_type: request.request_type,
            selected_book: request.selected_book,
            notes: request.notes.unwrap_or_default(),
        }
    }
}

/// Lesson registration view for the dashboard.
#[derive(Debug, Clone)]
pub struct LessonRegistrationView {
    pub created_at: String,
    pub parent_name: String,
    pub parent_email: String,
    pub phone: String,
    pub child_name: String,
    pub child_age: i32,
}

impl From<LessonRegistration> for LessonRegistrationView {
    fn from(registration: LessonRegistration) -> Self {
        Self {
            created_at: registration.created_at.format(DATE_FORMAT).to_string(),
            parent_name: registration.parent_name,
            parent_email: registration.parent_email,
            phone: registration.phone.unwrap_or_default(),
            child_name: registration.child_name,
            child_age: registration.child_age,
        }
    }
}

/// Dashboard template.
///
/// A listing that failed to load is `None` and renders as a notice.
#[derive(Template, WebTemplate)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub email: String,
    pub stats_available: bool,
    pub stats: SecurityStats,
    pub recent_events: Vec<SecurityEventView>,
    pub contacts: Option<Vec<ContactView>>,
    pub book_requests: Option<Vec<BookRequestView>>,
    pub lesson_registrations: Option<Vec<LessonRegistrationView>>,
}

fn listing<T, V: From<T>>(table: &str, rows: Result<Vec<T>, ProviderError>) -> Option<Vec<V>> {
    match rows {
        Ok(rows) => Some(rows.into_iter().map(V::from).collect()),
        Err(e) => {
            tracing::warn!(table, error = %e, "Failed to load submissions");
            None
        }
    }
}

/// Display the admin dashboard.
#[instrument(skip(state, admin), fields(user_id = %admin.user.id))]
pub async fn dashboard(State(state): State<AppState>, admin: RequireAdmin) -> impl IntoResponse {
    let submissions = state.submissions();
    let (events, contacts, book_requests, lesson_registrations) = tokio::join!(
        state.security_log().recent(RECENT_EVENTS),
        submissions.contacts(LISTED_SUBMISSIONS),
        submissions.book_requests(LISTED_SUBMISSIONS),
        submissions.lesson_registrations(LISTED_SUBMISSIONS),
    );

    let (stats_available, stats, recent_events) = match events {
        Ok(events) => (
            true,
            SecurityStats::from_events(&events),
            events
                .iter()
                .take(LISTED_EVENTS)
                .map(SecurityEventView::from)
                .collect(),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load security audit log");
            (false, SecurityStats::default(), Vec::new())
        }
    };

    DashboardTemplate {
        email: admin.user.email.to_string(),
        stats_available,
        stats,
        recent_events,
        contacts: listing("contacts", contacts),
        book_requests: listing("book_requests", book_requests),
        lesson_registrations: listing("lesson_registrations", lesson_registrations),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use masjid_core::{BookRequestId, ContactId, LessonRegistrationId, SecurityEventId};

    use super::*;

    fn event(kind: SecurityEventKind) -> SecurityEventRecord {
        SecurityEventRecord {
            id: SecurityEventId::new(uuid::Uuid::new_v4()),
            user_id: None,
            event_type: kind.as_str().to_string(),
            event_description: "test".to_string(),
            ip_address: None,
            user_agent: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_stats_count_by_kind() {
        let events = vec![
            event(SecurityEventKind::AdminLoginFailed),
            event(SecurityEventKind::AdminLoginFailed),
            event(SecurityEventKind::AdminLoginSuccess),
            event(SecurityEventKind::AdminUnauthorizedAccess),
        ];
        assert_eq!(
            SecurityStats::from_events(&events),
            SecurityStats {
                total: 4,
                failed_logins: 2,
                admin_logins: 1,
            }
        );
    }

    #[test]
    fn test_unavailable_log_renders_notice() {
        let html = DashboardTemplate {
            email: "admin@example.com".to_string(),
            stats_available: false,
            stats: SecurityStats::default(),
            recent_events: Vec::new(),
            contacts: Some(Vec::new()),
            book_requests: Some(Vec::new()),
            lesson_registrations: Some(Vec::new()),
        }
        .render()
        .unwrap();
        assert!(html.contains("admin@example.com"));
        assert!(html.contains("security log is unavailable"));
    }

    #[test]
    fn test_submissions_render() {
        let now = Utc::now();
        let contact = ContactMessage {
            id: ContactId::new(uuid::Uuid::new_v4()),
            name: "Yusuf".to_string(),
            email: "yusuf@example.com".to_string(),
            message: "Orari del venerdì?".to_string(),
            response_status: None,
            responded_at: None,
            created_at: now,
        };
        let request = BookRequest {
            id: BookRequestId::new(uuid::Uuid::new_v4()),
            name: "Fatima".to_string(),
            email: "fatima@example.com".to_string(),
            phone: None,
            address: Some("Via Roma 1".to_string()),
            request_type: "prestito".to_string(),
            selected_book: "Il Corano".to_string(),
            notes: None,
            created_at: now,
        };
        let registration = LessonRegistration {
            id: LessonRegistrationId::new(uuid::Uuid::new_v4()),
            parent_name: "Amina".to_string(),
            parent_email: "amina@example.com".to_string(),
            phone: None,
            child_name: "Omar".to_string(),
            child_age: 8,
            created_at: now,
        };

        let html = DashboardTemplate {
            email: "admin@example.com".to_string(),
            stats_available: true,
            stats: SecurityStats::default(),
            recent_events: Vec::new(),
            contacts: listing("contacts", Ok(vec![contact])),
            book_requests: listing("book_requests", Ok(vec![request])),
            lesson_registrations: listing("lesson_registrations", Ok(vec![registration])),
        }
        .render()
        .unwrap();

        assert!(html.contains("yusuf@example.com"));
        assert!(html.contains("Il Corano"));
        assert!(html.contains("Via Roma 1"));
        assert!(html.contains("Omar"));
    }

    #[test]
    fn test_failed_listing_renders_notice() {
        let contacts: Option<Vec<ContactView>> = listing(
            "contacts",
            Err::<Vec<ContactMessage>, _>(ProviderError::Transient("503".into())),
        );
        assert!(contacts.is_none());

        let html = DashboardTemplate {
            email: "admin@example.com".to_string(),
            stats_available: true,
            stats: SecurityStats::default(),
            recent_events: Vec::new(),
            contacts,
            book_requests: Some(Vec::new()),
            lesson_registrations: Some(Vec::new()),
        }
        .render()
        .unwrap();
        assert!(html.contains("Contact messages are unavailable"));
        assert!(html.contains("No book requests yet"));
    }
}
