//! Rows visitors submit through the public site.
//!
//! The site only reads these; the public forms write them through the
//! backend's own functions. Emails stay plain strings because they are
//! whatever the visitor typed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BookRequestId, ContactId, LessonRegistrationId};

/// A message sent through the contact form (`contacts`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactMessage {
    pub id: ContactId,
    pub name: String,
    pub email: String,
    pub message: String,
    /// Set once a reply went out.
    pub response_status: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ContactMessage {
    /// Whether the message has been answered.
    #[must_use]
    pub const fn is_answered(&self) -> bool {
        self.responded_at.is_some()
    }
}

/// A request to buy or borrow a book (`book_requests`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRequest {
    pub id: BookRequestId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    /// `acquisto` or `prestito` on the public form.
    pub request_type: String,
    pub selected_book: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A child registered for lessons (`lesson_registrations`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonRegistration {
    pub id: LessonRegistrationId,
    pub parent_name: String,
    pub parent_email: String,
    pub phone: Option<String>,
    pub child_name: String,
    pub child_age: i32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_row_ignores_webhook_columns() {
        let body = r#"{
            "id": "0d4f7b7e-1a2b-4c3d-9e8f-112233445566",
            "name": "Yusuf",
            "email": "yusuf@example.com",
            "message": "Orari del venerdì?",
            "response_status": null,
            "responded_at": null,
            "webhook_sent": false,
            "created_at": "2026-03-19T18:00:00Z",
            "updated_at": "2026-03-19T18:00:00Z"
        }"#;
        let contact: ContactMessage = serde_json::from_str(body).unwrap();
        assert_eq!(contact.name, "Yusuf");
        assert!(!contact.is_answered());
    }

    #[test]
    fn test_lesson_registration_row() {
        let body = r#"{
            "id": "6f1c2a9e-3b4d-4e5f-8a7b-9c0d1e2f3a4b",
            "parent_name": "Amina",
            "parent_email": "amina@example.com",
            "phone": null,
            "child_name": "Omar",
            "child_age": 8,
            "created_at": "2026-03-19T18:00:00Z",
            "updated_at": "2026-03-19T18:00:00Z"
        }"#;
        let registration: LessonRegistration = serde_json::from_str(body).unwrap();
        assert_eq!(registration.child_age, 8);
        assert!(registration.phone.is_none());
    }
}
