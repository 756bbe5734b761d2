//! Read-only access to what visitors submitted through the public site.

use async_trait::async_trait;

use masjid_core::{BookRequest, ContactMessage, LessonRegistration};

use crate::services::auth::ProviderError;

/// Backend access for visitor submissions, newest first.
#[async_trait]
pub trait SubmissionsSource: Send + Sync {
    /// Contact form messages.
    async fn contacts(&self, limit: usize) -> Result<Vec<ContactMessage>, ProviderError>;

    /// Book purchase and loan requests.
    async fn book_requests(&self, limit: usize) -> Result<Vec<BookRequest>, ProviderError>;

    /// Lesson registrations.
    async fn lesson_registrations(
        &self,
        limit: usize,
    ) -> Result<Vec<LessonRegistration>, ProviderError>;
}
