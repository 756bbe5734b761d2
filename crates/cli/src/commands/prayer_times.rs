//! Prayer times maintenance.
//!
//! # Environment Variables
//!
//! - `SUPABASE_URL` - Supabase project URL
//! - `SUPABASE_ANON_KEY` - Supabase anon key
//! - `SUPABASE_SERVICE_ROLE_KEY` - Service-role key

use super::{BackendError, service_client};

/// Run the edge function that copies today's calendar entry into
/// `current_prayer_times`.
pub async fn refresh() -> Result<(), BackendError> {
    let rest = service_client()?;
    rest.refresh_prayer_times().await?;
    tracing::info!("Prayer times refreshed");
    Ok(())
}
