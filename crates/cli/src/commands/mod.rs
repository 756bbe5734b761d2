//! CLI subcommands.

pub mod admin;
pub mod prayer_times;

use masjid_site::config::{ConfigError, SupabaseConfig};
use masjid_site::supabase::{SupabaseClient, SupabaseError, SupabaseRest};
use thiserror::Error;

/// Errors shared by commands that talk to Supabase.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Configuration is missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Supabase request failed.
    #[error("Supabase error: {0}")]
    Supabase(#[from] SupabaseError),
}

/// PostgREST client authorized with the service-role key.
///
/// Admin management bypasses row-level security, so the anon key is not
/// accepted here.
fn service_client() -> Result<SupabaseRest, BackendError> {
    dotenvy::dotenv().ok();

    let config = SupabaseConfig::from_env()?;
    let key = config.require_service_role_key()?.clone();

    tracing::info!("Connecting to Supabase at {}", config.url);
    let client = SupabaseClient::new(&config.url, key)?;
    Ok(SupabaseRest::new(client))
}
