//! Site configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SUPABASE_URL` - Supabase project URL
//! - `SUPABASE_ANON_KEY` - Supabase anon (publishable) key
//! - `SUPABASE_SERVICE_ROLE_KEY` - Service-role key for the admin directory,
//!   audit log and submissions (these requests carry no user JWT)
//! - `SITE_BASE_URL` - Public URL for the site (confirmation links point here)
//!
//! ## Optional
//! - `SITE_HOST` - Bind address (default: 127.0.0.1)
//! - `SITE_PORT` - Listen port (default: 3000)
//! - `LOG_FORMAT` - `text` or `json` (default: text)
//! - `ADMIN_CHECK_TIMEOUT_SECS` - Admin directory lookup bound (default: 5)
//! - `AUTH_SETTLE_TIMEOUT_SECS` - Max wait for auth state to settle (default: 10)
//! - `SESSION_IDLE_MINUTES` - Visitor session idle timeout (default: 60)
//! - `PRAYER_TIMES_TIMEZONE` - IANA timezone for "today" (default: Europe/Rome)
//! - `PRAYER_TIMES_CACHE_SECS` - Prayer times cache TTL (default: 300)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Prefix of Supabase's newer secret keys; not part of the random material.
const SECRET_KEY_PREFIX: &str = "sb_secret_";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One flattened JSON object per event, for log shippers
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

/// Site application configuration.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the site
    pub base_url: Url,
    /// Supabase project configuration
    pub supabase: SupabaseConfig,
    /// Auth session settings
    pub auth: AuthConfig,
    /// Prayer times settings
    pub prayer_times: PrayerTimesConfig,
    /// Log output format
    pub log_format: LogFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. production, staging)
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
}

/// Supabase project configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct SupabaseConfig {
    /// Project URL (e.g. <https://abcd.supabase.co>)
    pub url: Url,
    /// Anon key; safe to expose to browsers
    pub anon_key: SecretString,
    /// Service-role key; bypasses row-level security
    pub service_role_key: Option<SecretString>,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url.as_str())
            .field("anon_key", &"[REDACTED]")
            .field(
                "service_role_key",
                &self.service_role_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Auth session settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Bound on one admin directory lookup
    pub admin_check_timeout: Duration,
    /// Bound on waiting for auth state to settle before a guarded page renders
    pub settle_timeout: Duration,
    /// Visitors idle this long lose their session and controller
    pub session_idle: Duration,
}

/// Prayer times settings.
#[derive(Debug, Clone)]
pub struct PrayerTimesConfig {
    /// Timezone deciding the calendar day
    pub timezone: Tz,
    /// How long a lookup is cached
    pub cache_ttl: Duration,
}

impl SiteConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the service-role key is missing or fails validation (placeholder
    /// detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = parse_env_or_default::<IpAddr>("SITE_HOST", "127.0.0.1")?;
        let port = parse_env_or_default::<u16>("SITE_PORT", "3000")?;
        let base_url = get_required_url("SITE_BASE_URL")?;

        let config = Self {
            host,
            port,
            base_url,
            supabase: SupabaseConfig::from_env()?,
            auth: AuthConfig::from_env()?,
            prayer_times: PrayerTimesConfig::from_env()?,
            log_format: parse_env_or_default("LOG_FORMAT", "text")?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env_or_default("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env_or_default("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check settings the site cannot run without.
    ///
    /// The CLI loads [`SupabaseConfig`] on its own and only needs the
    /// service-role key for some commands; the site always needs it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if the service-role key is unset.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.supabase.require_service_role_key()?;
        Ok(())
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Where confirmation and password-reset emails send the user.
    #[must_use]
    pub fn auth_redirect_url(&self) -> String {
        self.base_url
            .join("dashboard")
            .map_or_else(|_| format!("{}dashboard", self.base_url), String::from)
    }

    /// Whether cookies must be marked `Secure`.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.scheme() == "https"
    }
}

impl SupabaseConfig {
    /// Load only the Supabase settings (used by the CLI).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the URL or anon key is missing, or the
    /// service-role key fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let service_role_key = get_optional_env("SUPABASE_SERVICE_ROLE_KEY")
            .map(|key| {
                validate_secret_strength(
                    key.strip_prefix(SECRET_KEY_PREFIX).unwrap_or(&key),
                    "SUPABASE_SERVICE_ROLE_KEY",
                )?;
                Ok::<_, ConfigError>(SecretString::from(key))
            })
            .transpose()?;

        Ok(Self {
            url: get_required_url("SUPABASE_URL")?,
            anon_key: SecretString::from(get_required_env("SUPABASE_ANON_KEY")?),
            service_role_key,
        })
    }

    /// The service-role key, or an error naming the missing variable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` when no service-role key is set.
    pub fn require_service_role_key(&self) -> Result<&SecretString, ConfigError> {
        self.service_role_key
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("SUPABASE_SERVICE_ROLE_KEY".to_string()))
    }
}

impl AuthConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            admin_check_timeout: Duration::from_secs(parse_env_or_default(
                "ADMIN_CHECK_TIMEOUT_SECS",
                "5",
            )?),
            settle_timeout: Duration::from_secs(parse_env_or_default(
                "AUTH_SETTLE_TIMEOUT_SECS",
                "10",
            )?),
            session_idle: Duration::from_secs(
                parse_env_or_default::<u64>("SESSION_IDLE_MINUTES", "60")? * 60,
            ),
        })
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_check_timeout: Duration::from_secs(5),
            settle_timeout: Duration::from_secs(10),
            session_idle: Duration::from_secs(60 * 60),
        }
    }
}

impl PrayerTimesConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            timezone: parse_env_or_default("PRAYER_TIMES_TIMEZONE", "Europe/Rome")?,
            cache_ttl: Duration::from_secs(parse_env_or_default("PRAYER_TIMES_CACHE_SECS", "300")?),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as an absolute URL.
fn get_required_url(key: &str) -> Result<Url, ConfigError> {
    let value = get_required_env(key)?;
    Url::parse(&value).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default`.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Copy the key from the Supabase dashboard."
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> SiteConfig {
        SiteConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: Url::parse("https://masjid.example.org").unwrap(),
            supabase: SupabaseConfig {
                url: Url::parse("https://abcd.supabase.co").unwrap(),
                anon_key: SecretString::from("anon-key-value"),
                service_role_key: Some(SecretString::from("service-role-key-value")),
            },
            auth: AuthConfig::default(),
            prayer_times: PrayerTimesConfig {
                timezone: chrono_tz::Europe::Rome,
                cache_ttl: Duration::from_secs(300),
            },
            log_format: LogFormat::Text,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        }
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-service-role-key", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_socket_addr() {
        let addr = config().socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_auth_redirect_url() {
        let cfg = config();
        assert_eq!(cfg.auth_redirect_url(), "https://masjid.example.org/dashboard");
        assert!(cfg.is_secure());
    }

    #[test]
    fn test_supabase_config_debug_redacts_secrets() {
        let debug_output = format!("{:?}", config().supabase);
        assert!(debug_output.contains("abcd.supabase.co"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("anon-key-value"));
        assert!(!debug_output.contains("service-role-key-value"));
    }

    #[test]
    fn test_timezone_parses_from_iana_name() {
        let tz: Tz = "Europe/Rome".parse().unwrap();
        assert_eq!(tz, chrono_tz::Europe::Rome);
    }

    #[test]
    fn test_validate_requires_service_role_key() {
        let mut cfg = config();
        assert!(cfg.validate().is_ok());

        cfg.supabase.service_role_key = None;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MissingEnvVar(var)) if var == "SUPABASE_SERVICE_ROLE_KEY"
        ));
    }

    #[test]
    fn test_log_format_parses() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" Text ".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("yaml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }
}
