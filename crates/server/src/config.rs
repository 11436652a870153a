//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ORDERLOOP_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `WHATSAPP_ACCESS_TOKEN` - WhatsApp Cloud API bearer token
//! - `WHATSAPP_PHONE_NUMBER_ID` - Business phone number id messages are sent from
//! - `WHATSAPP_VERIFY_TOKEN` - Shared secret for the webhook verification handshake
//! - `COURIER_API_BASE` - Base URL of the courier REST API
//!
//! ## Optional
//! - `ORDERLOOP_HOST` - Bind address (default: 0.0.0.0)
//! - `ORDERLOOP_PORT` - Listen port (default: 8080)
//! - `WHATSAPP_API_BASE` - Cloud API base URL (default: <https://graph.facebook.com/v19.0>)
//! - `SHOPIFY_API_VERSION` - Admin API version for note updates (default: 2025-01)
//! - `DEFAULT_COUNTRY_CODE` - Dialing code for phone normalization when a tenant has none (default: 92)
//! - `POLL_INTERVAL_SECS` - Reconciliation poller period (default: 300)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_WHATSAPP_API_BASE: &str = "https://graph.facebook.com/v19.0";
const DEFAULT_SHOPIFY_API_VERSION: &str = "2025-01";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

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

/// Orchestrator configuration.
///
/// Loaded once at startup and threaded into every component constructor -
/// per-tenant credentials never live here, they are read fresh from the
/// store on each event.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// WhatsApp Cloud API configuration
    pub whatsapp: WhatsAppConfig,
    /// Courier REST API configuration
    pub courier: CourierConfig,
    /// Shopify Admin API version used for order note updates
    pub shopify_api_version: String,
    /// Dialing country code used when a tenant doesn't set one
    pub default_country_code: String,
    /// Reconciliation poller period
    pub poll_interval: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// WhatsApp Cloud API configuration.
///
/// One business number serves every tenant; tenant identity rides in the
/// button payloads, not the channel. Implements `Debug` manually to redact
/// the token.
#[derive(Clone)]
pub struct WhatsAppConfig {
    /// Cloud API base URL.
    pub api_base: Url,
    /// Business phone number id messages are sent from.
    pub phone_number_id: String,
    /// Bearer token for the Cloud API.
    pub access_token: SecretString,
    /// Shared secret echoed during the webhook verification handshake.
    pub verify_token: SecretString,
}

impl std::fmt::Debug for WhatsAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppConfig")
            .field("api_base", &self.api_base.as_str())
            .field("phone_number_id", &self.phone_number_id)
            .field("access_token", &"[REDACTED]")
            .field("verify_token", &"[REDACTED]")
            .finish()
    }
}

/// Courier REST API configuration. Per-tenant API keys come from tenant
/// secrets; only the endpoint is process-wide.
#[derive(Debug, Clone)]
pub struct CourierConfig {
    /// Courier API base URL.
    pub api_base: Url,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("ORDERLOOP_DATABASE_URL")?;
        let host = get_env_or_default("ORDERLOOP_HOST", "0.0.0.0")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("ORDERLOOP_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("ORDERLOOP_PORT", "8080")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("ORDERLOOP_PORT".to_string(), e.to_string()))?;

        let whatsapp = WhatsAppConfig::from_env()?;
        let courier = CourierConfig::from_env()?;

        let shopify_api_version =
            get_env_or_default("SHOPIFY_API_VERSION", DEFAULT_SHOPIFY_API_VERSION);
        let default_country_code = get_env_or_default("DEFAULT_COUNTRY_CODE", "92");

        let poll_interval_secs = get_env_or_default(
            "POLL_INTERVAL_SECS",
            &DEFAULT_POLL_INTERVAL_SECS.to_string(),
        )
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar("POLL_INTERVAL_SECS".to_string(), e.to_string()))?;

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);

        Ok(Self {
            database_url,
            host,
            port,
            whatsapp,
            courier,
            shopify_api_version,
            default_country_code,
            poll_interval: Duration::from_secs(poll_interval_secs),
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl WhatsAppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let api_base = get_env_or_default("WHATSAPP_API_BASE", DEFAULT_WHATSAPP_API_BASE);
        let api_base = Url::parse(&api_base)
            .map_err(|e| ConfigError::InvalidEnvVar("WHATSAPP_API_BASE".to_string(), e.to_string()))?;

        Ok(Self {
            api_base,
            phone_number_id: get_required_env("WHATSAPP_PHONE_NUMBER_ID")?,
            access_token: get_validated_secret("WHATSAPP_ACCESS_TOKEN")?,
            verify_token: get_validated_secret("WHATSAPP_VERIFY_TOKEN")?,
        })
    }
}

impl CourierConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let api_base = get_required_env("COURIER_API_BASE")?;
        let api_base = Url::parse(&api_base)
            .map_err(|e| ConfigError::InvalidEnvVar("COURIER_API_BASE".to_string(), e.to_string()))?;

        Ok(Self { api_base })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
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

    // Real tokens have high entropy; a short human-chosen string does not.
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        // All same character = 0 entropy
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_high() {
        let entropy = shannon_entropy("aB3$xY9!mK2@nL5#");
        assert!(entropy > 3.3);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "TEST_VAR");
        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InsecureSecret(_, _)
        ));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_whatsapp_config_debug_redacts_secrets() {
        let config = WhatsAppConfig {
            api_base: Url::parse(DEFAULT_WHATSAPP_API_BASE).unwrap(),
            phone_number_id: "1234567890".to_string(),
            access_token: SecretString::from("EAAB-super-private-token"),
            verify_token: SecretString::from("hub-verify-private"),
        };

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("1234567890"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("EAAB-super-private-token"));
        assert!(!debug_output.contains("hub-verify-private"));
    }
}
