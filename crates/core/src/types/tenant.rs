//! Tenants and their credentials.

use chrono::{DateTime, Utc};
use secrecy::SecretString;

use super::id::TenantId;
use super::phone::Phone;

/// An onboarded storefront. Owns every order beneath it.
#[derive(Debug, Clone)]
pub struct Tenant {
    pub id: TenantId,
    /// Normalized storefront domain (lower-case, platform suffix stripped).
    pub shop_domain: String,
    /// Display name used in customer-facing templates.
    pub shop_name: String,
    pub created_at: DateTime<Utc>,
}

/// Per-tenant credentials and settings.
///
/// Fetched fresh from the store on every event - never cached across events,
/// so re-provisioning a tenant takes effect immediately.
///
/// Implements `Debug` manually to redact credentials.
#[derive(Clone)]
pub struct TenantSecrets {
    /// Key the platform signs webhook bodies with.
    pub webhook_secret: SecretString,
    /// Platform Admin API access token.
    pub platform_token: SecretString,
    /// Courier API key.
    pub courier_api_key: SecretString,
    /// Store owner's phone for operational heads-up messages.
    pub owner_phone: Option<Phone>,
    /// Book the courier automatically when the customer confirms.
    pub auto_book: bool,
    /// Dialing country code used for phone normalization.
    pub country_code: String,
}

impl std::fmt::Debug for TenantSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantSecrets")
            .field("webhook_secret", &"[REDACTED]")
            .field("platform_token", &"[REDACTED]")
            .field("courier_api_key", &"[REDACTED]")
            .field("owner_phone", &self.owner_phone)
            .field("auto_book", &self.auto_book)
            .field("country_code", &self.country_code)
            .finish()
    }
}
