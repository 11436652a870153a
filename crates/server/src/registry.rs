//! Tenant resolution.
//!
//! Every inbound event starts here: the storefront domain from the webhook
//! header is normalized and looked up, and credentials are read fresh from
//! the store - never cached across events, so re-provisioning a tenant takes
//! effect on the very next webhook.

use std::sync::Arc;

use tracing::instrument;

use orderloop_core::{Tenant, TenantId, TenantSecrets};

use crate::store::{OrderStore, StoreError};

/// Commerce platform domain suffix stripped before lookup.
const PLATFORM_DOMAIN_SUFFIX: &str = ".myshopify.com";

/// Resolves inbound identity to tenant configuration.
#[derive(Clone)]
pub struct TenantRegistry {
    store: Arc<dyn OrderStore>,
}

impl TenantRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Normalize a storefront domain for lookup: lower-case, platform
    /// suffix stripped.
    #[must_use]
    pub fn normalize_domain(domain: &str) -> String {
        let lower = domain.trim().to_ascii_lowercase();
        lower
            .strip_suffix(PLATFORM_DOMAIN_SUFFIX)
            .unwrap_or(&lower)
            .to_owned()
    }

    /// Resolve a tenant by the domain carried in a webhook header.
    ///
    /// A miss is terminal for the calling event: the caller logs and drops.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the lookup itself fails.
    #[instrument(skip(self))]
    pub async fn resolve_by_domain(&self, domain: &str) -> Result<Option<Tenant>, StoreError> {
        let normalized = Self::normalize_domain(domain);
        self.store.tenant_by_domain(&normalized).await
    }

    /// Load a tenant's credentials, fresh from the store.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the lookup itself fails.
    pub async fn secrets(&self, tenant_id: &TenantId) -> Result<Option<TenantSecrets>, StoreError> {
        self.store.tenant_secrets(tenant_id).await
    }

    /// Load a tenant's display record by id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the lookup itself fails.
    pub async fn tenant(&self, tenant_id: &TenantId) -> Result<Option<Tenant>, StoreError> {
        self.store.tenant(tenant_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_platform_suffix() {
        assert_eq!(TenantRegistry::normalize_domain("acme.myshopify.com"), "acme");
        assert_eq!(TenantRegistry::normalize_domain("MyShop.MYSHOPIFY.com"), "myshop");
    }

    #[test]
    fn test_normalize_keeps_custom_domains() {
        assert_eq!(TenantRegistry::normalize_domain("shop.acme.pk"), "shop.acme.pk");
        assert_eq!(TenantRegistry::normalize_domain("  Acme.PK "), "acme.pk");
    }
}
