//! Tenant provisioning commands.

use chrono::Utc;
use secrecy::SecretString;

use orderloop_core::{Phone, Tenant, TenantId, TenantSecrets};
use orderloop_server::registry::TenantRegistry;
use orderloop_server::store::{self, OrderStore, PgStore};

/// Parameters for onboarding a tenant.
pub struct AddTenant {
    pub id: String,
    pub domain: String,
    pub name: String,
    pub webhook_secret: String,
    pub platform_token: String,
    pub courier_key: String,
    pub owner_phone: Option<String>,
    pub auto_book: bool,
    pub country_code: String,
}

/// Create or update a tenant and its credentials.
///
/// # Errors
///
/// Returns an error if the database is unreachable or the write fails.
pub async fn add(params: AddTenant) -> Result<(), Box<dyn std::error::Error>> {
    let database_url = super::database_url()?;
    let pool = store::create_pool(&database_url).await?;
    let store = PgStore::new(pool);

    let shop_domain = TenantRegistry::normalize_domain(&params.domain);
    let owner_phone = params
        .owner_phone
        .as_deref()
        .and_then(|raw| Phone::normalize(raw, &params.country_code));

    if params.owner_phone.is_some() && owner_phone.is_none() {
        return Err("owner phone contains no digits".into());
    }

    let tenant = Tenant {
        id: TenantId::new(&params.id),
        shop_domain: shop_domain.clone(),
        shop_name: params.name,
        created_at: Utc::now(),
    };
    let secrets = TenantSecrets {
        webhook_secret: SecretString::from(params.webhook_secret),
        platform_token: SecretString::from(params.platform_token),
        courier_api_key: SecretString::from(params.courier_key),
        owner_phone,
        auto_book: params.auto_book,
        country_code: params.country_code,
    };

    store.upsert_tenant(&tenant, &secrets).await?;

    tracing::info!(tenant = %tenant.id, domain = %shop_domain, "Tenant provisioned");
    Ok(())
}

/// Print all onboarded tenants.
///
/// # Errors
///
/// Returns an error if the database is unreachable.
#[allow(clippy::print_stdout)]
pub async fn list() -> Result<(), Box<dyn std::error::Error>> {
    let database_url = super::database_url()?;
    let pool = store::create_pool(&database_url).await?;
    let store = PgStore::new(pool);

    let tenants = store.list_tenants().await?;
    if tenants.is_empty() {
        println!("No tenants onboarded yet.");
        return Ok(());
    }

    for tenant in tenants {
        println!(
            "{}\t{}\t{}\t{}",
            tenant.id,
            tenant.shop_domain,
            tenant.shop_name,
            tenant.created_at.format("%Y-%m-%d")
        );
    }
    Ok(())
}
