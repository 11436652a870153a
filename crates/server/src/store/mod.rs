//! Persistence for tenants, orders, and dead letters.
//!
//! The backing engine is treated as a keyed document store with
//! partial-field update semantics: every transition method writes only the
//! columns it owns, and the guarded variants re-check their precondition in
//! the `WHERE` clause so a lost race degrades to a no-op instead of a lost
//! update.
//!
//! [`OrderStore`] is a trait so the lifecycle engine and poller can be
//! exercised against [`MemoryStore`] in tests; [`PgStore`] is the
//! production implementation.

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use uuid::Uuid;

use orderloop_core::{
    NotificationKind, Order, OrderId, Phone, Tenant, TenantId, TenantSecrets, TrackingNumber,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the store is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,
}

/// A side effect that failed and was swallowed.
///
/// Append-only; nothing on the hot path reads these back. They exist so
/// "logged and swallowed" failures are observable after the fact.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub order_id: Option<OrderId>,
    /// Which side effect failed, e.g. `"send_template:order_confirmation"`.
    pub effect: String,
    pub error: String,
    pub created_at: DateTime<Utc>,
}

impl DeadLetter {
    /// Record a failed side effect against an order.
    #[must_use]
    pub fn new(
        tenant_id: &TenantId,
        order_id: Option<&OrderId>,
        effect: impl Into<String>,
        error: impl std::fmt::Display,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.clone(),
            order_id: order_id.cloned(),
            effect: effect.into(),
            error: error.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Keyed access to tenants and their orders.
///
/// Transition methods returning `bool` report whether the guarded write
/// actually landed (`false` means the precondition no longer held - the
/// caller treats that as the sanctioned no-op branch).
#[async_trait]
pub trait OrderStore: Send + Sync {
    // -- tenants ------------------------------------------------------------

    /// Look up a tenant by its normalized storefront domain.
    async fn tenant_by_domain(&self, domain: &str) -> Result<Option<Tenant>, StoreError>;

    /// Load a tenant's display record.
    async fn tenant(&self, tenant_id: &TenantId) -> Result<Option<Tenant>, StoreError>;

    /// Load a tenant's credentials. Called fresh on every event.
    async fn tenant_secrets(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<TenantSecrets>, StoreError>;

    /// All onboarded tenants (poller sweep order).
    async fn list_tenants(&self) -> Result<Vec<Tenant>, StoreError>;

    /// Create or replace a tenant and its secrets (provisioning path).
    async fn upsert_tenant(
        &self,
        tenant: &Tenant,
        secrets: &TenantSecrets,
    ) -> Result<(), StoreError>;

    // -- orders -------------------------------------------------------------

    /// Insert a freshly created order. Returns `false` if the id already
    /// exists for this tenant (idempotent re-delivery).
    async fn insert_order(&self, tenant_id: &TenantId, order: &Order) -> Result<bool, StoreError>;

    async fn get_order(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
    ) -> Result<Option<Order>, StoreError>;

    /// The expensive fallback path: scan all tenants' orders for this phone
    /// and pick the one with the greatest of (`last_msg_sent_at`,
    /// `created_at`), ties broken by `created_at`.
    async fn find_latest_by_phone(
        &self,
        phone: &Phone,
    ) -> Result<Option<(TenantId, Order)>, StoreError>;

    /// Orders with a tracking number and non-terminal status (poller input).
    async fn list_trackable(&self, tenant_id: &TenantId) -> Result<Vec<Order>, StoreError>;

    // -- guarded transitions (partial-field writes) -------------------------

    /// `pending -> confirmed`; sets `confirmed_at`.
    async fn mark_confirmed(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// `pending -> cancelled`; sets `cancelled_at`.
    async fn mark_cancelled(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// `pending|confirmed -> fulfilled`; sets `fulfilled_at`.
    async fn mark_fulfilled(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Forward to `out_for_delivery`; records the observed courier status.
    async fn mark_out_for_delivery(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        courier_status: &str,
    ) -> Result<bool, StoreError>;

    /// Forward to `delivered`; sets `delivered_at` and the courier status.
    async fn mark_delivered(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        courier_status: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    // -- narrow field updates -----------------------------------------------

    /// Record a successful courier booking. Never overwrites an existing
    /// tracking number.
    async fn set_courier_booking(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        tracking: &TrackingNumber,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Update only the last observed courier status string.
    async fn set_courier_status(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        courier_status: &str,
    ) -> Result<(), StoreError>;

    /// Flip a notification flag to sent.
    async fn set_notification_sent(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        kind: NotificationKind,
    ) -> Result<(), StoreError>;

    async fn touch_last_msg_sent(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn touch_last_reply(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // -- dead letters -------------------------------------------------------

    async fn record_dead_letter(&self, letter: &DeadLetter) -> Result<(), StoreError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
