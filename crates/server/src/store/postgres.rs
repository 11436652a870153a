//! `PostgreSQL` implementation of the order store.
//!
//! Every mutation is a per-column `UPDATE`; guarded transitions repeat their
//! precondition in the `WHERE` clause and report via `rows_affected` whether
//! the write landed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;

use orderloop_core::{
    CourierInfo, Customer, Money, NotificationFlags, NotificationKind, Order, OrderId, OrderStatus,
    Phone, ProductSummary, Tenant, TenantId, TenantSecrets, Timeline, TrackingNumber,
};

use super::{DeadLetter, OrderStore, StoreError};

/// Production store over a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run embedded schema migrations.
    ///
    /// Invoked from the CLI, never at server startup.
    ///
    /// # Errors
    ///
    /// Returns the underlying migration error.
    pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(pool).await
    }
}

// =============================================================================
// Row types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct TenantRow {
    id: String,
    shop_domain: String,
    shop_name: String,
    created_at: DateTime<Utc>,
}

impl From<TenantRow> for Tenant {
    fn from(row: TenantRow) -> Self {
        Self {
            id: TenantId::new(row.id),
            shop_domain: row.shop_domain,
            shop_name: row.shop_name,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SecretsRow {
    webhook_secret: String,
    platform_token: String,
    courier_api_key: String,
    owner_phone: Option<String>,
    auto_book: bool,
    country_code: String,
}

impl From<SecretsRow> for TenantSecrets {
    fn from(row: SecretsRow) -> Self {
        Self {
            webhook_secret: SecretString::from(row.webhook_secret),
            platform_token: SecretString::from(row.platform_token),
            courier_api_key: SecretString::from(row.courier_api_key),
            owner_phone: row.owner_phone.map(Phone::from_stored),
            auto_book: row.auto_book,
            country_code: row.country_code,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    tenant_id: String,
    order_id: String,
    order_name: String,
    customer_name: String,
    phone: Option<String>,
    address: Option<String>,
    city: Option<String>,
    total: Decimal,
    currency: String,
    product_name: String,
    quantity: i32,
    status: String,
    created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    fulfilled_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    last_msg_sent_at: Option<DateTime<Utc>>,
    last_reply_at: Option<DateTime<Utc>>,
    confirmation_sent: bool,
    fulfilled_sent: bool,
    reply_ack_sent: bool,
    tracking_number: Option<String>,
    courier_status: Option<String>,
    booked_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status: OrderStatus = row
            .status
            .parse()
            .map_err(|e: String| StoreError::DataCorruption(e))?;

        Ok(Self {
            id: OrderId::new(row.order_id),
            name: row.order_name,
            customer: Customer {
                name: row.customer_name,
                phone: row.phone.map(Phone::from_stored),
                address: row.address,
                city: row.city,
            },
            amount: Money::new(row.total, row.currency),
            product: ProductSummary {
                name: row.product_name,
                quantity: u32::try_from(row.quantity).unwrap_or(0),
            },
            status,
            timeline: Timeline {
                created_at: row.created_at,
                confirmed_at: row.confirmed_at,
                cancelled_at: row.cancelled_at,
                fulfilled_at: row.fulfilled_at,
                delivered_at: row.delivered_at,
                last_msg_sent_at: row.last_msg_sent_at,
                last_reply_at: row.last_reply_at,
            },
            flags: NotificationFlags {
                confirmation_sent: row.confirmation_sent,
                fulfilled_sent: row.fulfilled_sent,
                reply_ack_sent: row.reply_ack_sent,
            },
            courier: CourierInfo {
                tracking_number: row.tracking_number.map(TrackingNumber::new),
                last_status: row.courier_status,
                booked_at: row.booked_at,
            },
        })
    }
}

const ORDER_COLUMNS: &str = "tenant_id, order_id, order_name, customer_name, phone, address, city, \
     total, currency, product_name, quantity, status, created_at, confirmed_at, cancelled_at, \
     fulfilled_at, delivered_at, last_msg_sent_at, last_reply_at, confirmation_sent, \
     fulfilled_sent, reply_ack_sent, tracking_number, courier_status, booked_at";

// =============================================================================
// Store implementation
// =============================================================================

#[async_trait]
impl OrderStore for PgStore {
    async fn tenant_by_domain(&self, domain: &str) -> Result<Option<Tenant>, StoreError> {
        let row: Option<TenantRow> = sqlx::query_as(
            "SELECT id, shop_domain, shop_name, created_at FROM tenants WHERE shop_domain = $1",
        )
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Tenant::from))
    }

    async fn tenant(&self, tenant_id: &TenantId) -> Result<Option<Tenant>, StoreError> {
        let row: Option<TenantRow> = sqlx::query_as(
            "SELECT id, shop_domain, shop_name, created_at FROM tenants WHERE id = $1",
        )
        .bind(tenant_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Tenant::from))
    }

    async fn tenant_secrets(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<TenantSecrets>, StoreError> {
        let row: Option<SecretsRow> = sqlx::query_as(
            "SELECT webhook_secret, platform_token, courier_api_key, owner_phone, auto_book, \
             country_code FROM tenants WHERE id = $1",
        )
        .bind(tenant_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TenantSecrets::from))
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, StoreError> {
        let rows: Vec<TenantRow> = sqlx::query_as(
            "SELECT id, shop_domain, shop_name, created_at FROM tenants ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Tenant::from).collect())
    }

    async fn upsert_tenant(
        &self,
        tenant: &Tenant,
        secrets: &TenantSecrets,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO tenants (id, shop_domain, shop_name, webhook_secret, platform_token, \
             courier_api_key, owner_phone, auto_book, country_code, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO UPDATE SET \
             shop_domain = EXCLUDED.shop_domain, shop_name = EXCLUDED.shop_name, \
             webhook_secret = EXCLUDED.webhook_secret, platform_token = EXCLUDED.platform_token, \
             courier_api_key = EXCLUDED.courier_api_key, owner_phone = EXCLUDED.owner_phone, \
             auto_book = EXCLUDED.auto_book, country_code = EXCLUDED.country_code",
        )
        .bind(tenant.id.as_str())
        .bind(&tenant.shop_domain)
        .bind(&tenant.shop_name)
        .bind(secrets.webhook_secret.expose_secret())
        .bind(secrets.platform_token.expose_secret())
        .bind(secrets.courier_api_key.expose_secret())
        .bind(secrets.owner_phone.as_ref().map(Phone::as_str))
        .bind(secrets.auto_book)
        .bind(&secrets.country_code)
        .bind(tenant.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_order(&self, tenant_id: &TenantId, order: &Order) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO orders (tenant_id, order_id, order_name, customer_name, phone, address, \
             city, total, currency, product_name, quantity, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (tenant_id, order_id) DO NOTHING",
        )
        .bind(tenant_id.as_str())
        .bind(order.id.as_str())
        .bind(&order.name)
        .bind(&order.customer.name)
        .bind(order.customer.phone.as_ref().map(Phone::as_str))
        .bind(order.customer.address.as_deref())
        .bind(order.customer.city.as_deref())
        .bind(order.amount.amount)
        .bind(&order.amount.currency)
        .bind(&order.product.name)
        .bind(i32::try_from(order.product.quantity).unwrap_or(i32::MAX))
        .bind(order.status.to_string())
        .bind(order.timeline.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_order(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
    ) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE tenant_id = $1 AND order_id = $2"
        ))
        .bind(tenant_id.as_str())
        .bind(order_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn find_latest_by_phone(
        &self,
        phone: &Phone,
    ) -> Result<Option<(TenantId, Order)>, StoreError> {
        // The expensive fallback path (spans all tenants). GREATEST ignores
        // a NULL last_msg_sent_at and falls back to created_at.
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE phone = $1 \
             ORDER BY GREATEST(last_msg_sent_at, created_at) DESC, created_at DESC LIMIT 1"
        ))
        .bind(phone.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let tenant_id = TenantId::new(r.tenant_id.clone());
            Order::try_from(r).map(|order| (tenant_id, order))
        })
        .transpose()
    }

    async fn list_trackable(&self, tenant_id: &TenantId) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE tenant_id = $1 \
             AND tracking_number IS NOT NULL AND status NOT IN ('cancelled', 'delivered') \
             ORDER BY created_at"
        ))
        .bind(tenant_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn mark_confirmed(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET status = 'confirmed', confirmed_at = $3 \
             WHERE tenant_id = $1 AND order_id = $2 AND status = 'pending'",
        )
        .bind(tenant_id.as_str())
        .bind(order_id.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_cancelled(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET status = 'cancelled', cancelled_at = $3 \
             WHERE tenant_id = $1 AND order_id = $2 AND status = 'pending'",
        )
        .bind(tenant_id.as_str())
        .bind(order_id.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_fulfilled(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET status = 'fulfilled', fulfilled_at = $3 \
             WHERE tenant_id = $1 AND order_id = $2 AND status IN ('pending', 'confirmed')",
        )
        .bind(tenant_id.as_str())
        .bind(order_id.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_out_for_delivery(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        courier_status: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET status = 'out_for_delivery', courier_status = $3 \
             WHERE tenant_id = $1 AND order_id = $2 \
             AND status IN ('pending', 'confirmed', 'fulfilled')",
        )
        .bind(tenant_id.as_str())
        .bind(order_id.as_str())
        .bind(courier_status)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_delivered(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        courier_status: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET status = 'delivered', delivered_at = $3, courier_status = $4 \
             WHERE tenant_id = $1 AND order_id = $2 \
             AND status NOT IN ('cancelled', 'delivered')",
        )
        .bind(tenant_id.as_str())
        .bind(order_id.as_str())
        .bind(at)
        .bind(courier_status)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_courier_booking(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        tracking: &TrackingNumber,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET tracking_number = $3, booked_at = $4 \
             WHERE tenant_id = $1 AND order_id = $2 AND tracking_number IS NULL",
        )
        .bind(tenant_id.as_str())
        .bind(order_id.as_str())
        .bind(tracking.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_courier_status(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        courier_status: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE orders SET courier_status = $3 WHERE tenant_id = $1 AND order_id = $2",
        )
        .bind(tenant_id.as_str())
        .bind(order_id.as_str())
        .bind(courier_status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_notification_sent(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        kind: NotificationKind,
    ) -> Result<(), StoreError> {
        let sql = match kind {
            NotificationKind::Confirmation => {
                "UPDATE orders SET confirmation_sent = TRUE WHERE tenant_id = $1 AND order_id = $2"
            }
            NotificationKind::Fulfilled => {
                "UPDATE orders SET fulfilled_sent = TRUE WHERE tenant_id = $1 AND order_id = $2"
            }
            NotificationKind::ReplyAck => {
                "UPDATE orders SET reply_ack_sent = TRUE WHERE tenant_id = $1 AND order_id = $2"
            }
        };

        sqlx::query(sql)
            .bind(tenant_id.as_str())
            .bind(order_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn touch_last_msg_sent(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE orders SET last_msg_sent_at = $3 WHERE tenant_id = $1 AND order_id = $2",
        )
        .bind(tenant_id.as_str())
        .bind(order_id.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn touch_last_reply(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE orders SET last_reply_at = $3 WHERE tenant_id = $1 AND order_id = $2")
            .bind(tenant_id.as_str())
            .bind(order_id.as_str())
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn record_dead_letter(&self, letter: &DeadLetter) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO dead_letters (id, tenant_id, order_id, effect, error, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(letter.id)
        .bind(letter.tenant_id.as_str())
        .bind(letter.order_id.as_ref().map(OrderId::as_str))
        .bind(&letter.effect)
        .bind(&letter.error)
        .bind(letter.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
