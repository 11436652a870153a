//! In-memory implementation of the order store.
//!
//! Used by the test suites and for local development without a database.
//! Semantics mirror the `PostgreSQL` implementation: guarded transitions
//! re-check their precondition under the lock and report whether the write
//! landed.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use orderloop_core::{
    NotificationKind, Order, OrderId, OrderStatus, Phone, Tenant, TenantId, TenantSecrets,
    TrackingNumber,
};

use super::{DeadLetter, OrderStore, StoreError};

#[derive(Default)]
struct Inner {
    tenants: BTreeMap<TenantId, TenantEntry>,
    dead_letters: Vec<DeadLetter>,
}

struct TenantEntry {
    tenant: Tenant,
    secrets: TenantSecrets,
    orders: BTreeMap<OrderId, Order>,
}

/// In-memory store behind a single `RwLock`.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Dead letters recorded so far (test observability).
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.read().await.dead_letters.clone()
    }
}

impl Inner {
    fn order_mut(
        &mut self,
        tenant_id: &TenantId,
        order_id: &OrderId,
    ) -> Result<&mut Order, StoreError> {
        self.tenants
            .get_mut(tenant_id)
            .and_then(|t| t.orders.get_mut(order_id))
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn tenant_by_domain(&self, domain: &str) -> Result<Option<Tenant>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .tenants
            .values()
            .find(|e| e.tenant.shop_domain == domain)
            .map(|e| e.tenant.clone()))
    }

    async fn tenant(&self, tenant_id: &TenantId) -> Result<Option<Tenant>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.tenants.get(tenant_id).map(|e| e.tenant.clone()))
    }

    async fn tenant_secrets(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<TenantSecrets>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.tenants.get(tenant_id).map(|e| e.secrets.clone()))
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.tenants.values().map(|e| e.tenant.clone()).collect())
    }

    async fn upsert_tenant(
        &self,
        tenant: &Tenant,
        secrets: &TenantSecrets,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let orders = inner
            .tenants
            .remove(&tenant.id)
            .map(|e| e.orders)
            .unwrap_or_default();
        inner.tenants.insert(
            tenant.id.clone(),
            TenantEntry {
                tenant: tenant.clone(),
                secrets: secrets.clone(),
                orders,
            },
        );
        Ok(())
    }

    async fn insert_order(&self, tenant_id: &TenantId, order: &Order) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let entry = inner.tenants.get_mut(tenant_id).ok_or(StoreError::NotFound)?;
        if entry.orders.contains_key(&order.id) {
            return Ok(false);
        }
        entry.orders.insert(order.id.clone(), order.clone());
        Ok(true)
    }

    async fn get_order(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
    ) -> Result<Option<Order>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .tenants
            .get(tenant_id)
            .and_then(|e| e.orders.get(order_id))
            .cloned())
    }

    async fn find_latest_by_phone(
        &self,
        phone: &Phone,
    ) -> Result<Option<(TenantId, Order)>, StoreError> {
        // Deliberately the linear scan across every tenant's orders - this is
        // the expensive last-resort path.
        let inner = self.inner.read().await;
        let mut best: Option<(TenantId, Order)> = None;
        for (tenant_id, entry) in &inner.tenants {
            for order in entry.orders.values() {
                if order.customer.phone.as_ref() != Some(phone) {
                    continue;
                }
                let candidate_key = recency_key(order);
                let replace = best
                    .as_ref()
                    .is_none_or(|(_, current)| candidate_key > recency_key(current));
                if replace {
                    best = Some((tenant_id.clone(), order.clone()));
                }
            }
        }
        Ok(best)
    }

    async fn list_trackable(&self, tenant_id: &TenantId) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .tenants
            .get(tenant_id)
            .map(|e| {
                e.orders
                    .values()
                    .filter(|o| o.courier.tracking_number.is_some() && !o.status.is_terminal())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn mark_confirmed(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let order = inner.order_mut(tenant_id, order_id)?;
        if order.status != OrderStatus::Pending {
            return Ok(false);
        }
        order.status = OrderStatus::Confirmed;
        order.timeline.confirmed_at = Some(at);
        Ok(true)
    }

    async fn mark_cancelled(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let order = inner.order_mut(tenant_id, order_id)?;
        if order.status != OrderStatus::Pending {
            return Ok(false);
        }
        order.status = OrderStatus::Cancelled;
        order.timeline.cancelled_at = Some(at);
        Ok(true)
    }

    async fn mark_fulfilled(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let order = inner.order_mut(tenant_id, order_id)?;
        if !matches!(order.status, OrderStatus::Pending | OrderStatus::Confirmed) {
            return Ok(false);
        }
        order.status = OrderStatus::Fulfilled;
        order.timeline.fulfilled_at = Some(at);
        Ok(true)
    }

    async fn mark_out_for_delivery(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        courier_status: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let order = inner.order_mut(tenant_id, order_id)?;
        if !matches!(
            order.status,
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Fulfilled
        ) {
            return Ok(false);
        }
        order.status = OrderStatus::OutForDelivery;
        order.courier.last_status = Some(courier_status.to_owned());
        Ok(true)
    }

    async fn mark_delivered(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        courier_status: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let order = inner.order_mut(tenant_id, order_id)?;
        if order.status.is_terminal() {
            return Ok(false);
        }
        order.status = OrderStatus::Delivered;
        order.timeline.delivered_at = Some(at);
        order.courier.last_status = Some(courier_status.to_owned());
        Ok(true)
    }

    async fn set_courier_booking(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        tracking: &TrackingNumber,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let order = inner.order_mut(tenant_id, order_id)?;
        if order.courier.tracking_number.is_some() {
            return Ok(false);
        }
        order.courier.tracking_number = Some(tracking.clone());
        order.courier.booked_at = Some(at);
        Ok(true)
    }

    async fn set_courier_status(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        courier_status: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let order = inner.order_mut(tenant_id, order_id)?;
        order.courier.last_status = Some(courier_status.to_owned());
        Ok(())
    }

    async fn set_notification_sent(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        kind: NotificationKind,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let order = inner.order_mut(tenant_id, order_id)?;
        order.flags.mark_sent(kind);
        Ok(())
    }

    async fn touch_last_msg_sent(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let order = inner.order_mut(tenant_id, order_id)?;
        order.timeline.last_msg_sent_at = Some(at);
        Ok(())
    }

    async fn touch_last_reply(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let order = inner.order_mut(tenant_id, order_id)?;
        order.timeline.last_reply_at = Some(at);
        Ok(())
    }

    async fn record_dead_letter(&self, letter: &DeadLetter) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.dead_letters.push(letter.clone());
        Ok(())
    }
}

/// Recency ordering for the fallback lookup: greatest of
/// (`last_msg_sent_at`, `created_at`), ties broken by `created_at`.
fn recency_key(order: &Order) -> (DateTime<Utc>, DateTime<Utc>) {
    let created = order.timeline.created_at;
    let last_msg = order.timeline.last_msg_sent_at.unwrap_or(created);
    (last_msg.max(created), created)
}
