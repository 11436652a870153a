//! The order lifecycle engine.
//!
//! Authoritative transition logic: given a canonical event and the current
//! order, compute the next state and perform the side effects. Transitions
//! are narrow and idempotent - every guarded store write re-checks its
//! precondition, so a write whose precondition no longer holds is a no-op,
//! not a correctness violation.
//!
//! Side effects run sequentially *after* the transition is computed and are
//! not transactional: a later failure never rolls back an earlier step. Each
//! external call is isolated - logged, dead-lettered, and the remaining
//! effects of the same event still run. The order-of-record state change is
//! never undone because a notification failed to reach the customer.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use orderloop_core::{
    CourierStage, CustomerReply, Event, NotificationKind, Order, OrderDraft, OrderId, OrderStatus,
    Phone, ReplyAction, Tenant, TenantId, TenantSecrets,
};

use crate::courier::CourierGateway;
use crate::registry::TenantRegistry;
use crate::shopify::PlatformGateway;
use crate::store::{DeadLetter, OrderStore, StoreError};
use crate::whatsapp::{self, TemplateSender, TemplateSpec};

/// Errors the engine cannot recover from locally.
///
/// Only store failures propagate; external-call failures are swallowed at
/// the side-effect boundary per the availability-over-errors policy.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The order state machine and its side-effect drivers.
///
/// Every collaborator is a trait object so tests inject fakes.
pub struct Lifecycle {
    store: Arc<dyn OrderStore>,
    registry: TenantRegistry,
    sender: Arc<dyn TemplateSender>,
    courier: Arc<dyn CourierGateway>,
    platform: Arc<dyn PlatformGateway>,
}

impl Lifecycle {
    #[must_use]
    pub fn new(
        store: Arc<dyn OrderStore>,
        sender: Arc<dyn TemplateSender>,
        courier: Arc<dyn CourierGateway>,
        platform: Arc<dyn PlatformGateway>,
    ) -> Self {
        Self {
            registry: TenantRegistry::new(Arc::clone(&store)),
            store,
            sender,
            courier,
            platform,
        }
    }

    /// Feed one canonical event through the machine.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] only for store failures; everything else
    /// is recovered at the side-effect boundary.
    pub async fn handle(&self, event: Event) -> Result<(), LifecycleError> {
        match event {
            Event::OrderCreated { tenant_id, draft } => {
                self.handle_order_created(&tenant_id, draft).await
            }
            Event::CustomerReplied(reply) => self.handle_customer_reply(reply).await,
            Event::FulfillmentReported {
                tenant_id,
                order_id,
            } => self.handle_fulfillment(&tenant_id, &order_id).await,
            Event::CourierStatusObserved {
                tenant_id,
                order_id,
                status,
            } => {
                self.handle_courier_status(&tenant_id, &order_id, &status)
                    .await
            }
        }
    }

    // =========================================================================
    // Order created
    // =========================================================================

    #[instrument(skip(self, draft), fields(tenant = %tenant_id, order = %draft.id))]
    async fn handle_order_created(
        &self,
        tenant_id: &TenantId,
        draft: OrderDraft,
    ) -> Result<(), LifecycleError> {
        let Some(tenant) = self.registry.tenant(tenant_id).await? else {
            warn!("Order created for unknown tenant, dropping");
            return Ok(());
        };

        let order_id = draft.id.clone();
        let order = Order::from_draft(draft, Utc::now());

        let inserted = self.store.insert_order(tenant_id, &order).await?;
        let order = if inserted {
            info!("Order created");
            order
        } else {
            // At-least-once webhook delivery: the order already exists. Fall
            // through so an earlier failed confirmation send gets retried,
            // bounded by the confirmation_sent flag.
            debug!("Order already exists, treating as redelivery");
            match self.store.get_order(tenant_id, &order_id).await? {
                Some(existing) => existing,
                None => return Ok(()),
            }
        };

        if order.flags.already_sent(NotificationKind::Confirmation) {
            debug!("Confirmation already sent, nothing to do");
            return Ok(());
        }

        let Some(phone) = order.customer.phone.clone() else {
            warn!("Order has no phone, cannot start confirmation conversation");
            return Ok(());
        };

        let spec = whatsapp::order_confirmation(&order, &tenant.shop_name, tenant_id);
        if self
            .send_template(tenant_id, &order_id, &phone, &spec)
            .await
        {
            self.store
                .set_notification_sent(tenant_id, &order_id, NotificationKind::Confirmation)
                .await?;
            self.store
                .touch_last_msg_sent(tenant_id, &order_id, Utc::now())
                .await?;
        }

        Ok(())
    }

    // =========================================================================
    // Customer reply
    // =========================================================================

    #[instrument(skip(self, reply))]
    async fn handle_customer_reply(&self, reply: CustomerReply) -> Result<(), LifecycleError> {
        let Some((tenant_id, order)) = self.match_reply_to_order(&reply).await? else {
            warn!(phone = ?reply.phone, "Reply matched no order, dropping");
            return Ok(());
        };

        self.store
            .touch_last_reply(&tenant_id, &order.id, Utc::now())
            .await?;

        let Some(tenant) = self.registry.tenant(&tenant_id).await? else {
            warn!(tenant = %tenant_id, "Matched order under unknown tenant, dropping");
            return Ok(());
        };
        let Some(secrets) = self.registry.secrets(&tenant_id).await? else {
            warn!(tenant = %tenant_id, "Tenant has no secrets, dropping");
            return Ok(());
        };

        if order.status != OrderStatus::Pending {
            // Already decided (or further along): restate, change nothing.
            // This is the idempotent branch for repeated button taps.
            debug!(status = %order.status, "Reply to non-pending order, restating status");
            self.restate_status(&tenant, &order).await;
            return Ok(());
        }

        match reply.action {
            ReplyAction::Confirm => self.confirm_order(&tenant, &secrets, &order).await,
            ReplyAction::Cancel => self.cancel_order(&tenant, &secrets, &order).await,
            ReplyAction::Unknown => {
                // Free text against a pending order: nudge towards the
                // buttons, no state change.
                debug!("Free-text reply to pending order, sending help");
                if let Some(phone) = order.customer.phone.clone() {
                    let spec = whatsapp::reply_help(&order, &tenant.shop_name);
                    if self
                        .send_template(&tenant.id, &order.id, &phone, &spec)
                        .await
                    {
                        self.store
                            .touch_last_msg_sent(&tenant.id, &order.id, Utc::now())
                            .await?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Match a reply to its order: fast path via the round-tripped
    /// `(tenant, order)` reference, falling back to the most-recent-order-
    /// by-phone scan across all tenants.
    async fn match_reply_to_order(
        &self,
        reply: &CustomerReply,
    ) -> Result<Option<(TenantId, Order)>, LifecycleError> {
        if let Some(order_ref) = &reply.order_ref {
            if let Some(order) = self
                .store
                .get_order(&order_ref.tenant_id, &order_ref.order_id)
                .await?
            {
                return Ok(Some((order_ref.tenant_id.clone(), order)));
            }
            debug!(
                tenant = %order_ref.tenant_id,
                order = %order_ref.order_id,
                "Embedded order reference did not resolve"
            );
        }

        let Some(phone) = &reply.phone else {
            return Ok(None);
        };

        // The expensive path: O(total orders across all tenants). Only for
        // clients that didn't preserve the button payload.
        warn!(phone = %phone, "Falling back to phone scan for reply matching");
        Ok(self.store.find_latest_by_phone(phone).await?)
    }

    async fn confirm_order(
        &self,
        tenant: &Tenant,
        secrets: &TenantSecrets,
        order: &Order,
    ) -> Result<(), LifecycleError> {
        let landed = self
            .store
            .mark_confirmed(&tenant.id, &order.id, Utc::now())
            .await?;
        if !landed {
            // Raced with another transition; re-read and restate.
            debug!("Confirm precondition no longer holds, restating");
            if let Some(current) = self.store.get_order(&tenant.id, &order.id).await? {
                self.restate_status(tenant, &current).await;
            }
            return Ok(());
        }

        info!(tenant = %tenant.id, order = %order.id, "Order confirmed");

        // Effects in order: platform note, courier booking, customer reply,
        // owner heads-up. Each isolated - a failure never aborts the rest.
        self.record_platform_note(tenant, secrets, &order.id, "Order confirmed by customer over WhatsApp")
            .await;

        if secrets.auto_book && order.courier.tracking_number.is_none() {
            self.book_courier(tenant, secrets, order).await?;
        }

        let already_acked = order.flags.already_sent(NotificationKind::ReplyAck);
        if let Some(phone) = order.customer.phone.clone() {
            if already_acked {
                debug!("Reply acknowledgment already sent");
            } else {
                let confirmed = Order {
                    status: OrderStatus::Confirmed,
                    ..order.clone()
                };
                let spec = whatsapp::confirmed_reply(&confirmed, &tenant.shop_name);
                if self
                    .send_template(&tenant.id, &order.id, &phone, &spec)
                    .await
                {
                    self.store
                        .set_notification_sent(&tenant.id, &order.id, NotificationKind::ReplyAck)
                        .await?;
                    self.store
                        .touch_last_msg_sent(&tenant.id, &order.id, Utc::now())
                        .await?;
                }
            }
        }

        self.notify_owner(tenant, secrets, order, OrderStatus::Confirmed)
            .await;

        Ok(())
    }

    async fn cancel_order(
        &self,
        tenant: &Tenant,
        secrets: &TenantSecrets,
        order: &Order,
    ) -> Result<(), LifecycleError> {
        let landed = self
            .store
            .mark_cancelled(&tenant.id, &order.id, Utc::now())
            .await?;
        if !landed {
            debug!("Cancel precondition no longer holds, restating");
            if let Some(current) = self.store.get_order(&tenant.id, &order.id).await? {
                self.restate_status(tenant, &current).await;
            }
            return Ok(());
        }

        info!(tenant = %tenant.id, order = %order.id, "Order cancelled");

        self.record_platform_note(tenant, secrets, &order.id, "Order cancelled by customer over WhatsApp")
            .await;

        if let Some(phone) = order.customer.phone.clone() {
            if order.flags.already_sent(NotificationKind::ReplyAck) {
                debug!("Reply acknowledgment already sent");
            } else {
                let cancelled = Order {
                    status: OrderStatus::Cancelled,
                    ..order.clone()
                };
                let spec = whatsapp::cancelled_reply(&cancelled, &tenant.shop_name);
                if self
                    .send_template(&tenant.id, &order.id, &phone, &spec)
                    .await
                {
                    self.store
                        .set_notification_sent(&tenant.id, &order.id, NotificationKind::ReplyAck)
                        .await?;
                    self.store
                        .touch_last_msg_sent(&tenant.id, &order.id, Utc::now())
                        .await?;
                }
            }
        }

        self.notify_owner(tenant, secrets, order, OrderStatus::Cancelled)
            .await;

        Ok(())
    }

    // =========================================================================
    // Fulfillment reported
    // =========================================================================

    #[instrument(skip(self), fields(tenant = %tenant_id, order = %order_id))]
    async fn handle_fulfillment(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
    ) -> Result<(), LifecycleError> {
        let Some(order) = self.store.get_order(tenant_id, order_id).await? else {
            warn!("Fulfillment for unknown order, dropping");
            return Ok(());
        };
        let Some(tenant) = self.registry.tenant(tenant_id).await? else {
            warn!("Fulfillment for unknown tenant, dropping");
            return Ok(());
        };

        let landed = self
            .store
            .mark_fulfilled(tenant_id, order_id, Utc::now())
            .await?;
        if !landed {
            debug!(status = %order.status, "Fulfillment is a no-op from current status");
            return Ok(());
        }

        info!("Order fulfilled");

        let fulfilled = Order {
            status: OrderStatus::Fulfilled,
            ..order
        };
        self.send_shipped_notice(&tenant, &fulfilled).await?;

        Ok(())
    }

    // =========================================================================
    // Courier status observed
    // =========================================================================

    #[instrument(skip(self), fields(tenant = %tenant_id, order = %order_id, status = %observed))]
    async fn handle_courier_status(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        observed: &str,
    ) -> Result<(), LifecycleError> {
        let Some(order) = self.store.get_order(tenant_id, order_id).await? else {
            warn!("Courier status for unknown order, dropping");
            return Ok(());
        };

        if order.status == OrderStatus::Delivered {
            return Ok(());
        }

        let unchanged = order.courier.last_status.as_deref() == Some(observed);

        match CourierStage::classify(observed) {
            CourierStage::OutForDelivery => {
                if unchanged {
                    debug!("Courier status unchanged, nothing to do");
                    return Ok(());
                }
                let landed = self
                    .store
                    .mark_out_for_delivery(tenant_id, order_id, observed)
                    .await?;
                if !landed {
                    debug!("Out-for-delivery write lost its race, skipping effects");
                    return Ok(());
                }
                info!("Order out for delivery");
                if let Some(tenant) = self.registry.tenant(tenant_id).await? {
                    let moving = Order {
                        status: OrderStatus::OutForDelivery,
                        ..order
                    };
                    self.send_shipped_notice(&tenant, &moving).await?;
                }
            }
            CourierStage::Delivered => {
                let landed = self
                    .store
                    .mark_delivered(tenant_id, order_id, observed, Utc::now())
                    .await?;
                if !landed {
                    debug!("Delivered write lost its race, skipping effects");
                    return Ok(());
                }
                info!("Order delivered");
                if let Some(tenant) = self.registry.tenant(tenant_id).await? {
                    if let Some(phone) = order.customer.phone.clone() {
                        let spec = whatsapp::delivered_notice(&order, &tenant.shop_name);
                        if self.send_template(tenant_id, order_id, &phone, &spec).await {
                            self.store
                                .touch_last_msg_sent(tenant_id, order_id, Utc::now())
                                .await?;
                        }
                    }
                }
            }
            CourierStage::Other(_) => {
                if !unchanged {
                    // Record it so the poller's change detector converges; no
                    // order transition, no notification.
                    debug!("Recording intermediate courier status");
                    self.store
                        .set_courier_status(tenant_id, order_id, observed)
                        .await?;
                }
            }
        }

        Ok(())
    }

    // =========================================================================
    // Side-effect helpers (isolated failures)
    // =========================================================================

    /// Send a template; on failure log, dead-letter, and report `false`.
    async fn send_template(
        &self,
        tenant_id: &TenantId,
        order_id: &OrderId,
        phone: &Phone,
        spec: &TemplateSpec,
    ) -> bool {
        match self.sender.send_template(phone, spec).await {
            Ok(()) => true,
            Err(e) => {
                self.dead_letter(tenant_id, Some(order_id), &format!("send_template:{}", spec.name), &e)
                    .await;
                false
            }
        }
    }

    /// Shipped notice for fulfillment and out-for-delivery, gated by the
    /// fulfilled flag so the customer hears about shipment once.
    async fn send_shipped_notice(
        &self,
        tenant: &Tenant,
        order: &Order,
    ) -> Result<(), LifecycleError> {
        if order.flags.already_sent(NotificationKind::Fulfilled) {
            debug!("Shipped notice already sent");
            return Ok(());
        }
        let Some(phone) = order.customer.phone.clone() else {
            return Ok(());
        };

        let tracking_url = order
            .courier
            .tracking_number
            .as_ref()
            .and_then(|tn| self.courier.tracking_url(tn));
        let spec = whatsapp::shipped_notice(order, &tenant.shop_name, tracking_url);
        if self
            .send_template(&tenant.id, &order.id, &phone, &spec)
            .await
        {
            self.store
                .set_notification_sent(&tenant.id, &order.id, NotificationKind::Fulfilled)
                .await?;
            self.store
                .touch_last_msg_sent(&tenant.id, &order.id, Utc::now())
                .await?;
        }
        Ok(())
    }

    /// Restate current status to the customer; pure side effect, no writes.
    async fn restate_status(&self, tenant: &Tenant, order: &Order) {
        if let Some(phone) = order.customer.phone.clone() {
            let spec = whatsapp::status_restatement(order, &tenant.shop_name);
            self.send_template(&tenant.id, &order.id, &phone, &spec)
                .await;
        }
    }

    /// Append the decision trail to the platform order, best-effort.
    async fn record_platform_note(
        &self,
        tenant: &Tenant,
        secrets: &TenantSecrets,
        order_id: &OrderId,
        note: &str,
    ) {
        if let Err(e) = self
            .platform
            .update_order_note(&tenant.shop_domain, &secrets.platform_token, order_id, note)
            .await
        {
            self.dead_letter(&tenant.id, Some(order_id), "platform_note", &e)
                .await;
        }
    }

    /// Book the courier once; a failure returns without mutating anything.
    async fn book_courier(
        &self,
        tenant: &Tenant,
        secrets: &TenantSecrets,
        order: &Order,
    ) -> Result<(), LifecycleError> {
        match self.courier.book(order, &secrets.courier_api_key).await {
            Ok(tracking) => {
                let recorded = self
                    .store
                    .set_courier_booking(&tenant.id, &order.id, &tracking, Utc::now())
                    .await?;
                if recorded {
                    info!(tenant = %tenant.id, order = %order.id, tracking = %tracking, "Shipment booked");
                } else {
                    debug!("Tracking number already present, keeping the existing booking");
                }
            }
            Err(e) => {
                self.dead_letter(&tenant.id, Some(&order.id), "courier_book", &e)
                    .await;
            }
        }
        Ok(())
    }

    /// Fire-and-forget heads-up to the store owner.
    async fn notify_owner(
        &self,
        tenant: &Tenant,
        secrets: &TenantSecrets,
        order: &Order,
        decided: OrderStatus,
    ) {
        let Some(owner_phone) = &secrets.owner_phone else {
            return;
        };
        let body = whatsapp::owner_heads_up(order, decided);
        if let Err(e) = self.sender.send_text(owner_phone, &body).await {
            self.dead_letter(&tenant.id, Some(&order.id), "owner_heads_up", &e)
                .await;
        }
    }

    /// Log and record a swallowed side-effect failure. A failure to record
    /// the record itself is only logged - there is nowhere left to put it.
    async fn dead_letter(
        &self,
        tenant_id: &TenantId,
        order_id: Option<&OrderId>,
        effect: &str,
        error: &(dyn std::fmt::Display + Send + Sync),
    ) {
        tracing::error!(tenant = %tenant_id, effect, %error, "Side effect failed");
        let letter = DeadLetter::new(tenant_id, order_id, effect, error);
        if let Err(store_err) = self.store.record_dead_letter(&letter).await {
            tracing::error!(%store_err, "Failed to record dead letter");
        }
    }
}
