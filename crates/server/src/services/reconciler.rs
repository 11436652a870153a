//! Reconciliation poller.
//!
//! The system's sole recovery mechanism for missed courier updates: a single
//! periodic sweep over every tenant's in-flight shipments that queries the
//! courier and feeds changed statuses back into the lifecycle engine as
//! `CourierStatusObserved` events. The sweep is awaited inside the tick loop
//! so runs never overlap - overlapping runs against the same tenant would
//! risk duplicate notification sends.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use orderloop_core::{Event, Order, Tenant, TenantSecrets};

use crate::courier::CourierGateway;
use crate::store::{DeadLetter, OrderStore};

use super::lifecycle::Lifecycle;

/// Periodic courier-status reconciliation.
pub struct Reconciler {
    store: Arc<dyn OrderStore>,
    courier: Arc<dyn CourierGateway>,
    lifecycle: Arc<Lifecycle>,
    period: Duration,
}

impl Reconciler {
    #[must_use]
    pub fn new(
        store: Arc<dyn OrderStore>,
        courier: Arc<dyn CourierGateway>,
        lifecycle: Arc<Lifecycle>,
        period: Duration,
    ) -> Self {
        Self {
            store,
            courier,
            lifecycle,
            period,
        }
    }

    /// Run the poller until the task is dropped.
    ///
    /// Ticks that come due while a sweep is still running are delayed, not
    /// stacked - there is never more than one sweep in flight.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(period_secs = self.period.as_secs(), "Reconciliation poller started");

        loop {
            interval.tick().await;
            self.sweep().await;
        }
    }

    /// One full sweep over all tenants. Public so tests can drive ticks
    /// deterministically.
    #[instrument(skip(self))]
    pub async fn sweep(&self) {
        let tenants = match self.store.list_tenants().await {
            Ok(tenants) => tenants,
            Err(e) => {
                warn!(error = %e, "Sweep aborted: cannot list tenants");
                return;
            }
        };

        for tenant in tenants {
            // Secrets are read fresh each sweep, never cached across runs.
            let secrets = match self.store.tenant_secrets(&tenant.id).await {
                Ok(Some(secrets)) => secrets,
                Ok(None) => {
                    warn!(tenant = %tenant.id, "Tenant has no secrets, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(tenant = %tenant.id, error = %e, "Failed to load secrets, skipping tenant");
                    continue;
                }
            };

            let orders = match self.store.list_trackable(&tenant.id).await {
                Ok(orders) => orders,
                Err(e) => {
                    warn!(tenant = %tenant.id, error = %e, "Failed to list orders, skipping tenant");
                    continue;
                }
            };

            for order in orders {
                // A failure for one order must not abort the rest of the sweep.
                self.reconcile_order(&tenant, &secrets, &order).await;
            }
        }
    }

    async fn reconcile_order(&self, tenant: &Tenant, secrets: &TenantSecrets, order: &Order) {
        let Some(tracking) = &order.courier.tracking_number else {
            return;
        };

        let observed = match self.courier.status(tracking, &secrets.courier_api_key).await {
            Ok(Some(status)) => status,
            Ok(None) => {
                debug!(tenant = %tenant.id, order = %order.id, "Courier doesn't know this shipment yet");
                return;
            }
            Err(e) => {
                warn!(tenant = %tenant.id, order = %order.id, error = %e, "Courier query failed");
                let letter = DeadLetter::new(&tenant.id, Some(&order.id), "courier_status", &e);
                if let Err(store_err) = self.store.record_dead_letter(&letter).await {
                    warn!(%store_err, "Failed to record dead letter");
                }
                return;
            }
        };

        if order.courier.last_status.as_deref() == Some(observed.as_str()) {
            return;
        }

        debug!(
            tenant = %tenant.id,
            order = %order.id,
            from = ?order.courier.last_status,
            to = %observed,
            "Courier status changed"
        );

        let event = Event::CourierStatusObserved {
            tenant_id: tenant.id.clone(),
            order_id: order.id.clone(),
            status: observed,
        };
        if let Err(e) = self.lifecycle.handle(event).await {
            warn!(tenant = %tenant.id, order = %order.id, error = %e, "Reconcile failed for order");
        }
    }
}
