//! Commerce webhook handlers: order created, fulfillment.
//!
//! Bodies arrive as raw strings and stay raw until the signature is
//! verified. The handler acks with 200 before processing: webhook retries
//! are the platform's job, recovery is the poller's.

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use tracing::{info, instrument, warn};

use orderloop_core::{Event, Tenant, TenantSecrets};

use crate::ingest;
use crate::state::AppState;

/// Header carrying the tenant-identifying storefront domain.
const SHOP_DOMAIN_HEADER: &str = "X-Shopify-Shop-Domain";
/// Header carrying the base64 HMAC-SHA256 of the raw body.
const SIGNATURE_HEADER: &str = "X-Shopify-Hmac-Sha256";

/// Create commerce webhook routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhooks/shopify/orders", post(handle_order_created))
        .route("/webhooks/shopify/fulfillments", post(handle_fulfillment))
}

/// POST /webhooks/shopify/orders - new order webhook.
#[instrument(skip(state, headers, body))]
async fn handle_order_created(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    spawn_processing(state, headers, body, |state, tenant, secrets, body| async move {
        let draft = match ingest::parse_order_draft(&body, &secrets.country_code) {
            Ok(draft) => draft,
            Err(e) => {
                warn!(tenant = %tenant.id, error = %e, "Dropping malformed order payload");
                return;
            }
        };

        let event = Event::OrderCreated {
            tenant_id: tenant.id.clone(),
            draft,
        };
        if let Err(e) = state.lifecycle().handle(event).await {
            warn!(tenant = %tenant.id, error = %e, "Order-created processing failed");
        }
    });

    StatusCode::OK
}

/// POST /webhooks/shopify/fulfillments - fulfillment webhook.
///
/// Only a status of `"fulfilled"` advances state.
#[instrument(skip(state, headers, body))]
async fn handle_fulfillment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    spawn_processing(state, headers, body, |state, tenant, _secrets, body| async move {
        let payload = match ingest::parse_fulfillment(&body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(tenant = %tenant.id, error = %e, "Dropping malformed fulfillment payload");
                return;
            }
        };

        if !payload.is_fulfilled() {
            info!(tenant = %tenant.id, status = %payload.status, "Ignoring non-fulfilled status");
            return;
        }

        let event = Event::FulfillmentReported {
            tenant_id: tenant.id.clone(),
            order_id: payload.order_id(),
        };
        if let Err(e) = state.lifecycle().handle(event).await {
            warn!(tenant = %tenant.id, error = %e, "Fulfillment processing failed");
        }
    });

    StatusCode::OK
}

/// Common pre-processing for commerce webhooks, run after the ack: resolve
/// the tenant from the domain header, load its secrets fresh, verify the
/// signature over the raw body, then hand off.
fn spawn_processing<F, Fut>(state: AppState, headers: HeaderMap, body: String, process: F)
where
    F: FnOnce(AppState, Tenant, TenantSecrets, String) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let Some(domain) = header_str(&headers, SHOP_DOMAIN_HEADER) else {
            warn!("Webhook missing shop domain header, dropping");
            return;
        };
        let Some(signature) = header_str(&headers, SIGNATURE_HEADER) else {
            warn!(domain, "Webhook missing signature header, dropping");
            return;
        };

        let tenant = match state.registry().resolve_by_domain(&domain).await {
            Ok(Some(tenant)) => tenant,
            Ok(None) => {
                warn!(domain, "Webhook from unknown tenant, dropping");
                return;
            }
            Err(e) => {
                warn!(domain, error = %e, "Tenant lookup failed, dropping");
                return;
            }
        };

        let secrets = match state.registry().secrets(&tenant.id).await {
            Ok(Some(secrets)) => secrets,
            Ok(None) => {
                warn!(tenant = %tenant.id, "Tenant has no secrets, dropping");
                return;
            }
            Err(e) => {
                warn!(tenant = %tenant.id, error = %e, "Secret load failed, dropping");
                return;
            }
        };

        // Verification runs over the exact raw bytes we received.
        if ingest::verify_webhook_signature(&secrets.webhook_secret, body.as_bytes(), &signature)
            .is_err()
        {
            warn!(
                tenant = %tenant.id,
                security = true,
                "Webhook signature mismatch, dropping"
            );
            return;
        }

        process(state, tenant, secrets, body).await;
    });
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}
