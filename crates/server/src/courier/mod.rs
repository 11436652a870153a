//! Courier REST API integration.
//!
//! Books shipments for confirmed orders and answers status queries for the
//! reconciliation poller. The API key is per-tenant; only the endpoint is
//! process-wide.
//!
//! Booking is attempted at most once per order - callers check for an
//! existing tracking number first, and a failed booking mutates nothing.

mod client;

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

use orderloop_core::{Order, TrackingNumber};

pub use client::CourierClient;

/// Errors that can occur when interacting with the courier API.
#[derive(Debug, Error)]
pub enum CourierError {
    /// HTTP request failed.
    #[error("request error: {0}")]
    Request(String),

    /// Response could not be read or parsed.
    #[error("response error: {0}")]
    Response(String),

    /// The courier rejected the call.
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Shipment booking and status queries.
///
/// Implemented by [`CourierClient`] in production and by scripted fakes in
/// tests.
#[async_trait]
pub trait CourierGateway: Send + Sync {
    /// Book a shipment for an order. Errors map to "no tracking number" at
    /// the call site; order state is never mutated here.
    async fn book(&self, order: &Order, api_key: &SecretString)
    -> Result<TrackingNumber, CourierError>;

    /// Query current shipment status. `None` means the courier doesn't know
    /// the tracking number (yet).
    async fn status(
        &self,
        tracking: &TrackingNumber,
        api_key: &SecretString,
    ) -> Result<Option<String>, CourierError>;

    /// Public tracking page for a shipment, if the courier has one.
    fn tracking_url(&self, tracking: &TrackingNumber) -> Option<String> {
        let _ = tracking;
        None
    }
}
