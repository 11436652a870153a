//! Shopify Admin API integration.
//!
//! A deliberately thin shim: the only platform write this system performs is
//! appending a note to an order when the customer decides. Tokens are
//! per-tenant and passed in per call - nothing is cached here.

mod client;

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

use orderloop_core::OrderId;

pub use client::ShopifyClient;

/// Errors that can occur when calling the Shopify Admin API.
#[derive(Debug, Error)]
pub enum ShopifyError {
    /// HTTP request failed.
    #[error("request error: {0}")]
    Request(String),

    /// The API rejected the call.
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Commerce-platform writes.
///
/// Implemented by [`ShopifyClient`] in production and by recording fakes in
/// tests.
#[async_trait]
pub trait PlatformGateway: Send + Sync {
    /// Replace the order's note with the decision trail.
    async fn update_order_note(
        &self,
        shop_domain: &str,
        token: &SecretString,
        order_id: &OrderId,
        note: &str,
    ) -> Result<(), ShopifyError>;
}
