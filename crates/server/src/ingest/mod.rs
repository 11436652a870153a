//! Inbound event normalization.
//!
//! Raw provider payloads are verified and parsed into canonical events at
//! the boundary; the lifecycle engine never sees provider JSON. Signature
//! verification runs over the raw buffered body *before* any JSON parsing -
//! re-serialization would break the signature on benign whitespace
//! differences.

pub mod shopify;
pub mod signature;

use thiserror::Error;

pub use shopify::{FulfillmentPayload, parse_fulfillment, parse_order_draft};
pub use signature::verify_webhook_signature;

/// Errors from normalizing an inbound payload.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Body is not the JSON shape we expect.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Signature header missing or mismatched (security-relevant).
    #[error("invalid webhook signature")]
    SignatureInvalid,
}

impl From<serde_json::Error> for IngestError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedPayload(e.to_string())
    }
}
