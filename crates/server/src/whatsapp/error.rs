//! WhatsApp Cloud API error types.

use thiserror::Error;

/// Errors that can occur when calling the WhatsApp Cloud API.
#[derive(Debug, Error)]
pub enum WhatsAppError {
    /// HTTP request failed (network, timeout).
    #[error("request error: {0}")]
    Request(String),

    /// Response could not be read or parsed.
    #[error("response error: {0}")]
    Response(String),

    /// The API accepted the request but returned an error object.
    #[error("api error: {0}")]
    Api(String),
}
