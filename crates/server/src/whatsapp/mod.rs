//! WhatsApp Cloud API integration.
//!
//! This module provides:
//! - [`WhatsAppClient`] for sending template and text messages
//! - Payload types for the Cloud API and its webhook envelope
//! - Message builders for each conversation template
//! - The webhook verification handshake
//!
//! # Flow
//!
//! 1. A new order triggers a confirmation template with confirm/cancel
//!    quick-reply buttons carrying `ACTION:tenant:order` payloads
//! 2. The customer taps a button (or types free text)
//! 3. The webhook handler normalizes the reply and hands it to the
//!    lifecycle engine
//! 4. Each later stage (confirmed, shipped, delivered) gets its own template
//!
//! Sends are best-effort: a failure is logged by the caller and never rolls
//! back the state transition that triggered it.

mod client;
mod error;
mod messages;
mod types;

use async_trait::async_trait;

use orderloop_core::Phone;

pub use client::WhatsAppClient;
pub use error::WhatsAppError;
pub use messages::{
    cancelled_reply, confirmed_reply, delivered_notice, order_confirmation, owner_heads_up,
    reply_help, shipped_notice, status_restatement,
};
pub use types::{
    InboundMessage, QuickReply, SendMessageResponse, TemplateSpec, WebhookEnvelope,
};

/// Outbound notification dispatch.
///
/// Implemented by [`WhatsAppClient`] in production and by recording fakes in
/// tests. Failure is the caller's problem to log and swallow - the dispatcher
/// itself never retries.
#[async_trait]
pub trait TemplateSender: Send + Sync {
    /// Send a named template with parameters and quick-reply buttons.
    async fn send_template(&self, to: &Phone, spec: &TemplateSpec) -> Result<(), WhatsAppError>;

    /// Send a plain text message (operational heads-up to owners).
    async fn send_text(&self, to: &Phone, body: &str) -> Result<(), WhatsAppError>;
}
