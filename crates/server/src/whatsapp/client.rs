//! WhatsApp Cloud API client.
//!
//! Sends template and text messages and answers the webhook verification
//! handshake.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, instrument};
use url::Url;

use orderloop_core::Phone;

use super::TemplateSender;
use super::error::WhatsAppError;
use super::types::{SendMessageResponse, TemplateMessage, TemplateSpec, TextMessage};
use crate::config::WhatsAppConfig;

/// WhatsApp Cloud API client for outbound messages.
#[derive(Clone)]
pub struct WhatsAppClient {
    /// HTTP client.
    client: Client,
    /// Cloud API base URL.
    api_base: Url,
    /// Business phone number id messages are sent from.
    phone_number_id: String,
    /// Bearer token for authentication.
    access_token: SecretString,
    /// Shared secret for the webhook verification handshake.
    verify_token: SecretString,
}

impl std::fmt::Debug for WhatsAppClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppClient")
            .field("api_base", &self.api_base.as_str())
            .field("phone_number_id", &self.phone_number_id)
            .field("access_token", &"[REDACTED]")
            .field("verify_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl WhatsAppClient {
    /// Create a new client from configuration.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created, which only happens with
    /// a broken TLS installation.
    #[must_use]
    pub fn new(config: &WhatsAppConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_base: config.api_base.clone(),
            phone_number_id: config.phone_number_id.clone(),
            access_token: config.access_token.clone(),
            verify_token: config.verify_token.clone(),
        }
    }

    /// Answer the webhook verification handshake.
    ///
    /// Returns the challenge to echo back when `mode` is `subscribe` and the
    /// token matches; `None` means reject.
    #[must_use]
    pub fn verify_handshake<'a>(
        &self,
        mode: &str,
        token: &str,
        challenge: &'a str,
    ) -> Option<&'a str> {
        (mode == "subscribe" && token == self.verify_token.expose_secret()).then_some(challenge)
    }

    fn messages_endpoint(&self) -> String {
        format!(
            "{}/{}/messages",
            self.api_base.as_str().trim_end_matches('/'),
            self.phone_number_id
        )
    }

    async fn post_message<T: serde::Serialize>(&self, message: &T) -> Result<(), WhatsAppError> {
        let response = self
            .client
            .post(self.messages_endpoint())
            .bearer_auth(self.access_token.expose_secret())
            .json(message)
            .send()
            .await
            .map_err(|e| WhatsAppError::Request(e.to_string()))?;

        let result: SendMessageResponse = response
            .json()
            .await
            .map_err(|e| WhatsAppError::Response(e.to_string()))?;

        if let Some(api_error) = result.error {
            error!(
                code = ?api_error.code,
                message = %api_error.message,
                "WhatsApp API error sending message"
            );
            return Err(WhatsAppError::Api(api_error.message));
        }

        debug!(
            message_id = ?result.messages.first().map(|m| m.id.as_str()),
            "Message accepted by WhatsApp"
        );

        Ok(())
    }
}

#[async_trait]
impl TemplateSender for WhatsAppClient {
    #[instrument(skip(self, spec), fields(template = %spec.name, to = %to))]
    async fn send_template(&self, to: &Phone, spec: &TemplateSpec) -> Result<(), WhatsAppError> {
        let message = TemplateMessage::from_spec(to.as_str(), spec);
        self.post_message(&message).await
    }

    #[instrument(skip(self, body), fields(to = %to))]
    async fn send_text(&self, to: &Phone, body: &str) -> Result<(), WhatsAppError> {
        let message = TextMessage::new(to.as_str(), body);
        self.post_message(&message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> WhatsAppClient {
        WhatsAppClient::new(&WhatsAppConfig {
            api_base: Url::parse("https://graph.facebook.com/v19.0").expect("valid url"),
            phone_number_id: "1234567890".to_owned(),
            access_token: SecretString::from("EAAB-test-token"),
            verify_token: SecretString::from("hub-token-1"),
        })
    }

    #[test]
    fn test_handshake_accepts_matching_token() {
        let client = client();
        assert_eq!(
            client.verify_handshake("subscribe", "hub-token-1", "challenge-42"),
            Some("challenge-42")
        );
    }

    #[test]
    fn test_handshake_rejects_bad_token_or_mode() {
        let client = client();
        assert_eq!(client.verify_handshake("subscribe", "wrong", "c"), None);
        assert_eq!(client.verify_handshake("unsubscribe", "hub-token-1", "c"), None);
    }

    #[test]
    fn test_messages_endpoint_shape() {
        let client = client();
        assert_eq!(
            client.messages_endpoint(),
            "https://graph.facebook.com/v19.0/1234567890/messages"
        );
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let debug_output = format!("{:?}", client());
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("EAAB-test-token"));
        assert!(!debug_output.contains("hub-token-1"));
    }
}
