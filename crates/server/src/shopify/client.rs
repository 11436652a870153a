//! Shopify Admin REST client.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, instrument};

use orderloop_core::OrderId;

use super::{PlatformGateway, ShopifyError};

/// Shopify Admin API access token header.
const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

/// Shopify Admin REST API client.
#[derive(Debug, Clone)]
pub struct ShopifyClient {
    client: Client,
    api_version: String,
}

#[derive(Debug, Serialize)]
struct NoteUpdate<'a> {
    order: NoteOrder<'a>,
}

#[derive(Debug, Serialize)]
struct NoteOrder<'a> {
    id: &'a str,
    note: &'a str,
}

impl ShopifyClient {
    /// Create a new client pinned to an Admin API version.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created, which only happens with
    /// a broken TLS installation.
    #[must_use]
    pub fn new(api_version: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_version: api_version.into(),
        }
    }

    fn order_endpoint(&self, shop_domain: &str, order_id: &OrderId) -> String {
        format!(
            "https://{shop_domain}.myshopify.com/admin/api/{}/orders/{order_id}.json",
            self.api_version
        )
    }
}

#[async_trait]
impl PlatformGateway for ShopifyClient {
    #[instrument(skip(self, token, note), fields(shop = %shop_domain, order = %order_id))]
    async fn update_order_note(
        &self,
        shop_domain: &str,
        token: &SecretString,
        order_id: &OrderId,
        note: &str,
    ) -> Result<(), ShopifyError> {
        let body = NoteUpdate {
            order: NoteOrder {
                id: order_id.as_str(),
                note,
            },
        };

        let response = self
            .client
            .put(self.order_endpoint(shop_domain, order_id))
            .header(ACCESS_TOKEN_HEADER, token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ShopifyError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ShopifyError::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!("Order note updated");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_endpoint_shape() {
        let client = ShopifyClient::new("2025-01");
        let url = client.order_endpoint("acme", &OrderId::new("1001"));
        assert_eq!(url, "https://acme.myshopify.com/admin/api/2025-01/orders/1001.json");
    }
}
