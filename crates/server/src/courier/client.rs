//! REST client for the courier API.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use orderloop_core::{Order, Phone, TrackingNumber};

use super::{CourierError, CourierGateway};
use crate::config::CourierConfig;

/// Courier REST API client.
#[derive(Debug, Clone)]
pub struct CourierClient {
    client: Client,
    api_base: Url,
}

/// Booking request body.
#[derive(Debug, Serialize)]
struct BookingRequest<'a> {
    order_ref: &'a str,
    consignee_name: &'a str,
    consignee_phone: Option<&'a str>,
    address: Option<&'a str>,
    city: Option<&'a str>,
    /// Cash to collect on delivery, in the order's currency.
    cod_amount: String,
    pieces: u32,
    product: &'a str,
}

#[derive(Debug, Deserialize)]
struct BookingResponse {
    tracking_number: String,
}

#[derive(Debug, Deserialize)]
struct TrackResponse {
    #[serde(default)]
    status: Option<String>,
}

impl CourierClient {
    /// Create a new courier client from configuration.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created, which only happens with
    /// a broken TLS installation.
    #[must_use]
    pub fn new(config: &CourierConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_base: config.api_base.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.api_base.as_str().trim_end_matches('/'))
    }
}

#[async_trait]
impl CourierGateway for CourierClient {
    #[instrument(skip(self, order, api_key), fields(order = %order.id))]
    async fn book(
        &self,
        order: &Order,
        api_key: &SecretString,
    ) -> Result<TrackingNumber, CourierError> {
        let request = BookingRequest {
            order_ref: order.name.as_str(),
            consignee_name: order.customer.name.as_str(),
            consignee_phone: order.customer.phone.as_ref().map(Phone::as_str),
            address: order.customer.address.as_deref(),
            city: order.customer.city.as_deref(),
            cod_amount: order.amount.amount.to_string(),
            pieces: order.product.quantity,
            product: order.product.name.as_str(),
        };

        let response = self
            .client
            .post(self.endpoint("bookings"))
            .bearer_auth(api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| CourierError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CourierError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let booking: BookingResponse = response
            .json()
            .await
            .map_err(|e| CourierError::Response(e.to_string()))?;

        debug!(tracking = %booking.tracking_number, "Shipment booked");

        Ok(TrackingNumber::new(booking.tracking_number))
    }

    #[instrument(skip(self, api_key), fields(tracking = %tracking))]
    async fn status(
        &self,
        tracking: &TrackingNumber,
        api_key: &SecretString,
    ) -> Result<Option<String>, CourierError> {
        let response = self
            .client
            .get(self.endpoint(&format!("track/{tracking}")))
            .bearer_auth(api_key.expose_secret())
            .send()
            .await
            .map_err(|e| CourierError::Request(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CourierError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let tracked: TrackResponse = response
            .json()
            .await
            .map_err(|e| CourierError::Response(e.to_string()))?;

        Ok(tracked.status)
    }

    fn tracking_url(&self, tracking: &TrackingNumber) -> Option<String> {
        Some(self.endpoint(&format!("track/{tracking}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let client = CourierClient::new(&CourierConfig {
            api_base: Url::parse("https://api.courier.pk/v1/").expect("valid url"),
        });
        assert_eq!(client.endpoint("bookings"), "https://api.courier.pk/v1/bookings");

        let tracking = TrackingNumber::new("TRK1");
        assert_eq!(
            client.tracking_url(&tracking).as_deref(),
            Some("https://api.courier.pk/v1/track/TRK1")
        );
    }
}
