//! Shopify webhook payload parsing.
//!
//! Tolerant of the platform's habits: numeric-or-string ids, money amounts
//! as strings, phones scattered across customer / shipping address /
//! top-level fields.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

use orderloop_core::{Customer, Money, OrderDraft, OrderId, Phone, ProductSummary};

use super::IngestError;

/// Raw order-created payload, reduced to the fields we keep.
#[derive(Debug, Deserialize)]
struct OrderPayload {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    name: String,
    #[serde(default)]
    customer: Option<CustomerPayload>,
    #[serde(default)]
    phone: Option<String>,
    total_price: String,
    currency: String,
    #[serde(default)]
    line_items: Vec<LineItemPayload>,
    #[serde(default)]
    shipping_address: Option<AddressPayload>,
}

#[derive(Debug, Deserialize)]
struct CustomerPayload {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddressPayload {
    #[serde(default)]
    address1: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LineItemPayload {
    name: String,
    #[serde(default)]
    quantity: u32,
}

/// Fulfillment webhook body. Only a `status` of `"fulfilled"` advances
/// state; everything else is ignored by the caller.
#[derive(Debug, Deserialize)]
pub struct FulfillmentPayload {
    #[serde(deserialize_with = "string_or_number")]
    pub order_id: String,
    pub status: String,
}

impl FulfillmentPayload {
    /// Whether this payload reports the order fulfilled.
    #[must_use]
    pub fn is_fulfilled(&self) -> bool {
        self.status.eq_ignore_ascii_case("fulfilled")
    }

    #[must_use]
    pub fn order_id(&self) -> OrderId {
        OrderId::new(self.order_id.clone())
    }
}

/// Parse an order-created body into a draft, normalizing the phone against
/// the tenant's country code.
///
/// # Errors
///
/// Returns [`IngestError::MalformedPayload`] if the body is not parseable
/// or the amount is not numeric.
pub fn parse_order_draft(raw_body: &str, country_code: &str) -> Result<OrderDraft, IngestError> {
    let payload: OrderPayload = serde_json::from_str(raw_body)?;

    let total: Decimal = payload
        .total_price
        .parse()
        .map_err(|_| IngestError::MalformedPayload(format!("bad total_price: {}", payload.total_price)))?;

    let customer_name = payload
        .customer
        .as_ref()
        .map(|c| {
            let first = c.first_name.as_deref().unwrap_or_default();
            let last = c.last_name.as_deref().unwrap_or_default();
            format!("{first} {last}").trim().to_owned()
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "Customer".to_owned());

    // First phone that yields digits wins: customer, shipping address,
    // top-level order phone.
    let raw_phone = payload
        .customer
        .as_ref()
        .and_then(|c| c.phone.clone())
        .or_else(|| payload.shipping_address.as_ref().and_then(|a| a.phone.clone()))
        .or(payload.phone);
    let phone = raw_phone.and_then(|p| Phone::normalize(&p, country_code));

    let product = payload
        .line_items
        .first()
        .map_or_else(
            || ProductSummary {
                name: "Order".to_owned(),
                quantity: 1,
            },
            |item| ProductSummary {
                name: item.name.clone(),
                quantity: item.quantity.max(1),
            },
        );

    Ok(OrderDraft {
        id: OrderId::new(payload.id),
        name: payload.name,
        customer: Customer {
            name: customer_name,
            phone,
            address: payload.shipping_address.as_ref().and_then(|a| a.address1.clone()),
            city: payload.shipping_address.and_then(|a| a.city),
        },
        amount: Money::new(total, payload.currency),
        product,
    })
}

/// Parse a fulfillment webhook body.
///
/// # Errors
///
/// Returns [`IngestError::MalformedPayload`] if the body is not parseable.
pub fn parse_fulfillment(raw_body: &str) -> Result<FulfillmentPayload, IngestError> {
    Ok(serde_json::from_str(raw_body)?)
}

/// Accept a JSON string or number as a string (Shopify sends ids both ways
/// depending on the API surface).
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(serde_json::Number),
    }

    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
    })
}
