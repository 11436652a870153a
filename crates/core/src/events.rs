//! Canonical events driving the order lifecycle.
//!
//! Raw provider payloads (commerce webhooks, WhatsApp envelopes, courier
//! poll results) are parsed into this closed set at the boundary. The
//! lifecycle engine never sees provider JSON.

use crate::types::{OrderDraft, OrderId, Phone, TenantId};

/// What a customer reply asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyAction {
    Confirm,
    Cancel,
    /// Free text with no recognizable action.
    Unknown,
}

/// Button payload tag for order confirmation.
pub const CONFIRM_TAG: &str = "CONFIRM_ORDER";
/// Button payload tag for order cancellation.
pub const CANCEL_TAG: &str = "CANCEL_ORDER";

/// An explicit `(tenant, order)` reference round-tripped through a button
/// payload, the fast path for reply matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRef {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
}

/// A customer reply, already phone-normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerReply {
    pub phone: Option<Phone>,
    pub action: ReplyAction,
    /// Present when the client preserved the button payload.
    pub order_ref: Option<OrderRef>,
}

impl CustomerReply {
    /// Parse a structured button payload of the form
    /// `CONFIRM_ORDER:tenant:order` / `CANCEL_ORDER:tenant:order`.
    ///
    /// Returns `None` for free text or a payload that doesn't follow the
    /// scheme - the caller falls back to the phone lookup.
    #[must_use]
    pub fn parse_button_payload(payload: &str) -> Option<(ReplyAction, OrderRef)> {
        let mut parts = payload.splitn(3, ':');
        let action = match parts.next()? {
            CONFIRM_TAG => ReplyAction::Confirm,
            CANCEL_TAG => ReplyAction::Cancel,
            _ => return None,
        };
        let tenant = parts.next().filter(|s| !s.is_empty())?;
        let order = parts.next().filter(|s| !s.is_empty())?;
        Some((
            action,
            OrderRef {
                tenant_id: TenantId::new(tenant),
                order_id: OrderId::new(order),
            },
        ))
    }

    /// Build the outbound button payload for an order.
    #[must_use]
    pub fn button_payload(action: &ReplyAction, tenant_id: &TenantId, order_id: &OrderId) -> String {
        let tag = match action {
            ReplyAction::Confirm => CONFIRM_TAG,
            ReplyAction::Cancel => CANCEL_TAG,
            ReplyAction::Unknown => "",
        };
        format!("{tag}:{tenant_id}:{order_id}")
    }
}

/// The closed set of events the lifecycle engine consumes.
#[derive(Debug, Clone)]
pub enum Event {
    /// A new order arrived from the commerce platform.
    OrderCreated {
        tenant_id: TenantId,
        draft: OrderDraft,
    },
    /// The customer replied on the messaging channel.
    CustomerReplied(CustomerReply),
    /// The platform reported the order fulfilled.
    FulfillmentReported {
        tenant_id: TenantId,
        order_id: OrderId,
    },
    /// The reconciliation poller observed a courier status.
    CourierStatusObserved {
        tenant_id: TenantId,
        order_id: OrderId,
        status: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_payload_roundtrip() {
        let tenant = TenantId::new("acme");
        let order = OrderId::new("1001");
        let payload = CustomerReply::button_payload(&ReplyAction::Confirm, &tenant, &order);
        assert_eq!(payload, "CONFIRM_ORDER:acme:1001");

        let (action, order_ref) =
            CustomerReply::parse_button_payload(&payload).expect("well-formed payload");
        assert_eq!(action, ReplyAction::Confirm);
        assert_eq!(order_ref.tenant_id, tenant);
        assert_eq!(order_ref.order_id, order);
    }

    #[test]
    fn test_cancel_payload_parses() {
        let (action, _) =
            CustomerReply::parse_button_payload("CANCEL_ORDER:acme:1001").expect("parses");
        assert_eq!(action, ReplyAction::Cancel);
    }

    #[test]
    fn test_free_text_is_not_a_payload() {
        assert!(CustomerReply::parse_button_payload("yes please").is_none());
        assert!(CustomerReply::parse_button_payload("CONFIRM_ORDER").is_none());
        assert!(CustomerReply::parse_button_payload("CONFIRM_ORDER:acme").is_none());
        assert!(CustomerReply::parse_button_payload("CONFIRM_ORDER::1001").is_none());
    }
}
