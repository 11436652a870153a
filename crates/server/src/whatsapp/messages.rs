//! Template builders for the order conversation.
//!
//! Factory functions producing a [`TemplateSpec`] per conversation stage.
//! Body parameter order matches the templates registered with the provider -
//! changing it here without re-registering the template breaks rendering.

use orderloop_core::{CustomerReply, Order, OrderStatus, ReplyAction, TenantId};

use super::types::{QuickReply, TemplateSpec};

/// Confirmation request for a new order, with confirm/cancel buttons whose
/// payloads round-trip `(tenant, order)` back through the reply webhook.
#[must_use]
pub fn order_confirmation(order: &Order, shop_name: &str, tenant_id: &TenantId) -> TemplateSpec {
    TemplateSpec {
        name: "order_confirmation",
        body_params: vec![
            order.customer.name.clone(),
            order.name.clone(),
            order.product.name.clone(),
            order.product.quantity.to_string(),
            shop_name.to_owned(),
            order.amount.amount.to_string(),
            order.amount.currency.clone(),
        ],
        buttons: vec![
            QuickReply {
                payload: CustomerReply::button_payload(&ReplyAction::Confirm, tenant_id, &order.id),
            },
            QuickReply {
                payload: CustomerReply::button_payload(&ReplyAction::Cancel, tenant_id, &order.id),
            },
        ],
        link_url: None,
    }
}

/// Acknowledgment after the customer confirms.
#[must_use]
pub fn confirmed_reply(order: &Order, shop_name: &str) -> TemplateSpec {
    TemplateSpec {
        name: "order_confirmed",
        body_params: vec![
            order.customer.name.clone(),
            order.name.clone(),
            shop_name.to_owned(),
        ],
        buttons: Vec::new(),
        link_url: None,
    }
}

/// Acknowledgment after the customer cancels.
#[must_use]
pub fn cancelled_reply(order: &Order, shop_name: &str) -> TemplateSpec {
    TemplateSpec {
        name: "order_cancelled",
        body_params: vec![
            order.customer.name.clone(),
            order.name.clone(),
            shop_name.to_owned(),
        ],
        buttons: Vec::new(),
        link_url: None,
    }
}

/// Restatement of current status for replies to an already-decided order.
/// No state change accompanies this - repeated taps stay no-ops.
#[must_use]
pub fn status_restatement(order: &Order, shop_name: &str) -> TemplateSpec {
    TemplateSpec {
        name: "order_status",
        body_params: vec![
            order.customer.name.clone(),
            order.name.clone(),
            human_status(order.status).to_owned(),
            shop_name.to_owned(),
        ],
        buttons: Vec::new(),
        link_url: None,
    }
}

/// Shipment notice (fulfillment reported or courier out for delivery).
#[must_use]
pub fn shipped_notice(order: &Order, shop_name: &str, tracking_url: Option<String>) -> TemplateSpec {
    let tracking = order
        .courier
        .tracking_number
        .as_ref()
        .map_or_else(|| "-".to_owned(), ToString::to_string);
    TemplateSpec {
        name: "order_shipped",
        body_params: vec![
            order.customer.name.clone(),
            order.name.clone(),
            tracking,
            shop_name.to_owned(),
        ],
        buttons: Vec::new(),
        link_url: tracking_url,
    }
}

/// Delivery notice for the terminal happy path.
#[must_use]
pub fn delivered_notice(order: &Order, shop_name: &str) -> TemplateSpec {
    TemplateSpec {
        name: "order_delivered",
        body_params: vec![
            order.customer.name.clone(),
            order.name.clone(),
            shop_name.to_owned(),
        ],
        buttons: Vec::new(),
        link_url: None,
    }
}

/// Nudge for a free-text reply we couldn't interpret: point back at the
/// buttons. Sent once per order, gated by the reply-ack flag.
#[must_use]
pub fn reply_help(order: &Order, shop_name: &str) -> TemplateSpec {
    TemplateSpec {
        name: "reply_help",
        body_params: vec![
            order.customer.name.clone(),
            order.name.clone(),
            shop_name.to_owned(),
        ],
        buttons: Vec::new(),
        link_url: None,
    }
}

/// Plain-text heads-up for the store owner when a customer decides.
#[must_use]
pub fn owner_heads_up(order: &Order, decided: OrderStatus) -> String {
    let verb = match decided {
        OrderStatus::Confirmed => "confirmed",
        OrderStatus::Cancelled => "cancelled",
        other => return format!("Order {} is now {other}", order.name),
    };
    format!(
        "Order {} was {verb} by {}: {} x{}, {}",
        order.name,
        order.customer.name,
        order.product.name,
        order.product.quantity,
        order.amount,
    )
}

const fn human_status(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "awaiting your confirmation",
        OrderStatus::Confirmed => "confirmed",
        OrderStatus::Cancelled => "cancelled",
        OrderStatus::Fulfilled => "packed and handed to the courier",
        OrderStatus::OutForDelivery => "out for delivery",
        OrderStatus::Delivered => "delivered",
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use orderloop_core::{Customer, Money, OrderDraft, OrderId, Phone, ProductSummary};

    use super::*;

    fn sample_order() -> Order {
        Order::from_draft(
            OrderDraft {
                id: OrderId::new("1001"),
                name: "#1001".to_owned(),
                customer: Customer {
                    name: "Ali".to_owned(),
                    phone: Phone::normalize("03001234567", "92"),
                    address: None,
                    city: None,
                },
                amount: Money::new(Decimal::new(1500, 0), "PKR"),
                product: ProductSummary {
                    name: "Shirt".to_owned(),
                    quantity: 2,
                },
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_confirmation_params_and_buttons() {
        let order = sample_order();
        let spec = order_confirmation(&order, "Acme Store", &TenantId::new("acme"));

        assert_eq!(spec.name, "order_confirmation");
        assert_eq!(
            spec.body_params,
            vec!["Ali", "#1001", "Shirt", "2", "Acme Store", "1500", "PKR"]
        );
        assert_eq!(spec.buttons.len(), 2);
        assert_eq!(spec.buttons[0].payload, "CONFIRM_ORDER:acme:1001");
        assert_eq!(spec.buttons[1].payload, "CANCEL_ORDER:acme:1001");
    }

    #[test]
    fn test_restatement_names_current_status() {
        let mut order = sample_order();
        order.status = OrderStatus::Confirmed;
        let spec = status_restatement(&order, "Acme Store");
        assert!(spec.body_params.contains(&"confirmed".to_owned()));
        assert!(spec.buttons.is_empty());
    }

    #[test]
    fn test_owner_heads_up_mentions_decision() {
        let order = sample_order();
        let text = owner_heads_up(&order, OrderStatus::Cancelled);
        assert!(text.contains("#1001"));
        assert!(text.contains("cancelled"));
    }
}
