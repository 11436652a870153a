//! Status enums for orders and courier shipments.

use serde::{Deserialize, Serialize};

/// Order lifecycle status.
///
/// Moves forward only, along:
///
/// ```text
/// pending -> confirmed -> fulfilled -> out_for_delivery -> delivered
///        \-> cancelled
/// ```
///
/// `cancelled` and `delivered` are terminal. Intermediate stages may be
/// skipped (a courier can report "out for delivery" before the platform
/// reports fulfillment) but no transition ever moves backwards and nothing
/// re-enters `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
    Fulfilled,
    OutForDelivery,
    Delivered,
}

impl OrderStatus {
    /// Whether this status accepts no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Delivered)
    }

    /// Whether a transition from `self` to `next` moves forward along the
    /// lifecycle graph.
    ///
    /// Cancellation is only reachable from `pending` (a customer can only
    /// call off an order the courier hasn't been handed yet); every other
    /// transition must strictly increase lifecycle progress.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (_, Self::Pending) | (Self::Cancelled | Self::Delivered, _) => false,
            (Self::Pending, Self::Cancelled) => true,
            (_, Self::Cancelled) => false,
            _ => next.progress() > self.progress(),
        }
    }

    /// Position along the delivery track. `cancelled` sits off-track and is
    /// handled explicitly in [`Self::can_advance_to`].
    const fn progress(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Confirmed | Self::Cancelled => 1,
            Self::Fulfilled => 2,
            Self::OutForDelivery => 3,
            Self::Delivered => 4,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Fulfilled => "fulfilled",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            "fulfilled" => Ok(Self::Fulfilled),
            "out_for_delivery" => Ok(Self::OutForDelivery),
            "delivered" => Ok(Self::Delivered),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

/// Classification of a courier-reported status string.
///
/// Couriers report free-form stage names ("Pending", "In Transit",
/// "Out For Delivery", "Delivered"); only two of them drive order
/// transitions, the rest are recorded verbatim for the change detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CourierStage {
    OutForDelivery,
    Delivered,
    Other(String),
}

impl CourierStage {
    /// Classify a raw courier status string, case- and whitespace-insensitive.
    #[must_use]
    pub fn classify(raw: &str) -> Self {
        let folded: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match folded.as_str() {
            "outfordelivery" => Self::OutForDelivery,
            "delivered" => Self::Delivered,
            _ => Self::Other(raw.to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_accept_nothing() {
        for next in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Cancelled,
            OrderStatus::Fulfilled,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
        ] {
            assert!(!OrderStatus::Cancelled.can_advance_to(next));
            assert!(!OrderStatus::Delivered.can_advance_to(next));
        }
    }

    #[test]
    fn test_nothing_reenters_pending() {
        for from in [
            OrderStatus::Confirmed,
            OrderStatus::Fulfilled,
            OrderStatus::OutForDelivery,
        ] {
            assert!(!from.can_advance_to(OrderStatus::Pending));
        }
    }

    #[test]
    fn test_cancel_only_from_pending() {
        assert!(OrderStatus::Pending.can_advance_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Confirmed.can_advance_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Fulfilled.can_advance_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_forward_path_with_skips() {
        assert!(OrderStatus::Pending.can_advance_to(OrderStatus::Confirmed));
        assert!(OrderStatus::Confirmed.can_advance_to(OrderStatus::Fulfilled));
        assert!(OrderStatus::Fulfilled.can_advance_to(OrderStatus::OutForDelivery));
        assert!(OrderStatus::OutForDelivery.can_advance_to(OrderStatus::Delivered));
        // courier can outrun the platform's fulfillment webhook
        assert!(OrderStatus::Confirmed.can_advance_to(OrderStatus::OutForDelivery));
        assert!(OrderStatus::Confirmed.can_advance_to(OrderStatus::Delivered));
        // but never backwards
        assert!(!OrderStatus::OutForDelivery.can_advance_to(OrderStatus::Fulfilled));
        assert!(!OrderStatus::Fulfilled.can_advance_to(OrderStatus::Confirmed));
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Cancelled,
            OrderStatus::Fulfilled,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
        ] {
            let parsed: OrderStatus = status.to_string().parse().expect("roundtrip");
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_courier_stage_classification() {
        assert_eq!(
            CourierStage::classify("Out For Delivery"),
            CourierStage::OutForDelivery
        );
        assert_eq!(CourierStage::classify("out-for-delivery"), CourierStage::OutForDelivery);
        assert_eq!(CourierStage::classify("DELIVERED"), CourierStage::Delivered);
        assert_eq!(
            CourierStage::classify("In Transit"),
            CourierStage::Other("In Transit".to_owned())
        );
    }
}
