//! The order entity and its sub-records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{OrderId, TrackingNumber};
use super::money::Money;
use super::phone::Phone;
use super::status::OrderStatus;

/// Customer details captured from the order payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Display name used in message templates.
    pub name: String,
    /// Normalized phone, if the order carried one at all.
    pub phone: Option<Phone>,
    pub address: Option<String>,
    pub city: Option<String>,
}

/// Primary line-item summary. Not a full line-item ledger - just enough for
/// the confirmation message and the courier booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub name: String,
    pub quantity: u32,
}

/// Lifecycle timestamps. Exactly one of `confirmed_at`/`cancelled_at` is
/// ever set for a given order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    /// When we last messaged the customer about this order.
    pub last_msg_sent_at: Option<DateTime<Utc>>,
    /// When the customer last replied about this order.
    pub last_reply_at: Option<DateTime<Utc>>,
}

/// Which notification kinds have already gone out, to bound duplicate sends
/// under at-least-once webhook delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationFlags {
    pub confirmation_sent: bool,
    pub fulfilled_sent: bool,
    pub reply_ack_sent: bool,
}

/// The notification kinds tracked by [`NotificationFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Confirmation,
    Fulfilled,
    ReplyAck,
}

impl NotificationFlags {
    /// Whether the given kind has already been sent.
    #[must_use]
    pub const fn already_sent(&self, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::Confirmation => self.confirmation_sent,
            NotificationKind::Fulfilled => self.fulfilled_sent,
            NotificationKind::ReplyAck => self.reply_ack_sent,
        }
    }

    /// Mark the given kind as sent.
    pub const fn mark_sent(&mut self, kind: NotificationKind) {
        match kind {
            NotificationKind::Confirmation => self.confirmation_sent = true,
            NotificationKind::Fulfilled => self.fulfilled_sent = true,
            NotificationKind::ReplyAck => self.reply_ack_sent = true,
        }
    }
}

/// Courier booking state. `tracking_number` is set at most once; booking is
/// never re-attempted once it is present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierInfo {
    pub tracking_number: Option<TrackingNumber>,
    /// Last status string observed from the courier, verbatim.
    pub last_status: Option<String>,
    pub booked_at: Option<DateTime<Utc>>,
}

/// An order owned by a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Human-readable reference, e.g. `#1001`.
    pub name: String,
    pub customer: Customer,
    pub amount: Money,
    pub product: ProductSummary,
    pub status: OrderStatus,
    pub timeline: Timeline,
    pub flags: NotificationFlags,
    pub courier: CourierInfo,
}

impl Order {
    /// Materialize a freshly ingested draft as a `pending` order.
    #[must_use]
    pub fn from_draft(draft: OrderDraft, created_at: DateTime<Utc>) -> Self {
        Self {
            id: draft.id,
            name: draft.name,
            customer: draft.customer,
            amount: draft.amount,
            product: draft.product,
            status: OrderStatus::Pending,
            timeline: Timeline {
                created_at,
                ..Timeline::default()
            },
            flags: NotificationFlags::default(),
            courier: CourierInfo::default(),
        }
    }
}

/// What the inbound normalizer extracts from an order-created payload,
/// before any lifecycle state exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub id: OrderId,
    pub name: String,
    pub customer: Customer,
    pub amount: Money,
    pub product: ProductSummary,
}
