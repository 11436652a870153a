//! Core types for Orderloop.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod money;
pub mod order;
pub mod phone;
pub mod status;
pub mod tenant;

pub use id::*;
pub use money::Money;
pub use order::{
    CourierInfo, Customer, NotificationFlags, NotificationKind, Order, OrderDraft, ProductSummary,
    Timeline,
};
pub use phone::Phone;
pub use status::*;
pub use tenant::{Tenant, TenantSecrets};
