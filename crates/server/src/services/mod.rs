//! Services driving the order lifecycle.

pub mod lifecycle;
pub mod reconciler;

pub use lifecycle::{Lifecycle, LifecycleError};
pub use reconciler::Reconciler;
