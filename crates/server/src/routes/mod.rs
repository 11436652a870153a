//! HTTP routes.
//!
//! Every webhook entry point acknowledges receipt immediately and processes
//! in a spawned task - the upstream sender's retry policy is decoupled from
//! our processing latency and failures.

mod shopify;
mod whatsapp;

use axum::Router;

use crate::state::AppState;

/// Build all application routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(shopify::router())
        .merge(whatsapp::router())
}
