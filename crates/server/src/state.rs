//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ServerConfig;
use crate::registry::TenantRegistry;
use crate::services::Lifecycle;
use crate::store::OrderStore;
use crate::whatsapp::WhatsAppClient;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    pool: PgPool,
    store: Arc<dyn OrderStore>,
    registry: TenantRegistry,
    lifecycle: Arc<Lifecycle>,
    whatsapp: WhatsAppClient,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: ServerConfig,
        pool: PgPool,
        store: Arc<dyn OrderStore>,
        lifecycle: Arc<Lifecycle>,
        whatsapp: WhatsAppClient,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                registry: TenantRegistry::new(Arc::clone(&store)),
                config,
                pool,
                store,
                lifecycle,
                whatsapp,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.inner.store
    }

    #[must_use]
    pub fn registry(&self) -> &TenantRegistry {
        &self.inner.registry
    }

    #[must_use]
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.inner.lifecycle
    }

    #[must_use]
    pub fn whatsapp(&self) -> &WhatsAppClient {
        &self.inner.whatsapp
    }
}
