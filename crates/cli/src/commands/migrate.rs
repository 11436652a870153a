//! Database migration command.

use orderloop_server::store::{self, PgStore};

/// Run embedded migrations against the configured database.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let database_url = super::database_url()?;

    tracing::info!("Connecting to database");
    let pool = store::create_pool(&database_url).await?;

    tracing::info!("Running migrations");
    PgStore::migrate(&pool).await?;

    tracing::info!("Migrations complete");
    Ok(())
}
