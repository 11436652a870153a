//! CLI command implementations.

pub mod migrate;
pub mod tenant;

use secrecy::SecretString;

/// Database URL from the environment, matching the server's lookup order.
pub(crate) fn database_url() -> Result<SecretString, Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    std::env::var("ORDERLOOP_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| "ORDERLOOP_DATABASE_URL (or DATABASE_URL) must be set".into())
}
