//! Orderloop CLI - Database migrations and tenant provisioning.
//!
//! Tenant provisioning is an out-of-band admin operation: the server never
//! creates or deletes tenants on the event path.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! orderloop migrate
//!
//! # Onboard a tenant
//! orderloop tenant add --id acme --domain acme --name "Acme Store" \
//!     --webhook-secret whsec_... --platform-token shpat_... \
//!     --courier-key ck_... --owner-phone 03001234567 --auto-book
//!
//! # List tenants
//! orderloop tenant list
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "orderloop")]
#[command(author, version, about = "Orderloop CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage tenants
    Tenant {
        #[command(subcommand)]
        action: TenantAction,
    },
}

#[derive(Subcommand)]
enum TenantAction {
    /// Onboard or update a tenant
    Add {
        /// Stable tenant identifier
        #[arg(long)]
        id: String,

        /// Storefront domain (platform suffix is stripped automatically)
        #[arg(long)]
        domain: String,

        /// Display name used in customer-facing templates
        #[arg(long)]
        name: String,

        /// Webhook signing secret from the platform
        #[arg(long)]
        webhook_secret: String,

        /// Platform Admin API access token
        #[arg(long)]
        platform_token: String,

        /// Courier API key
        #[arg(long)]
        courier_key: String,

        /// Store owner phone for operational heads-up messages
        #[arg(long)]
        owner_phone: Option<String>,

        /// Book the courier automatically on confirmation
        #[arg(long, default_value_t = false)]
        auto_book: bool,

        /// Dialing country code for phone normalization
        #[arg(long, default_value = "92")]
        country_code: String,
    },
    /// List onboarded tenants
    List,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Tenant { action } => match action {
            TenantAction::Add {
                id,
                domain,
                name,
                webhook_secret,
                platform_token,
                courier_key,
                owner_phone,
                auto_book,
                country_code,
            } => {
                commands::tenant::add(commands::tenant::AddTenant {
                    id,
                    domain,
                    name,
                    webhook_secret,
                    platform_token,
                    courier_key,
                    owner_phone,
                    auto_book,
                    country_code,
                })
                .await?;
            }
            TenantAction::List => commands::tenant::list().await?,
        },
    }
    Ok(())
}
