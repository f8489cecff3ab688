//! Cooperative Back Office - Seeder Binary
//!
//! Ensures a default organization, its first branch and the branch's chart
//! of accounts exist. Running it again changes nothing.
//!
//! # Usage
//!
//! ```bash
//! COOP_DATABASE_URL=postgres://... cargo run --bin coop-seed
//!
//! SEED_ORGANIZATION_NAME="Riverside Cooperative" SEED_BRANCH_CODE=RIV cargo run --bin coop-seed
//! ```
//!
//! # Environment Variables
//!
//! * `COOP_DATABASE_URL` - PostgreSQL connection string
//! * `COOP_LOCK_TIMEOUT_MS` - Row lock wait in milliseconds
//! * `SEED_ORGANIZATION_NAME` - Organization to create or reuse
//! * `SEED_ORGANIZATION_EMAIL` - Contact email of a new organization
//! * `SEED_BRANCH_NAME` - Name of a new branch
//! * `SEED_BRANCH_CODE` - Branch to create or reuse within the organization
//! * `SEED_LOG_LEVEL` - Log level when `RUST_LOG` is unset (default: info)
//!
//! The schema in `migrations/` must already be applied.

use std::sync::Arc;

use anyhow::Context;
use core_kernel::OperationContext;
use domain_cooperative::{seed_organization, Registries, SeedConfig};
use infra_registry::{connect_store, StoreConfig, TracingDispatcher};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = SeedConfig::from_env().context("invalid SEED_* configuration")?;
    init_tracing(&config.log_level);

    let store_config = StoreConfig::from_env().context("invalid COOP_* configuration")?;
    let store = connect_store(&store_config)
        .await
        .context("failed to connect to the database")?;
    let registries = Registries::new(Arc::new(store), Arc::new(TracingDispatcher))?;

    let ctx = OperationContext::system().with_correlation_id("coop-seed");
    let report = seed_organization(&ctx, &registries, &config.organization()).await?;

    if report.is_noop() {
        tracing::info!("Nothing to seed");
    } else {
        tracing::info!(
            report = %serde_json::to_string(&report)?,
            "Seed complete"
        );
    }
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
