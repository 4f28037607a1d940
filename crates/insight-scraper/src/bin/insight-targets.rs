//! Target scraper: processes users with more posts than average.

use std::sync::Arc;

use insight_scraper::{telemetry, KeyRing, Orchestrator, ScrapeConfig};
use insight_store::PgStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init();

    let config = ScrapeConfig::from_env();
    let keys = KeyRing::from_env()?;

    tracing::info!(workers = config.target_workers, "Starting target scraper");

    let store = PgStore::connect(&config.database_url, config.database_max_connections).await?;
    store.migrate().await?;

    let summary = Orchestrator::new(Arc::new(store), keys, config)
        .run_targets()
        .await?;

    tracing::info!(
        processed = summary.processed(),
        skipped = summary.skipped(),
        failed = summary.failed(),
        "Target scraper done"
    );
    Ok(())
}
