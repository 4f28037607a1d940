//! Range scraper: processes every user in a `group_id` range.

use std::sync::Arc;

use clap::Parser;

use insight_scraper::{telemetry, KeyRing, Orchestrator, ScrapeConfig};
use insight_store::PgStore;

/// Scrape Velog stats for users in a group range.
#[derive(Debug, Parser)]
#[command(name = "insight-range", version)]
struct Args {
    /// Lowest group id, inclusive.
    #[arg(long, default_value_t = 1)]
    min_group: i32,

    /// Highest group id, inclusive.
    #[arg(long, default_value_t = 1000)]
    max_group: i32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    telemetry::init();

    let config = ScrapeConfig::from_env();
    let keys = KeyRing::from_env()?;

    tracing::info!(
        min_group = args.min_group,
        max_group = args.max_group,
        workers = config.range_workers,
        max_connections = config.max_connections,
        "Starting range scraper"
    );

    let store = PgStore::connect(&config.database_url, config.database_max_connections).await?;
    store.migrate().await?;

    let orchestrator = Orchestrator::new(Arc::new(store), keys, config);
    let summary = orchestrator.run_range(args.min_group, args.max_group).await;

    tracing::info!(
        processed = summary.processed(),
        skipped = summary.skipped(),
        failed = summary.failed(),
        "Range scraper done"
    );
    Ok(())
}
