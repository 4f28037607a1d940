//! Velog insight scraping pipeline.
//!
//! This crate wires the credential codec, the content API client and the
//! store into a batch pipeline:
//!
//! - [`crypto`]: AES-256-CBC token encryption and the sharded [`KeyRing`]
//! - [`reconcile`]: the per-user [`Scraper`] pass
//! - [`stats`]: semaphore-bounded, retried statistics fetching
//! - [`orchestrator`]: partitioning users across parallel workers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use insight_scraper::{KeyRing, Orchestrator, ScrapeConfig};
//! use insight_store::PgStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScrapeConfig::from_env();
//! let store = PgStore::connect(&config.database_url, config.database_max_connections).await?;
//! let orchestrator = Orchestrator::new(Arc::new(store), KeyRing::from_env()?, config);
//!
//! let summary = orchestrator.run_range(1, 1000).await;
//! println!("{} users processed", summary.processed());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod orchestrator;
pub mod reconcile;
pub mod stats;
pub mod telemetry;

pub use config::ScrapeConfig;
pub use crypto::{CredentialCodec, CryptoError, KeyRing};
pub use error::{Result, ScrapeError};
pub use orchestrator::{
    split_list, split_range, ApiFactory, Orchestrator, Partition, RunSummary, WorkerSummary,
};
pub use reconcile::{ActiveSync, Scraper, UserOutcome, UserReport};
pub use stats::{fetch_post_stats_limited, StatsPolicy};
