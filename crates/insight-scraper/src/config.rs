//! Scraper configuration.

use std::str::FromStr;
use std::time::Duration;

use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use insight_client::{ClientOptions, PaginationOptions, DEFAULT_API_URL, DEFAULT_STATS_URL};

/// Scraper configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// `PostgreSQL` connection string (default: `postgres://localhost/insight`).
    pub database_url: String,

    /// Database pool size (default: 10).
    pub database_max_connections: u32,

    /// GraphQL endpoint for users and posts.
    pub api_url: String,

    /// GraphQL endpoint for post statistics.
    pub stats_api_url: String,

    /// Concurrent in-flight stats requests per worker (default: 40).
    pub max_connections: usize,

    /// Posts per upsert transaction (default: 200).
    pub batch_size: usize,

    /// Posts per stats chunk (default: 20).
    pub chunk_size: usize,

    /// Fewer fetched posts than this skips the active sync (default: 1).
    pub min_posts_threshold: usize,

    /// Largest fraction of active posts one pass may deactivate (default: 0.5).
    pub deactivation_ratio_limit: f64,

    /// Per-attempt stats timeout (default: 5s).
    pub stats_timeout: Duration,

    /// Stats attempts per post (default: 3).
    pub stats_attempts: u32,

    /// Fixed delay between stats attempts (default: 2s).
    pub stats_retry_delay: Duration,

    /// Pause between upsert batches (default: 100ms).
    pub batch_pause: Duration,

    /// Pause between stats chunks (default: 500ms).
    pub chunk_pause: Duration,

    /// Posts requested per listing page (default: 50).
    pub page_size: u32,

    /// Listing page cap per user (default: 100).
    pub max_pages: u32,

    /// UTC offset in hours that defines the calendar day of daily stats (default: 9).
    pub utc_offset_hours: i32,

    /// Workers for the range entry point (default: 3).
    pub range_workers: usize,

    /// Workers for the target entry point (default: 2).
    pub target_workers: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/insight".to_string(),
            database_max_connections: 10,
            api_url: DEFAULT_API_URL.to_string(),
            stats_api_url: DEFAULT_STATS_URL.to_string(),
            max_connections: 40,
            batch_size: 200,
            chunk_size: 20,
            min_posts_threshold: 1,
            deactivation_ratio_limit: 0.5,
            stats_timeout: Duration::from_secs(5),
            stats_attempts: 3,
            stats_retry_delay: Duration::from_secs(2),
            batch_pause: Duration::from_millis(100),
            chunk_pause: Duration::from_millis(500),
            page_size: 50,
            max_pages: 100,
            utc_offset_hours: 9,
            range_workers: 3,
            target_workers: 2,
        }
    }
}

impl ScrapeConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            database_max_connections: env_or(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            api_url: std::env::var("VELOG_API_URL").unwrap_or(defaults.api_url),
            stats_api_url: std::env::var("VELOG_STATS_API_URL").unwrap_or(defaults.stats_api_url),
            max_connections: env_or("SCRAPER_MAX_CONNECTIONS", defaults.max_connections).max(1),
            batch_size: env_or("SCRAPER_BATCH_SIZE", defaults.batch_size).max(1),
            chunk_size: env_or("SCRAPER_CHUNK_SIZE", defaults.chunk_size).max(1),
            min_posts_threshold: env_or(
                "SCRAPER_MIN_POSTS_THRESHOLD",
                defaults.min_posts_threshold,
            ),
            deactivation_ratio_limit: valid_ratio(
                env_or(
                    "SCRAPER_DEACTIVATION_RATIO_LIMIT",
                    defaults.deactivation_ratio_limit,
                ),
                defaults.deactivation_ratio_limit,
            ),
            stats_timeout: Duration::from_secs(env_or("SCRAPER_STATS_TIMEOUT_SECS", 5)),
            stats_attempts: env_or("SCRAPER_STATS_ATTEMPTS", defaults.stats_attempts).max(1),
            stats_retry_delay: Duration::from_secs(env_or("SCRAPER_STATS_RETRY_DELAY_SECS", 2)),
            batch_pause: Duration::from_millis(env_or("SCRAPER_BATCH_PAUSE_MS", 100)),
            chunk_pause: Duration::from_millis(env_or("SCRAPER_CHUNK_PAUSE_MS", 500)),
            page_size: env_or("SCRAPER_PAGE_SIZE", defaults.page_size).max(1),
            max_pages: env_or("SCRAPER_MAX_PAGES", defaults.max_pages).max(1),
            utc_offset_hours: env_or("SCRAPER_UTC_OFFSET_HOURS", defaults.utc_offset_hours),
            range_workers: env_or("SCRAPER_RANGE_WORKERS", defaults.range_workers).max(1),
            target_workers: env_or("SCRAPER_TARGET_WORKERS", defaults.target_workers).max(1),
        }
    }

    /// Listing options derived from this configuration.
    #[must_use]
    pub fn pagination(&self) -> PaginationOptions {
        PaginationOptions {
            page_size: self.page_size,
            max_pages: self.max_pages,
        }
    }

    /// HTTP client options derived from this configuration.
    #[must_use]
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            api_url: self.api_url.clone(),
            stats_url: self.stats_api_url.clone(),
            ..ClientOptions::default()
        }
    }

    /// The calendar day daily statistics are recorded under right now.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        let offset = self
            .utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix());
        Utc::now().with_timezone(&offset).date_naive()
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Non-finite or negative ratios fall back to `default`.
fn valid_ratio(value: f64, default: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        tracing::warn!(value, default, "Ignoring invalid deactivation ratio limit");
        default
    }
}
