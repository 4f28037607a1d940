//! Bounded, retried statistics fetching.

use std::time::Duration;

use tokio::sync::Semaphore;

use insight_client::{ContentApi, Credentials, PostStats};
use insight_core::PostUuid;

use crate::config::ScrapeConfig;

/// Timeout and retry schedule for one post's statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsPolicy {
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Total attempts.
    pub attempts: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
}

impl Default for StatsPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl From<&ScrapeConfig> for StatsPolicy {
    fn from(config: &ScrapeConfig) -> Self {
        Self {
            timeout: config.stats_timeout,
            attempts: config.stats_attempts,
            retry_delay: config.stats_retry_delay,
        }
    }
}

/// Fetch one post's statistics under the worker's semaphore.
///
/// Each attempt holds a permit only while its request is in flight. Transport
/// errors, timeouts and malformed payloads all count as failed attempts.
/// Returns `None` after the last failed attempt.
pub async fn fetch_post_stats_limited(
    api: &dyn ContentApi,
    semaphore: &Semaphore,
    post_id: PostUuid,
    creds: &Credentials,
    policy: StatsPolicy,
) -> Option<PostStats> {
    for attempt in 1..=policy.attempts {
        let result = {
            let Ok(_permit) = semaphore.acquire().await else {
                tracing::error!(post_id = %post_id, "Stats semaphore closed");
                return None;
            };
            tokio::time::timeout(policy.timeout, api.fetch_post_stats_once(post_id, creds)).await
        };

        match result {
            Ok(Ok(stats)) => return Some(stats),
            Ok(Err(e)) => {
                tracing::debug!(post_id = %post_id, attempt, error = %e, "Stats attempt failed");
            }
            Err(_) => {
                tracing::debug!(post_id = %post_id, attempt, "Stats attempt timed out");
            }
        }

        if attempt < policy.attempts {
            tokio::time::sleep(policy.retry_delay).await;
        }
    }

    tracing::warn!(
        post_id = %post_id,
        attempts = policy.attempts,
        "Giving up on post stats"
    );
    None
}
