//! The content API seam.
//!
//! [`ContentApi`] exposes the three single-request primitives of the remote
//! API. Pagination and retry are provided methods layered on top, so fakes in
//! tests only implement the primitives and still exercise the real loops.

use std::time::Duration;

use async_trait::async_trait;

use insight_core::PostUuid;

use crate::error::ClientError;
use crate::types::{CurrentUserLookup, Credentials, PageEntry, PostStats, RemotePost};

/// How far to follow the post listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationOptions {
    /// Posts requested per page.
    pub page_size: u32,
    /// Hard cap on pages per user.
    pub max_pages: u32,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            page_size: 50,
            max_pages: 100,
        }
    }
}

/// Retry schedule for the statistics endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound on the doubled delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Operations against the remote content platform.
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// Validate the tokens by asking who they belong to.
    ///
    /// Never fails: transport problems map to
    /// [`CurrentUserLookup::Unavailable`].
    async fn fetch_current_user(&self, creds: &Credentials) -> CurrentUserLookup;

    /// Fetch one page of a user's posts after `cursor` (empty for the first
    /// page).
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an undecodable response.
    async fn fetch_posts_page(
        &self,
        username: &str,
        cursor: &str,
        limit: u32,
        creds: &Credentials,
    ) -> Result<Vec<PageEntry>, ClientError>;

    /// Fetch the statistics of one post with a single request.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-200 status, a non-JSON
    /// body, or a payload without counts.
    async fn fetch_post_stats_once(
        &self,
        post_id: PostUuid,
        creds: &Credentials,
    ) -> Result<PostStats, ClientError>;

    /// Fetch every post of `username` by following the cursor.
    ///
    /// Stops at an empty page, at a page whose last entry has no id (that page
    /// is discarded), or after `options.max_pages`. Entries whose id is not a
    /// UUID are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first page error; posts gathered so far are dropped.
    async fn fetch_all_posts(
        &self,
        username: &str,
        creds: &Credentials,
        options: PaginationOptions,
    ) -> Result<Vec<RemotePost>, ClientError> {
        let mut entries: Vec<PageEntry> = Vec::new();
        let mut cursor = String::new();
        let mut pages = 0;
        let mut exhausted = false;

        while pages < options.max_pages {
            let page = self
                .fetch_posts_page(username, &cursor, options.page_size, creds)
                .await?;
            pages += 1;

            let Some(next_cursor) = page.last().and_then(|last| last.id.clone()) else {
                exhausted = true;
                break;
            };
            entries.extend(page);
            cursor = next_cursor;
        }

        if !exhausted {
            tracing::warn!(username, pages, "Stopped listing at page cap");
        }

        let posts = entries
            .into_iter()
            .filter_map(|entry| {
                let raw_id = entry.id.clone();
                match RemotePost::try_from(entry) {
                    Ok(post) => Some(post),
                    Err(_) => {
                        tracing::warn!(username, id = ?raw_id, "Skipping post with invalid id");
                        None
                    }
                }
            })
            .collect();

        Ok(posts)
    }

    /// Fetch the statistics of one post, retrying with exponential backoff.
    ///
    /// Returns `None` once every attempt has failed.
    async fn fetch_post_stats(
        &self,
        post_id: PostUuid,
        creds: &Credentials,
        policy: RetryPolicy,
    ) -> Option<PostStats> {
        let mut attempts = 0;
        let mut backoff = policy.initial_backoff;

        loop {
            attempts += 1;

            match self.fetch_post_stats_once(post_id, creds).await {
                Ok(stats) => return Some(stats),
                Err(e) if attempts >= policy.attempts => {
                    tracing::warn!(
                        post_id = %post_id,
                        attempts = attempts,
                        error = %e,
                        "Failed to fetch post stats after max retries"
                    );
                    return None;
                }
                Err(e) => {
                    tracing::debug!(
                        post_id = %post_id,
                        attempt = attempts,
                        error = %e,
                        "Retrying post stats"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(policy.max_backoff);
                }
            }
        }
    }
}
