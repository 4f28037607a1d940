//! Per-user reconciliation of remote state against the local store.
//!
//! One pass runs these steps in order, each depending on the previous:
//!
//! 1. decrypt the stored tokens
//! 2. validate them against the API (invalid or unreachable: skip the user)
//! 3. persist rotated tokens, then use them for the rest of the pass
//! 4. persist changed profile fields
//! 5. upsert the full post listing in independently committed batches
//! 6. sync `is_active` against the listing, guarded by the safety valve
//! 7. fetch statistics chunk by chunk and record today's counts

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use insight_client::{ContentApi, Credentials, CurrentUserLookup, RemotePost, SessionCookies};
use insight_core::{
    PostUpsert, PostUuid, StatisticsWrite, TokenUpdate, UpsertOutcome, User, UserId,
};
use insight_store::Store;

use crate::config::ScrapeConfig;
use crate::crypto::{CredentialCodec, KeyRing};
use crate::error::{Result, ScrapeError};
use crate::stats::{fetch_post_stats_limited, StatsPolicy};

/// How a user's pass ended, short of an error.
#[derive(Debug, Clone, PartialEq)]
pub enum UserOutcome {
    /// Every step ran.
    Completed(UserReport),
    /// The API reports no user behind the tokens.
    InvalidCredentials,
    /// The API could not be reached; try again next run.
    Unavailable,
}

/// What the active/inactive sync step did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum ActiveSync {
    /// Not run yet.
    #[default]
    Pending,
    /// The listing was smaller than the minimum-posts threshold.
    BelowThreshold {
        /// Posts in the listing.
        fetched: usize,
    },
    /// Too many active posts would have been deactivated.
    SafetyValve {
        /// Active posts missing from the listing.
        candidates: usize,
        /// Currently active posts.
        active: usize,
    },
    /// Flags were updated.
    Applied {
        /// Posts switched off.
        deactivated: u64,
        /// Posts switched back on.
        reactivated: u64,
    },
}

/// Counters from one completed pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserReport {
    /// Whether rotated tokens were saved.
    pub tokens_rotated: bool,
    /// Whether changed profile fields were saved.
    pub profile_updated: bool,
    /// Distinct posts in the remote listing.
    pub posts_fetched: usize,
    /// Upsert counters over all batches.
    pub upsert: UpsertOutcome,
    /// Active sync result.
    pub active_sync: ActiveSync,
    /// Daily statistics rows created.
    pub stats_created: usize,
    /// Daily statistics rows overwritten.
    pub stats_updated: usize,
    /// Posts with no stats after all attempts.
    pub stats_missing: usize,
    /// Posts whose stats could not be saved.
    pub stats_unsaved: usize,
}

/// Runs reconciliation passes for one worker.
///
/// The semaphore bounds in-flight stats requests across every pass this
/// scraper runs, not per chunk.
pub struct Scraper {
    store: Arc<dyn Store>,
    api: Arc<dyn ContentApi>,
    keys: Arc<KeyRing>,
    config: Arc<ScrapeConfig>,
    semaphore: Arc<Semaphore>,
}

impl Scraper {
    /// Create a scraper with its own stats semaphore.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        api: Arc<dyn ContentApi>,
        keys: Arc<KeyRing>,
        config: Arc<ScrapeConfig>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_connections.max(1)));
        Self {
            store,
            api,
            keys,
            config,
            semaphore,
        }
    }

    /// Run one full pass for `user`.
    ///
    /// # Errors
    ///
    /// Returns a [`ScrapeError`] naming the step that failed. Work committed
    /// by earlier steps is kept.
    pub async fn process_user(&self, user: &User) -> Result<UserOutcome> {
        let codec = self.keys.codec_for(user.group_id);
        let mut creds = Credentials::new(
            codec.decrypt(&user.access_token)?,
            codec.decrypt(&user.refresh_token)?,
        );

        let (remote, cookies) = match self.api.fetch_current_user(&creds).await {
            CurrentUserLookup::Authenticated { user, cookies } => (user, cookies),
            CurrentUserLookup::Anonymous => {
                tracing::warn!(user_id = %user.id, "Invalid credentials, skipping user");
                return Ok(UserOutcome::InvalidCredentials);
            }
            CurrentUserLookup::Unavailable => {
                tracing::warn!(user_id = %user.id, "Content API unavailable, skipping user");
                return Ok(UserOutcome::Unavailable);
            }
        };

        let mut report = UserReport {
            tokens_rotated: self.rotate_tokens(user.id, codec, &creds, &cookies).await?,
            ..UserReport::default()
        };
        creds = creds.rotated(&cookies);

        let profile = user.profile_changes(
            remote.email.as_deref(),
            Some(remote.username.as_str()),
            remote.thumbnail.as_deref(),
        );
        if !profile.is_empty() {
            self.store
                .update_user_profile(user.id, &profile)
                .await
                .map_err(ScrapeError::ProfilePersistence)?;
            report.profile_updated = true;
        }

        let posts = self
            .api
            .fetch_all_posts(&remote.username, &creds, self.config.pagination())
            .await?;
        let posts = dedupe(posts);
        report.posts_fetched = posts.len();

        report.upsert = self.upsert_posts(user.id, &posts).await?;

        let fetched: HashSet<PostUuid> = posts.iter().map(|post| post.id).collect();
        report.active_sync = self.sync_active(user.id, &fetched).await?;

        self.record_statistics(&posts, &creds, &mut report).await;

        tracing::info!(
            user_id = %user.id,
            username = %remote.username,
            posts = report.posts_fetched,
            created = report.upsert.created,
            updated = report.upsert.updated,
            active_sync = ?report.active_sync,
            stats_created = report.stats_created,
            stats_updated = report.stats_updated,
            stats_missing = report.stats_missing,
            "User processed"
        );

        Ok(UserOutcome::Completed(report))
    }

    /// Persist only the token cookies that differ from what we sent.
    async fn rotate_tokens(
        &self,
        user_id: UserId,
        codec: &CredentialCodec,
        creds: &Credentials,
        cookies: &SessionCookies,
    ) -> Result<bool> {
        let changed = |cookie: &Option<String>, current: &str| {
            cookie
                .as_deref()
                .filter(|value| *value != current)
                .map(|value| codec.encrypt(value))
        };

        let update = TokenUpdate {
            access_token: changed(&cookies.access_token, &creds.access_token),
            refresh_token: changed(&cookies.refresh_token, &creds.refresh_token),
        };
        if update.is_empty() {
            return Ok(false);
        }

        self.store
            .update_user_tokens(user_id, &update)
            .await
            .map_err(ScrapeError::TokenPersistence)?;

        tracing::debug!(user_id = %user_id, update = ?update, "Rotated tokens saved");
        Ok(true)
    }

    async fn upsert_posts(&self, user_id: UserId, posts: &[RemotePost]) -> Result<UpsertOutcome> {
        let upserts: Vec<PostUpsert> = posts
            .iter()
            .map(|post| {
                PostUpsert::new(post.id, &post.title, post.url_slug.clone(), post.released_at)
            })
            .collect();

        let mut outcome = UpsertOutcome::default();
        for (batch, chunk) in upserts.chunks(self.config.batch_size).enumerate() {
            if batch > 0 {
                tokio::time::sleep(self.config.batch_pause).await;
            }

            let result = self
                .store
                .upsert_posts(user_id, chunk)
                .await
                .map_err(|source| ScrapeError::PostUpsert { batch, source })?;
            outcome.merge(result);
        }

        Ok(outcome)
    }

    async fn sync_active(
        &self,
        user_id: UserId,
        fetched: &HashSet<PostUuid>,
    ) -> Result<ActiveSync> {
        if fetched.len() < self.config.min_posts_threshold {
            tracing::debug!(
                user_id = %user_id,
                fetched = fetched.len(),
                "Too few posts for active sync"
            );
            return Ok(ActiveSync::BelowThreshold {
                fetched: fetched.len(),
            });
        }

        let local = self
            .store
            .posts_for_user(user_id)
            .await
            .map_err(ScrapeError::ActiveSync)?;

        let active = local.iter().filter(|post| post.is_active).count();
        let to_deactivate: Vec<PostUuid> = local
            .iter()
            .filter(|post| post.is_active && !fetched.contains(&post.post_uuid))
            .map(|post| post.post_uuid)
            .collect();
        let to_reactivate: Vec<PostUuid> = local
            .iter()
            .filter(|post| !post.is_active && fetched.contains(&post.post_uuid))
            .map(|post| post.post_uuid)
            .collect();

        if exceeds_ratio(to_deactivate.len(), active, self.config.deactivation_ratio_limit) {
            tracing::warn!(
                user_id = %user_id,
                candidates = to_deactivate.len(),
                active,
                "Deactivation ratio over limit, skipping active sync"
            );
            return Ok(ActiveSync::SafetyValve {
                candidates: to_deactivate.len(),
                active,
            });
        }

        let mut deactivated = 0;
        if !to_deactivate.is_empty() {
            deactivated = self
                .store
                .set_posts_active(user_id, &to_deactivate, false)
                .await
                .map_err(ScrapeError::ActiveSync)?;
        }

        let mut reactivated = 0;
        if !to_reactivate.is_empty() {
            reactivated = self
                .store
                .set_posts_active(user_id, &to_reactivate, true)
                .await
                .map_err(ScrapeError::ActiveSync)?;
        }

        Ok(ActiveSync::Applied {
            deactivated,
            reactivated,
        })
    }

    /// Fetch stats chunk by chunk; failures here never fail the pass.
    async fn record_statistics(
        &self,
        posts: &[RemotePost],
        creds: &Credentials,
        report: &mut UserReport,
    ) {
        let policy = StatsPolicy::from(self.config.as_ref());
        let today = self.config.today();

        for (index, chunk) in posts.chunks(self.config.chunk_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.chunk_pause).await;
            }

            let results = join_all(chunk.iter().map(|post| {
                fetch_post_stats_limited(
                    self.api.as_ref(),
                    &self.semaphore,
                    post.id,
                    creds,
                    policy,
                )
            }))
            .await;

            for (post, stats) in chunk.iter().zip(results) {
                let Some(stats) = stats else {
                    report.stats_missing += 1;
                    continue;
                };
                let likes = stats.likes.or(post.likes).unwrap_or(0);

                match self
                    .store
                    .upsert_daily_statistics(post.id, today, stats.views, likes)
                    .await
                {
                    Ok(Some(StatisticsWrite::Created)) => report.stats_created += 1,
                    Ok(Some(StatisticsWrite::Updated)) => report.stats_updated += 1,
                    Ok(None) => {
                        tracing::warn!(
                            post_id = %post.id,
                            "Post vanished before stats were saved"
                        );
                        report.stats_unsaved += 1;
                    }
                    Err(e) => {
                        tracing::error!(
                            post_id = %post.id,
                            error = %e,
                            "Failed to save post stats"
                        );
                        report.stats_unsaved += 1;
                    }
                }
            }
        }
    }
}

/// Keep the first occurrence of each post id.
fn dedupe(posts: Vec<RemotePost>) -> Vec<RemotePost> {
    let mut seen = HashSet::with_capacity(posts.len());
    posts.into_iter().filter(|post| seen.insert(post.id)).collect()
}

/// A limit that is not a number trips the valve.
#[allow(clippy::cast_precision_loss)]
fn exceeds_ratio(candidates: usize, active: usize, limit: f64) -> bool {
    active > 0 && (limit.is_nan() || candidates as f64 / active as f64 > limit)
}
