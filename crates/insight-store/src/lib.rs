//! Storage layer for the Velog insight scraper.
//!
//! This crate persists users, posts and daily statistics behind the [`Store`]
//! trait. Two backends are provided:
//!
//! - [`PgStore`]: PostgreSQL via `sqlx`, with embedded migrations
//! - [`MemoryStore`]: in-process maps, for tests and dry runs
//!
//! # Transactions
//!
//! [`Store::upsert_posts`] and [`Store::upsert_daily_statistics`] are each
//! atomic on their own. Nothing in this trait opens a transaction that spans
//! more than one call, so a failure late in a user's pass never rolls back
//! work committed earlier.
//!
//! # Example
//!
//! ```no_run
//! use insight_store::{PgStore, Store};
//!
//! # async fn example() -> insight_store::Result<()> {
//! let store = PgStore::connect("postgres://localhost/insight", 10).await?;
//! store.migrate().await?;
//!
//! let users = store.users_in_group_range(1..=100).await?;
//! println!("{} users to scrape", users.len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod postgres;

use std::ops::RangeInclusive;

use async_trait::async_trait;
use chrono::NaiveDate;

use insight_core::{
    DailyStatistics, Post, PostId, PostUpsert, PostUuid, ProfileUpdate, StatisticsWrite,
    TokenUpdate, UpsertOutcome, User, UserId,
};

pub use error::{Result, StoreError};
pub use memory::{FailPoint, MemoryStore};
pub use postgres::PgStore;

/// The storage trait defining all persistence operations of the pipeline.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // User Operations
    // =========================================================================

    /// List users whose `group_id` falls in `groups`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn users_in_group_range(&self, groups: RangeInclusive<i32>) -> Result<Vec<User>>;

    /// Load users by primary key, in the order given. Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn users_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>>;

    /// Ids of users owning more posts than the per-user average, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn users_above_average_post_count(&self) -> Result<Vec<UserId>>;

    /// Persist rotated (already encrypted) tokens. Only set fields are written.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user doesn't exist.
    async fn update_user_tokens(&self, user_id: UserId, update: &TokenUpdate) -> Result<()>;

    /// Persist changed profile fields. Only set fields are written.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user doesn't exist.
    async fn update_user_profile(&self, user_id: UserId, update: &ProfileUpdate) -> Result<()>;

    // =========================================================================
    // Post Operations
    // =========================================================================

    /// Upsert one batch of posts for a user inside a single transaction.
    ///
    /// Existing rows (matched by external id) get their title, slug and
    /// release time refreshed when they differ; unseen ids are inserted as
    /// active.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing from the batch is
    /// committed in that case.
    async fn upsert_posts(&self, user_id: UserId, posts: &[PostUpsert]) -> Result<UpsertOutcome>;

    /// All posts owned by a user, active or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn posts_for_user(&self, user_id: UserId) -> Result<Vec<Post>>;

    /// Set `is_active` on the user's posts with the given external ids.
    ///
    /// Returns the number of rows whose flag actually flipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn set_posts_active(
        &self,
        user_id: UserId,
        post_uuids: &[PostUuid],
        active: bool,
    ) -> Result<u64>;

    // =========================================================================
    // Statistics Operations
    // =========================================================================

    /// Get-or-create the `(post, date)` statistics row and write the counts.
    ///
    /// Runs in its own short transaction. Returns `None` when no post with
    /// this external id exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn upsert_daily_statistics(
        &self,
        post_uuid: PostUuid,
        date: NaiveDate,
        view_count: u64,
        like_count: u64,
    ) -> Result<Option<StatisticsWrite>>;

    /// Read the statistics row for `(post, date)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn daily_statistics(
        &self,
        post_id: PostId,
        date: NaiveDate,
    ) -> Result<Option<DailyStatistics>>;
}
