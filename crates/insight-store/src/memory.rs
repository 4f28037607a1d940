//! In-memory storage implementation.
//!
//! `MemoryStore` mirrors the semantics of [`crate::PgStore`] closely enough to
//! drive the whole scraping pipeline in tests. Individual operations can be
//! made to fail with [`MemoryStore::fail`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;

use insight_core::{
    DailyStatistics, Post, PostId, PostUpsert, PostUuid, ProfileUpdate, StatisticsWrite,
    TokenUpdate, UpsertOutcome, User, UserId,
};

use crate::error::{Result, StoreError};
use crate::Store;

/// Operations that can be made to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// `update_user_tokens`.
    TokenUpdate,
    /// `update_user_profile`.
    ProfileUpdate,
    /// `upsert_posts`.
    PostUpsert,
    /// `set_posts_active`.
    ActiveSync,
    /// `upsert_daily_statistics`.
    DailyStatistics,
}

impl FailPoint {
    const fn label(self) -> &'static str {
        match self {
            Self::TokenUpdate => "token update",
            Self::ProfileUpdate => "profile update",
            Self::PostUpsert => "post upsert",
            Self::ActiveSync => "active sync",
            Self::DailyStatistics => "daily statistics",
        }
    }
}

/// Write counters, for asserting that no-op paths really skip the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    /// Calls to `update_user_tokens`.
    pub token_updates: usize,
    /// Calls to `update_user_profile`.
    pub profile_updates: usize,
    /// Calls to `upsert_posts`.
    pub post_batches: usize,
}

#[derive(Default)]
struct State {
    users: BTreeMap<UserId, User>,
    posts: BTreeMap<PostId, Post>,
    post_index: HashMap<PostUuid, PostId>,
    statistics: BTreeMap<(PostId, NaiveDate), DailyStatistics>,
    next_post_id: i64,
    failures: HashSet<FailPoint>,
    writes: WriteCounts,
}

impl State {
    fn check(&self, point: FailPoint) -> Result<()> {
        if self.failures.contains(&point) {
            return Err(StoreError::Injected(point.label()));
        }
        Ok(())
    }

    fn user_mut(&mut self, user_id: UserId) -> Result<&mut User> {
        self.users.get_mut(&user_id).ok_or(StoreError::NotFound {
            entity: "user",
            id: user_id.to_string(),
        })
    }
}

/// Map-backed storage implementation.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a user record.
    pub fn insert_user(&self, user: User) {
        self.state().users.insert(user.id, user);
    }

    /// Insert a post row directly, bypassing upsert bookkeeping.
    pub fn insert_post(&self, post: Post) {
        let mut state = self.state();
        state.next_post_id = state.next_post_id.max(post.id.get());
        state.post_index.insert(post.post_uuid, post.id);
        state.posts.insert(post.id, post);
    }

    /// Snapshot of a user record.
    #[must_use]
    pub fn user(&self, user_id: UserId) -> Option<User> {
        self.state().users.get(&user_id).cloned()
    }

    /// Snapshot of a post by external id.
    #[must_use]
    pub fn post(&self, post_uuid: PostUuid) -> Option<Post> {
        let state = self.state();
        state
            .post_index
            .get(&post_uuid)
            .and_then(|id| state.posts.get(id))
            .cloned()
    }

    /// Number of statistics rows across all posts and days.
    #[must_use]
    pub fn statistics_count(&self) -> usize {
        self.state().statistics.len()
    }

    /// Make every later call of `point` fail until [`MemoryStore::heal`].
    pub fn fail(&self, point: FailPoint) {
        self.state().failures.insert(point);
    }

    /// Remove an injected failure.
    pub fn heal(&self, point: FailPoint) {
        self.state().failures.remove(&point);
    }

    /// Write counters since creation.
    #[must_use]
    pub fn write_counts(&self) -> WriteCounts {
        self.state().writes
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn users_in_group_range(&self, groups: RangeInclusive<i32>) -> Result<Vec<User>> {
        Ok(self
            .state()
            .users
            .values()
            .filter(|user| groups.contains(&user.group_id))
            .cloned()
            .collect())
    }

    async fn users_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>> {
        let state = self.state();
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }

    async fn users_above_average_post_count(&self) -> Result<Vec<UserId>> {
        let state = self.state();
        if state.users.is_empty() {
            return Ok(Vec::new());
        }

        let mut counts: BTreeMap<UserId, usize> =
            state.users.keys().map(|id| (*id, 0)).collect();
        for post in state.posts.values() {
            if let Some(count) = counts.get_mut(&post.user_id) {
                *count += 1;
            }
        }

        // Compare count * users > total instead of dividing.
        let total: usize = counts.values().sum();
        let users = counts.len();
        Ok(counts
            .into_iter()
            .rev()
            .filter(|(_, count)| count * users > total)
            .map(|(id, _)| id)
            .collect())
    }

    async fn update_user_tokens(&self, user_id: UserId, update: &TokenUpdate) -> Result<()> {
        let mut state = self.state();
        state.check(FailPoint::TokenUpdate)?;
        state.writes.token_updates += 1;
        state.user_mut(user_id)?.apply_tokens(update);
        Ok(())
    }

    async fn update_user_profile(&self, user_id: UserId, update: &ProfileUpdate) -> Result<()> {
        let mut state = self.state();
        state.check(FailPoint::ProfileUpdate)?;
        state.writes.profile_updates += 1;
        state.user_mut(user_id)?.apply_profile(update);
        Ok(())
    }

    async fn upsert_posts(&self, user_id: UserId, posts: &[PostUpsert]) -> Result<UpsertOutcome> {
        let mut state = self.state();
        state.check(FailPoint::PostUpsert)?;
        state.writes.post_batches += 1;

        let mut outcome = UpsertOutcome::default();
        for upsert in posts {
            match state.post_index.get(&upsert.post_uuid).copied() {
                Some(post_id) => {
                    let Some(post) = state.posts.get_mut(&post_id) else {
                        continue;
                    };
                    if post.differs_from(upsert) {
                        post.apply(upsert);
                        outcome.updated += 1;
                    } else {
                        outcome.unchanged += 1;
                    }
                }
                None => {
                    state.next_post_id += 1;
                    let post_id = PostId(state.next_post_id);
                    state.post_index.insert(upsert.post_uuid, post_id);
                    state.posts.insert(
                        post_id,
                        Post {
                            id: post_id,
                            post_uuid: upsert.post_uuid,
                            user_id,
                            title: upsert.title.clone(),
                            slug: upsert.slug.clone(),
                            released_at: upsert.released_at,
                            is_active: true,
                        },
                    );
                    outcome.created += 1;
                }
            }
        }
        Ok(outcome)
    }

    async fn posts_for_user(&self, user_id: UserId) -> Result<Vec<Post>> {
        Ok(self
            .state()
            .posts
            .values()
            .filter(|post| post.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn set_posts_active(
        &self,
        user_id: UserId,
        post_uuids: &[PostUuid],
        active: bool,
    ) -> Result<u64> {
        let mut state = self.state();
        state.check(FailPoint::ActiveSync)?;

        let targets: HashSet<&PostUuid> = post_uuids.iter().collect();
        let mut flipped = 0;
        for post in state.posts.values_mut() {
            if post.user_id == user_id && post.is_active != active && targets.contains(&post.post_uuid)
            {
                post.is_active = active;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn upsert_daily_statistics(
        &self,
        post_uuid: PostUuid,
        date: NaiveDate,
        view_count: u64,
        like_count: u64,
    ) -> Result<Option<StatisticsWrite>> {
        let mut state = self.state();
        state.check(FailPoint::DailyStatistics)?;

        let Some(post_id) = state.post_index.get(&post_uuid).copied() else {
            return Ok(None);
        };

        let row = DailyStatistics {
            post_id,
            date,
            daily_view_count: view_count,
            daily_like_count: like_count,
        };
        let write = match state.statistics.insert((post_id, date), row) {
            Some(_) => StatisticsWrite::Updated,
            None => StatisticsWrite::Created,
        };
        Ok(Some(write))
    }

    async fn daily_statistics(
        &self,
        post_id: PostId,
        date: NaiveDate,
    ) -> Result<Option<DailyStatistics>> {
        Ok(self.state().statistics.get(&(post_id, date)).cloned())
    }
}
