//! Batch orchestration across parallel workers.
//!
//! Users are partitioned either by `group_id` range or by an explicit id
//! list. Each partition gets one tokio task that owns its own API client and
//! stats semaphore and processes its users one at a time.

use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use futures::future::join_all;

use insight_client::{ClientError, ContentApi, VelogClient};
use insight_core::{User, UserId};
use insight_store::{Store, StoreError};

use crate::config::ScrapeConfig;
use crate::crypto::KeyRing;
use crate::reconcile::{Scraper, UserOutcome};

/// Builds one API client per worker.
pub type ApiFactory = Arc<dyn Fn() -> Result<Arc<dyn ContentApi>, ClientError> + Send + Sync>;

/// Split `[min, max]` into at most `workers` contiguous, disjoint ranges.
///
/// The first `len % workers` ranges get one extra group. An empty input
/// range yields no partitions.
#[must_use]
pub fn split_range(min: i32, max: i32, workers: usize) -> Vec<RangeInclusive<i32>> {
    if min > max {
        return Vec::new();
    }

    let total = i64::from(max) - i64::from(min) + 1;
    let workers = i64::try_from(workers.max(1)).unwrap_or(i64::MAX).min(total);
    let (base, extra) = (total / workers, total % workers);

    let mut ranges = Vec::new();
    let mut start = i64::from(min);
    for index in 0..workers {
        let len = base + i64::from(index < extra);
        let end = start + len - 1;
        if let (Ok(lo), Ok(hi)) = (i32::try_from(start), i32::try_from(end)) {
            ranges.push(lo..=hi);
        }
        start = end + 1;
    }
    ranges
}

/// Split `items` into at most `workers` contiguous parts, sizes differing by
/// at most one. Empty parts are dropped.
#[must_use]
pub fn split_list<T: Clone>(items: &[T], workers: usize) -> Vec<Vec<T>> {
    let workers = workers.max(1).min(items.len());
    if workers == 0 {
        return Vec::new();
    }

    let (base, extra) = (items.len() / workers, items.len() % workers);
    let mut parts = Vec::with_capacity(workers);
    let mut start = 0;
    for index in 0..workers {
        let len = base + usize::from(index < extra);
        parts.push(items[start..start + len].to_vec());
        start += len;
    }
    parts
}

/// The users one worker is responsible for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Partition {
    /// Every user whose `group_id` is in the range.
    Groups(RangeInclusive<i32>),
    /// These users, in this order.
    Users(Vec<UserId>),
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Groups(range) => write!(f, "groups {}..={}", range.start(), range.end()),
            Self::Users(ids) => {
                let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                write!(f, "users [{}]", ids.join(", "))
            }
        }
    }
}

/// Per-worker counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    /// Worker index.
    pub worker: usize,
    /// Users whose pass completed.
    pub processed: usize,
    /// Users skipped for invalid credentials or an unreachable API.
    pub skipped: usize,
    /// Users whose pass failed.
    pub failed: usize,
    /// Whether the worker stopped before working through its partition.
    pub aborted: bool,
}

/// Counters for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// One entry per worker, in partition order.
    pub workers: Vec<WorkerSummary>,
}

impl RunSummary {
    /// Total users processed across workers.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.workers.iter().map(|w| w.processed).sum()
    }

    /// Total users skipped across workers.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.workers.iter().map(|w| w.skipped).sum()
    }

    /// Total users failed across workers.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.workers.iter().map(|w| w.failed).sum()
    }

    /// Workers that did not finish their partition.
    #[must_use]
    pub fn aborted(&self) -> usize {
        self.workers.iter().filter(|w| w.aborted).count()
    }
}

/// Drives scraping passes over partitions of the user population.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn Store>,
    keys: Arc<KeyRing>,
    config: Arc<ScrapeConfig>,
    api_factory: ApiFactory,
}

impl Orchestrator {
    /// Create an orchestrator whose workers talk to the real API.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, keys: KeyRing, config: ScrapeConfig) -> Self {
        let options = config.client_options();
        let api_factory: ApiFactory = Arc::new(move || {
            let client = VelogClient::new(options.clone())?;
            Ok(Arc::new(client) as Arc<dyn ContentApi>)
        });
        Self::with_api_factory(store, keys, config, api_factory)
    }

    /// Create an orchestrator with a custom client factory.
    #[must_use]
    pub fn with_api_factory(
        store: Arc<dyn Store>,
        keys: KeyRing,
        config: ScrapeConfig,
        api_factory: ApiFactory,
    ) -> Self {
        Self {
            store,
            keys: Arc::new(keys),
            config: Arc::new(config),
            api_factory,
        }
    }

    /// Scrape every user with `group_id` in `[min_group, max_group]`, split
    /// across the configured number of range workers.
    pub async fn run_range(&self, min_group: i32, max_group: i32) -> RunSummary {
        let partitions = split_range(min_group, max_group, self.config.range_workers)
            .into_iter()
            .map(Partition::Groups)
            .collect();

        tracing::info!(min_group, max_group, "Starting range run");
        self.run(partitions).await
    }

    /// Scrape users with more posts than average, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the target list cannot be loaded.
    pub async fn run_targets(&self) -> Result<RunSummary, StoreError> {
        let ids = self.store.users_above_average_post_count().await?;
        tracing::info!(targets = ids.len(), "Starting target run");
        Ok(self.run_for_users(&ids, self.config.target_workers).await)
    }

    /// Scrape an explicit list of users split across `workers`.
    pub async fn run_for_users(&self, ids: &[UserId], workers: usize) -> RunSummary {
        let partitions = split_list(ids, workers)
            .into_iter()
            .map(Partition::Users)
            .collect();
        self.run(partitions).await
    }

    async fn run(&self, partitions: Vec<Partition>) -> RunSummary {
        let handles: Vec<_> = partitions
            .into_iter()
            .enumerate()
            .map(|(worker, partition)| {
                let this = self.clone();
                tokio::spawn(async move { this.run_worker(worker, partition).await })
            })
            .collect();

        let workers = join_all(handles)
            .await
            .into_iter()
            .enumerate()
            .map(|(worker, joined)| {
                joined.unwrap_or_else(|e| {
                    tracing::error!(worker, error = %e, "Worker task failed");
                    WorkerSummary {
                        worker,
                        aborted: true,
                        ..WorkerSummary::default()
                    }
                })
            })
            .collect();

        let summary = RunSummary { workers };
        tracing::info!(
            processed = summary.processed(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            aborted_workers = summary.aborted(),
            "Run finished"
        );
        summary
    }

    async fn run_worker(&self, worker: usize, partition: Partition) -> WorkerSummary {
        let mut summary = WorkerSummary {
            worker,
            ..WorkerSummary::default()
        };
        tracing::info!(worker, partition = %partition, "Worker started");

        let api = match (self.api_factory)() {
            Ok(api) => api,
            Err(e) => {
                tracing::error!(worker, error = %e, "Failed to open API session");
                summary.aborted = true;
                return summary;
            }
        };

        let users = match self.load_users(&partition).await {
            Ok(users) => users,
            Err(e) => {
                tracing::error!(worker, error = %e, "Failed to load users");
                summary.aborted = true;
                return summary;
            }
        };

        let scraper = Scraper::new(
            Arc::clone(&self.store),
            api,
            Arc::clone(&self.keys),
            Arc::clone(&self.config),
        );

        for user in &users {
            match scraper.process_user(user).await {
                Ok(UserOutcome::Completed(_)) => summary.processed += 1,
                Ok(UserOutcome::InvalidCredentials | UserOutcome::Unavailable) => {
                    summary.skipped += 1;
                }
                Err(e) => {
                    tracing::error!(worker, user_id = %user.id, error = %e, "User pass failed");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            worker,
            partition = %partition,
            users = users.len(),
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            "Worker finished"
        );
        summary
    }

    async fn load_users(&self, partition: &Partition) -> Result<Vec<User>, StoreError> {
        match partition {
            Partition::Groups(range) => self.store.users_in_group_range(range.clone()).await,
            Partition::Users(ids) => self.store.users_by_ids(ids).await,
        }
    }
}
