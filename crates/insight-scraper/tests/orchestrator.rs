//! Worker partitioning and failure isolation.

mod common;

use std::sync::Arc;

use insight_client::{ClientError, ContentApi, CurrentUserLookup};
use insight_core::{PostUuid, UserId};
use insight_scraper::{ApiFactory, Orchestrator, ScrapeConfig};
use insight_store::{MemoryStore, Store};

use common::{config, key_ring, local_post, store_with, user, FakeApi};

fn factory(api: &Arc<FakeApi>) -> ApiFactory {
    let api = Arc::clone(api);
    Arc::new(move || Ok(Arc::clone(&api) as Arc<dyn ContentApi>))
}

fn orchestrator(
    store: &Arc<MemoryStore>,
    api: &Arc<FakeApi>,
    config: ScrapeConfig,
) -> Orchestrator {
    Orchestrator::with_api_factory(store.clone(), key_ring(), config, factory(api))
}

#[tokio::test(start_paused = true)]
async fn test_range_run_covers_every_group_once() {
    let users: Vec<_> = (1..=6).map(|n| user(n, n as i32 * 10)).collect();
    let store = store_with(&users);
    let api = Arc::new(FakeApi::authenticated("writer"));

    let summary = orchestrator(&store, &api, config()).run_range(1, 60).await;

    assert_eq!(summary.workers.len(), 3);
    assert_eq!(summary.processed(), 6);
    assert_eq!(summary.failed(), 0);
    // One empty listing page per user.
    assert_eq!(api.listing_creds.lock().unwrap().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_range_run_ignores_groups_outside_range() {
    let store = store_with(&[user(1, 5), user(2, 500)]);
    let api = Arc::new(FakeApi::authenticated("writer"));

    let summary = orchestrator(&store, &api, config()).run_range(1, 100).await;

    assert_eq!(summary.processed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failing_user_does_not_stop_worker() {
    let mut broken = user(1, 1);
    broken.refresh_token = "garbage".to_string();
    let store = store_with(&[broken, user(2, 2), user(3, 3)]);
    let api = Arc::new(FakeApi::authenticated("writer"));

    let config = ScrapeConfig {
        range_workers: 1,
        ..config()
    };
    let summary = orchestrator(&store, &api, config).run_range(1, 3).await;

    assert_eq!(summary.workers.len(), 1);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.processed(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_credentials_count_as_skipped() {
    let store = store_with(&[user(1, 1), user(2, 2)]);
    let api = Arc::new(FakeApi::with_lookup(CurrentUserLookup::Anonymous));

    let summary = orchestrator(&store, &api, config()).run_range(1, 2).await;

    assert_eq!(summary.skipped(), 2);
    assert_eq!(summary.processed(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_session_failure_aborts_workers_cleanly() {
    let store = store_with(&[user(1, 1), user(2, 2)]);
    let factory: ApiFactory =
        Arc::new(|| Err(ClientError::Configuration("no TLS backend".to_string())));
    let orchestrator =
        Orchestrator::with_api_factory(store.clone(), key_ring(), config(), factory);

    let summary = orchestrator.run_range(1, 2).await;

    assert_eq!(summary.aborted(), 2);
    assert_eq!(summary.processed(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_user_list_run_follows_given_ids() {
    let store = store_with(&[user(1, 1), user(2, 2), user(3, 3)]);
    let api = Arc::new(FakeApi::authenticated("writer"));

    let summary = orchestrator(&store, &api, config())
        .run_for_users(&[UserId(3), UserId(1), UserId(99)], 2)
        .await;

    assert_eq!(summary.workers.len(), 2);
    assert_eq!(summary.processed(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_target_run_picks_above_average_users() {
    let store = store_with(&[user(1, 1), user(2, 2), user(3, 3)]);
    for n in 0..4 {
        store.insert_post(local_post(n + 1, UserId(2), PostUuid::generate(), true));
    }
    let api = Arc::new(FakeApi::authenticated("writer"));

    let summary = orchestrator(&store, &api, config())
        .run_targets()
        .await
        .unwrap();

    assert_eq!(summary.processed(), 1);
    assert_eq!(api.listing_creds.lock().unwrap().len(), 1);
    assert_eq!(
        store.users_above_average_post_count().await.unwrap(),
        vec![UserId(2)]
    );
}
