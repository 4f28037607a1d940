//! HTTP-level tests for the Velog client against a mock GraphQL server.

use std::time::Duration;

use insight_client::{
    ClientError, ClientOptions, ContentApi, CurrentUserLookup, Credentials, PaginationOptions,
    RetryPolicy, VelogClient,
};
use insight_core::PostUuid;
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> VelogClient {
    VelogClient::new(ClientOptions {
        api_url: format!("{}/graphql", server.uri()),
        stats_url: format!("{}/stats/graphql", server.uri()),
        timeout_seconds: 5,
        ..ClientOptions::default()
    })
    .unwrap()
}

fn creds() -> Credentials {
    Credentials::new("acc", "ref")
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

fn post_json(id: &PostUuid, title: &str) -> serde_json::Value {
    json!({
        "id": id.to_string(),
        "title": title,
        "url_slug": title.to_lowercase(),
        "released_at": "2025-03-01T00:00:00.000Z",
        "likes": 2
    })
}

// ============================================================================
// Current User
// ============================================================================

#[tokio::test]
async fn test_current_user_sends_cookies_and_reads_rotation() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("cookie", "access_token=acc; refresh_token=ref"))
        .and(header("origin", "https://velog.io"))
        .and(body_string_contains("currentUser"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "data": {
                        "currentUser": {
                            "id": "u-1",
                            "username": "writer",
                            "email": "writer@example.com",
                            "profile": { "thumbnail": "https://img/t.png" }
                        }
                    }
                }))
                .append_header("set-cookie", "access_token=new-acc; Path=/; HttpOnly"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let lookup = client_for(&server).fetch_current_user(&creds()).await;

    let CurrentUserLookup::Authenticated { user, cookies } = lookup else {
        panic!("expected authenticated lookup, got {lookup:?}");
    };
    assert_eq!(user.username, "writer");
    assert_eq!(user.email.as_deref(), Some("writer@example.com"));
    assert_eq!(user.thumbnail.as_deref(), Some("https://img/t.png"));
    assert_eq!(cookies.access_token.as_deref(), Some("new-acc"));
    assert_eq!(cookies.refresh_token, None);
}

#[tokio::test]
async fn test_current_user_null_is_anonymous() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": { "currentUser": null } })),
        )
        .mount(&server)
        .await;

    let lookup = client_for(&server).fetch_current_user(&creds()).await;
    assert_eq!(lookup, CurrentUserLookup::Anonymous);
}

#[tokio::test]
async fn test_current_user_server_error_is_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let lookup = client_for(&server).fetch_current_user(&creds()).await;
    assert_eq!(lookup, CurrentUserLookup::Unavailable);
}

#[tokio::test]
async fn test_current_user_connection_failure_is_unavailable() {
    let client = VelogClient::new(ClientOptions {
        api_url: "http://127.0.0.1:1/graphql".to_string(),
        timeout_seconds: 2,
        ..ClientOptions::default()
    })
    .unwrap();

    let lookup = client.fetch_current_user(&creds()).await;
    assert_eq!(lookup, CurrentUserLookup::Unavailable);
}

// ============================================================================
// Post Listing
// ============================================================================

#[tokio::test]
async fn test_fetch_all_posts_follows_cursor_until_empty_page() {
    let server = MockServer::start().await;
    let first = PostUuid::generate();
    let second = PostUuid::generate();

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({
            "variables": { "input": { "cursor": "", "username": "writer", "limit": 50 } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "posts": [post_json(&first, "One")] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({
            "variables": { "input": { "cursor": first.to_string() } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "posts": [post_json(&second, "Two")] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({
            "variables": { "input": { "cursor": second.to_string() } }
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": { "posts": [] } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let posts = client_for(&server)
        .fetch_all_posts("writer", &creds(), PaginationOptions::default())
        .await
        .unwrap();

    let ids: Vec<PostUuid> = posts.iter().map(|post| post.id).collect();
    assert_eq!(ids, vec![first, second]);
    assert_eq!(posts[0].title, "One");
    assert_eq!(posts[0].likes, Some(2));
}

#[tokio::test]
async fn test_fetch_all_posts_discards_page_without_trailing_id() {
    let server = MockServer::start().await;
    let first = PostUuid::generate();

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({ "variables": { "input": { "cursor": "" } } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "posts": [post_json(&first, "One")] }
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({
            "variables": { "input": { "cursor": first.to_string() } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "posts": [
                post_json(&PostUuid::generate(), "Orphan"),
                { "title": "No id" }
            ] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let posts = client_for(&server)
        .fetch_all_posts("writer", &creds(), PaginationOptions::default())
        .await
        .unwrap();

    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].id, first);
}

#[tokio::test]
async fn test_fetch_all_posts_stops_at_page_cap() {
    let server = MockServer::start().await;

    // Every page ends with an id, so only the cap ends the walk.
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "posts": [post_json(&PostUuid::generate(), "Loop")] }
        })))
        .expect(3)
        .mount(&server)
        .await;

    let posts = client_for(&server)
        .fetch_all_posts(
            "writer",
            &creds(),
            PaginationOptions {
                page_size: 1,
                max_pages: 3,
            },
        )
        .await
        .unwrap();

    assert_eq!(posts.len(), 3);
}

#[tokio::test]
async fn test_fetch_all_posts_propagates_page_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let result = client_for(&server)
        .fetch_all_posts("writer", &creds(), PaginationOptions::default())
        .await;

    assert!(matches!(
        result,
        Err(ClientError::Status { status: 500, .. })
    ));
}

// ============================================================================
// Statistics
// ============================================================================

#[tokio::test]
async fn test_fetch_post_stats_requests_views_and_likes() {
    let server = MockServer::start().await;
    let post_id = PostUuid::generate();

    Mock::given(method("POST"))
        .and(path("/stats/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "getStats": { "id": post_id.to_string(), "likes": 4, "views": 120 }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let stats = client_for(&server)
        .fetch_post_stats_once(post_id, &creds())
        .await
        .unwrap();

    assert_eq!(stats.views, 120);
    assert_eq!(stats.likes, Some(4));

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let query = body["query"].as_str().unwrap();
    assert!(query.contains("likes"));
    assert!(query.contains("views"));
}

#[tokio::test]
async fn test_fetch_post_stats_reads_legacy_total() {
    let server = MockServer::start().await;
    let post_id = PostUuid::generate();

    Mock::given(method("POST"))
        .and(path("/stats/graphql"))
        .and(body_partial_json(json!({
            "operationName": "GetStats",
            "variables": { "post_id": post_id.to_string() }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": { "getStats": { "total": 100 } } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let stats = client_for(&server)
        .fetch_post_stats(post_id, &creds(), fast_retry())
        .await
        .unwrap();

    assert_eq!(stats.views, 100);
    assert_eq!(stats.likes, None);
}

#[tokio::test]
async fn test_fetch_post_stats_rejects_non_json_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/stats/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let result = client_for(&server)
        .fetch_post_stats_once(PostUuid::generate(), &creds())
        .await;

    assert!(matches!(result, Err(ClientError::UnexpectedContentType(_))));
}

#[tokio::test]
async fn test_fetch_post_stats_gives_up_after_three_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/stats/graphql"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let stats = client_for(&server)
        .fetch_post_stats(PostUuid::generate(), &creds(), fast_retry())
        .await;

    assert!(stats.is_none());
}

#[tokio::test]
async fn test_fetch_post_stats_recovers_on_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/stats/graphql"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/stats/graphql"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": { "getStats": { "total": 7 } } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let stats = client_for(&server)
        .fetch_post_stats(PostUuid::generate(), &creds(), fast_retry())
        .await
        .unwrap();

    assert_eq!(stats.views, 7);
}
