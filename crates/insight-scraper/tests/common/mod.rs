//! Shared fixtures for scraper integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use insight_client::{
    ClientError, ContentApi, CurrentUserLookup, Credentials, PageEntry, PostStats, RemoteUser,
    SessionCookies,
};
use insight_core::{Post, PostId, PostUuid, User, UserId, VelogUuid};
use insight_scraper::{KeyRing, ScrapeConfig};
use insight_store::MemoryStore;

pub const ACCESS: &str = "plain-access";
pub const REFRESH: &str = "plain-refresh";

/// Scripted content API. Serves its posts as one page followed by an empty
/// page, and answers stats only for posts it has stats for.
pub struct FakeApi {
    pub lookup: Mutex<CurrentUserLookup>,
    pub posts: Mutex<Vec<PageEntry>>,
    pub stats: Mutex<HashMap<PostUuid, PostStats>>,
    pub stats_calls: AtomicU32,
    /// Credentials seen by `fetch_posts_page`, in call order.
    pub listing_creds: Mutex<Vec<Credentials>>,
}

impl FakeApi {
    pub fn authenticated(username: &str) -> Self {
        Self::with_lookup(CurrentUserLookup::Authenticated {
            user: RemoteUser {
                id: "remote-id".to_string(),
                username: username.to_string(),
                email: None,
                thumbnail: None,
            },
            cookies: SessionCookies::default(),
        })
    }

    pub fn with_lookup(lookup: CurrentUserLookup) -> Self {
        Self {
            lookup: Mutex::new(lookup),
            posts: Mutex::new(Vec::new()),
            stats: Mutex::new(HashMap::new()),
            stats_calls: AtomicU32::new(0),
            listing_creds: Mutex::new(Vec::new()),
        }
    }

    pub fn add_post(&self, id: PostUuid, title: &str) {
        self.add_post_with_likes(id, title, None);
    }

    pub fn add_post_with_likes(&self, id: PostUuid, title: &str, likes: Option<u64>) {
        self.posts.lock().unwrap().push(PageEntry {
            id: Some(id.to_string()),
            title: Some(title.to_string()),
            url_slug: Some(title.to_lowercase().replace(' ', "-")),
            released_at: Some("2025-03-01T00:00:00Z".to_string()),
            likes,
        });
    }

    pub fn set_stats(&self, id: PostUuid, views: u64, likes: Option<u64>) {
        self.stats
            .lock()
            .unwrap()
            .insert(id, PostStats { views, likes });
    }

    pub fn set_lookup(&self, lookup: CurrentUserLookup) {
        *self.lookup.lock().unwrap() = lookup;
    }

    pub fn stats_calls(&self) -> u32 {
        self.stats_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentApi for FakeApi {
    async fn fetch_current_user(&self, _creds: &Credentials) -> CurrentUserLookup {
        self.lookup.lock().unwrap().clone()
    }

    async fn fetch_posts_page(
        &self,
        _username: &str,
        cursor: &str,
        _limit: u32,
        creds: &Credentials,
    ) -> Result<Vec<PageEntry>, ClientError> {
        self.listing_creds.lock().unwrap().push(creds.clone());
        if cursor.is_empty() {
            Ok(self.posts.lock().unwrap().clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn fetch_post_stats_once(
        &self,
        post_id: PostUuid,
        _creds: &Credentials,
    ) -> Result<PostStats, ClientError> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        self.stats
            .lock()
            .unwrap()
            .get(&post_id)
            .copied()
            .ok_or(ClientError::MissingField("getStats"))
    }
}

pub fn key_ring() -> KeyRing {
    KeyRing::from_keys((0..10u8).map(|shard| [b'a' + shard; 32])).unwrap()
}

pub fn config() -> ScrapeConfig {
    ScrapeConfig {
        batch_size: 2,
        chunk_size: 2,
        max_connections: 4,
        ..ScrapeConfig::default()
    }
}

/// A user whose stored tokens decrypt to [`ACCESS`] and [`REFRESH`].
pub fn user(id: i64, group_id: i32) -> User {
    let ring = key_ring();
    let codec = ring.codec_for(group_id);
    User {
        id: UserId(id),
        velog_uuid: VelogUuid::generate(),
        access_token: codec.encrypt(ACCESS),
        refresh_token: codec.encrypt(REFRESH),
        group_id,
        email: None,
        username: Some("writer".to_string()),
        thumbnail: None,
        is_active: true,
    }
}

pub fn local_post(id: i64, user_id: UserId, post_uuid: PostUuid, active: bool) -> Post {
    Post {
        id: PostId(id),
        post_uuid,
        user_id,
        title: format!("Post {id}"),
        slug: format!("post-{id}"),
        released_at: Some(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()),
        is_active: active,
    }
}

pub fn store_with(users: &[User]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for user in users {
        store.insert_user(user.clone());
    }
    store
}
