//! Post records and upsert bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{PostId, PostUuid, UserId};

/// Maximum stored title length, in characters.
pub const TITLE_MAX_CHARS: usize = 255;

/// A post as stored locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Local primary key.
    pub id: PostId,

    /// The blog platform's id for this post. Immutable.
    pub post_uuid: PostUuid,

    /// Owning user.
    pub user_id: UserId,

    /// Post title.
    pub title: String,

    /// URL slug.
    pub slug: String,

    /// When the post was published, if known.
    pub released_at: Option<DateTime<Utc>>,

    /// Whether the post appeared in the latest trusted remote listing.
    pub is_active: bool,
}

impl Post {
    /// Whether applying `upsert` would change any denormalized field.
    #[must_use]
    pub fn differs_from(&self, upsert: &PostUpsert) -> bool {
        self.title != upsert.title
            || self.slug != upsert.slug
            || self.released_at != upsert.released_at
    }

    /// Overwrite the denormalized fields from `upsert`.
    pub fn apply(&mut self, upsert: &PostUpsert) {
        self.title.clone_from(&upsert.title);
        self.slug.clone_from(&upsert.slug);
        self.released_at = upsert.released_at;
    }
}

/// The remote view of a post, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostUpsert {
    /// External id, the upsert key.
    pub post_uuid: PostUuid,
    /// Title, clipped to [`TITLE_MAX_CHARS`].
    pub title: String,
    /// URL slug.
    pub slug: String,
    /// Publication time.
    pub released_at: Option<DateTime<Utc>>,
}

impl PostUpsert {
    /// Build an upsert, clipping the title to the stored length.
    #[must_use]
    pub fn new(
        post_uuid: PostUuid,
        title: &str,
        slug: impl Into<String>,
        released_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            post_uuid,
            title: title.chars().take(TITLE_MAX_CHARS).collect(),
            slug: slug.into(),
            released_at,
        }
    }
}

/// Counters from one upsert batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    /// Rows inserted.
    pub created: usize,
    /// Existing rows whose fields changed.
    pub updated: usize,
    /// Existing rows left as they were.
    pub unchanged: usize,
}

impl UpsertOutcome {
    /// Add another batch's counters to this one.
    pub fn merge(&mut self, other: Self) {
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
    }
}
