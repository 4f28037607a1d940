//! Request and response types for the content API.
//!
//! Wire shapes (`Wire*`, `*Data`) are private to the crate and decoded into the
//! public types at the client boundary, so callers never handle raw JSON.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use insight_core::PostUuid;

use crate::error::ClientError;

// ============================================================================
// Public Types
// ============================================================================

/// Plaintext token pair used to authenticate against the content API.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
}

impl Credentials {
    /// Create a token pair.
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// The synthesized `cookie` header value.
    #[must_use]
    pub fn cookie_header(&self) -> String {
        format!(
            "access_token={}; refresh_token={}",
            self.access_token, self.refresh_token
        )
    }

    /// Apply rotated cookies, returning the credentials to use from now on.
    #[must_use]
    pub fn rotated(&self, cookies: &SessionCookies) -> Self {
        Self {
            access_token: cookies
                .access_token
                .clone()
                .unwrap_or_else(|| self.access_token.clone()),
            refresh_token: cookies
                .refresh_token
                .clone()
                .unwrap_or_else(|| self.refresh_token.clone()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(<redacted>)")
    }
}

/// Token cookies set by the API on a response.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionCookies {
    /// `access_token` cookie, when present.
    pub access_token: Option<String>,
    /// `refresh_token` cookie, when present.
    pub refresh_token: Option<String>,
}

impl fmt::Debug for SessionCookies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCookies")
            .field("access_token", &self.access_token.is_some())
            .field("refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// The authenticated user as reported by the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUser {
    /// Platform user id.
    pub id: String,
    /// Username, used to list posts.
    pub username: String,
    /// Email; often empty for OAuth accounts.
    pub email: Option<String>,
    /// Profile thumbnail URL.
    pub thumbnail: Option<String>,
}

/// Result of the current-user lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentUserLookup {
    /// Transport or decoding failure; try again on a later run.
    Unavailable,
    /// The API answered but reports no current user: the tokens are invalid.
    Anonymous,
    /// The tokens are valid.
    Authenticated {
        /// The user behind the tokens.
        user: RemoteUser,
        /// Token cookies returned with the response.
        cookies: SessionCookies,
    },
}

/// One raw entry of a post listing page.
///
/// `id` stays optional because pagination must stop on an entry without one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PageEntry {
    /// Post id, also the cursor for the next page.
    #[serde(default)]
    pub id: Option<String>,
    /// Title.
    #[serde(default)]
    pub title: Option<String>,
    /// URL slug.
    #[serde(default)]
    pub url_slug: Option<String>,
    /// Publication time as sent by the API (RFC 3339).
    #[serde(default)]
    pub released_at: Option<String>,
    /// Like count, when the listing carries it.
    #[serde(default)]
    pub likes: Option<u64>,
}

/// A post from the remote listing, with a validated id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePost {
    /// External id.
    pub id: PostUuid,
    /// Title.
    pub title: String,
    /// URL slug.
    pub url_slug: String,
    /// Publication time.
    pub released_at: Option<DateTime<Utc>>,
    /// Like count from the listing, if any.
    pub likes: Option<u64>,
}

impl TryFrom<PageEntry> for RemotePost {
    type Error = ClientError;

    fn try_from(entry: PageEntry) -> Result<Self, Self::Error> {
        let id = entry
            .id
            .as_deref()
            .and_then(|raw| raw.parse().ok())
            .ok_or(ClientError::MissingField("posts.id"))?;
        let released_at = entry
            .released_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|at| at.with_timezone(&Utc));

        Ok(Self {
            id,
            title: entry.title.unwrap_or_default(),
            url_slug: entry.url_slug.unwrap_or_default(),
            released_at,
            likes: entry.likes,
        })
    }
}

/// Engagement statistics of one post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostStats {
    /// Total views.
    pub views: u64,
    /// Total likes, when the endpoint reports them.
    pub likes: Option<u64>,
}

// ============================================================================
// Wire Types
// ============================================================================

/// GraphQL request body.
#[derive(Debug, Serialize)]
pub(crate) struct GraphQlRequest<'a, V: Serialize> {
    pub query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<V>,
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<&'a str>,
}

/// GraphQL response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse<T> {
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CurrentUserData {
    #[serde(rename = "currentUser", default)]
    pub current_user: Option<WireUser>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub profile: Option<WireProfile>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireProfile {
    #[serde(default)]
    pub thumbnail: Option<String>,
}

impl From<WireUser> for RemoteUser {
    fn from(user: WireUser) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email.filter(|email| !email.is_empty()),
            thumbnail: user.profile.and_then(|profile| profile.thumbnail),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PostsVariables<'a> {
    pub input: PostsInput<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PostsInput<'a> {
    pub cursor: &'a str,
    pub username: &'a str,
    pub limit: u32,
    pub tag: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostsData {
    #[serde(default)]
    pub posts: Option<Vec<PageEntry>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StatsVariables {
    pub post_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatsData {
    #[serde(rename = "getStats", default)]
    pub get_stats: Option<WireStats>,
}

/// `{ id, likes, views }`. Older deployments answer with `{ total }` only.
#[derive(Debug, Deserialize)]
pub(crate) struct WireStats {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub views: Option<u64>,
    #[serde(default)]
    pub likes: Option<u64>,
}

impl TryFrom<WireStats> for PostStats {
    type Error = ClientError;

    fn try_from(stats: WireStats) -> Result<Self, Self::Error> {
        let views = stats
            .views
            .or(stats.total)
            .ok_or(ClientError::MissingField("getStats.views"))?;
        Ok(Self {
            views,
            likes: stats.likes,
        })
    }
}
