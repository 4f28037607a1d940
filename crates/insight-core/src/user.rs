//! User credential records.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{UserId, VelogUuid};

/// A dashboard user as stored locally.
///
/// Tokens are kept encrypted; see the crate docs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Local primary key.
    pub id: UserId,

    /// The blog platform's id for this user.
    pub velog_uuid: VelogUuid,

    /// Encrypted access token (base64 of IV and ciphertext).
    pub access_token: String,

    /// Encrypted refresh token (base64 of IV and ciphertext).
    pub refresh_token: String,

    /// Group used for key sharding and batch partitioning.
    pub group_id: i32,

    /// Cached email, if the platform exposes one.
    pub email: Option<String>,

    /// Cached username.
    pub username: Option<String>,

    /// Cached profile thumbnail URL.
    pub thumbnail: Option<String>,

    /// Whether the user is active.
    pub is_active: bool,
}

impl User {
    /// Compute the profile fields that differ from the cached values.
    ///
    /// Remote fields that are absent are treated as unknown and never clear
    /// a cached value.
    #[must_use]
    pub fn profile_changes(
        &self,
        email: Option<&str>,
        username: Option<&str>,
        thumbnail: Option<&str>,
    ) -> ProfileUpdate {
        fn changed(cached: Option<&String>, remote: Option<&str>) -> Option<String> {
            match remote {
                Some(value) if cached.map(String::as_str) != Some(value) => Some(value.to_string()),
                _ => None,
            }
        }

        ProfileUpdate {
            email: changed(self.email.as_ref(), email),
            username: changed(self.username.as_ref(), username),
            thumbnail: changed(self.thumbnail.as_ref(), thumbnail),
        }
    }

    /// Apply a profile update in place.
    pub fn apply_profile(&mut self, update: &ProfileUpdate) {
        if let Some(email) = &update.email {
            self.email = Some(email.clone());
        }
        if let Some(username) = &update.username {
            self.username = Some(username.clone());
        }
        if let Some(thumbnail) = &update.thumbnail {
            self.thumbnail = Some(thumbnail.clone());
        }
    }

    /// Apply a token update in place.
    pub fn apply_tokens(&mut self, update: &TokenUpdate) {
        if let Some(access) = &update.access_token {
            self.access_token.clone_from(access);
        }
        if let Some(refresh) = &update.refresh_token {
            self.refresh_token.clone_from(refresh);
        }
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("velog_uuid", &self.velog_uuid)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("group_id", &self.group_id)
            .field("email", &self.email)
            .field("username", &self.username)
            .field("thumbnail", &self.thumbnail)
            .field("is_active", &self.is_active)
            .finish()
    }
}

/// Rotated tokens to persist. Values are already encrypted.
///
/// Only the fields that actually changed are set.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TokenUpdate {
    /// New encrypted access token.
    pub access_token: Option<String>,
    /// New encrypted refresh token.
    pub refresh_token: Option<String>,
}

impl TokenUpdate {
    /// True when there is nothing to write.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

impl fmt::Debug for TokenUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenUpdate")
            .field("access_token", &self.access_token.is_some())
            .field("refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// Profile fields to persist. Only changed fields are set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    /// New email.
    pub email: Option<String>,
    /// New username.
    pub username: Option<String>,
    /// New thumbnail URL.
    pub thumbnail: Option<String>,
}

impl ProfileUpdate {
    /// True when there is nothing to write.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.username.is_none() && self.thumbnail.is_none()
    }
}
