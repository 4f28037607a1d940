//! Core types for the Velog insight scraper.
//!
//! This crate provides the records shared by the store, the content API
//! client and the scraping pipeline:
//!
//! - **Identifiers**: `UserId`, `PostId` (local keys), `VelogUuid`, `PostUuid` (external ids)
//! - **Users**: `User`, `TokenUpdate`, `ProfileUpdate`
//! - **Posts**: `Post`, `PostUpsert`, `UpsertOutcome`
//! - **Statistics**: `DailyStatistics`, `StatisticsWrite`
//!
//! # Tokens at rest
//!
//! `User::access_token` and `User::refresh_token` always hold the encrypted,
//! base64-encoded form. Plaintext tokens only ever live in memory for the
//! duration of one user's scraping pass.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod post;
pub mod statistics;
pub mod user;

pub use error::{CoreError, Result};
pub use ids::{PostId, PostUuid, UserId, VelogUuid};
pub use post::{Post, PostUpsert, UpsertOutcome};
pub use statistics::{DailyStatistics, StatisticsWrite};
pub use user::{ProfileUpdate, TokenUpdate, User};
