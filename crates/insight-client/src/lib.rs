//! Velog content API client.
//!
//! This crate talks to the Velog GraphQL endpoints on behalf of one user at a
//! time. Calls authenticate with the user's token pair sent as cookies; the
//! API may answer with rotated tokens in `Set-Cookie`.
//!
//! The [`ContentApi`] trait is the seam the scraping pipeline depends on;
//! [`VelogClient`] is the HTTP implementation.
//!
//! # Example
//!
//! ```no_run
//! use insight_client::{
//!     ClientOptions, ContentApi, Credentials, CurrentUserLookup, PaginationOptions, VelogClient,
//! };
//!
//! # async fn example() -> Result<(), insight_client::ClientError> {
//! let client = VelogClient::new(ClientOptions::default())?;
//! let creds = Credentials::new("access-token", "refresh-token");
//!
//! if let CurrentUserLookup::Authenticated { user, .. } = client.fetch_current_user(&creds).await {
//!     let posts = client
//!         .fetch_all_posts(&user.username, &creds, PaginationOptions::default())
//!         .await?;
//!     println!("{} has {} posts", user.username, posts.len());
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod api;
mod client;
mod error;
mod queries;
mod types;

pub use api::{ContentApi, PaginationOptions, RetryPolicy};
pub use client::{ClientOptions, VelogClient, DEFAULT_API_URL, DEFAULT_STATS_URL};
pub use error::ClientError;
pub use types::{
    CurrentUserLookup, Credentials, PageEntry, PostStats, RemotePost, RemoteUser, SessionCookies,
};
