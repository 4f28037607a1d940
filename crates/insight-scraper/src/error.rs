//! Scraper error types.

use insight_client::ClientError;
use insight_store::StoreError;

use crate::crypto::CryptoError;

/// Errors that end one user's scraping pass.
///
/// Invalid credentials and unavailable stats are not errors here: they are
/// reported through [`crate::UserOutcome`] and the per-user report instead.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// Stored tokens could not be decrypted or rotated tokens not encrypted.
    #[error("credential error: {0}")]
    Credentials(#[from] CryptoError),

    /// Rotated tokens could not be saved.
    #[error("failed to persist rotated tokens: {0}")]
    TokenPersistence(#[source] StoreError),

    /// Changed profile fields could not be saved.
    #[error("failed to persist profile: {0}")]
    ProfilePersistence(#[source] StoreError),

    /// The post listing could not be fetched.
    #[error("failed to list posts: {0}")]
    Listing(#[from] ClientError),

    /// One upsert batch failed; earlier batches stay committed.
    #[error("post upsert failed at batch {batch}: {source}")]
    PostUpsert {
        /// Zero-based index of the failed batch.
        batch: usize,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// The active/inactive sync failed.
    #[error("active sync failed: {0}")]
    ActiveSync(#[source] StoreError),
}

/// Result type for scraper operations.
pub type Result<T> = std::result::Result<T, ScrapeError>;
