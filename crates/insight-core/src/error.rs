//! Error types for the core crate.

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur when building core records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// The input is not a valid UUID.
    #[error("invalid UUID format: {0}")]
    InvalidUuid(String),
}
