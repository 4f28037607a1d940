//! Client error types.

/// Errors that can occur when talking to the content API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed, timed out, or the body could not be decoded.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with an unexpected status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// Server answered with something other than JSON.
    #[error("unexpected content type: {0}")]
    UnexpectedContentType(String),

    /// Response body is not the JSON shape we expect.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Response decoded but lacks an expected field.
    #[error("missing field in response: {0}")]
    MissingField(&'static str),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}
