//! Image store error types.

use std::sync::Arc;

/// Errors from the image-hosting API.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ImageStoreError {
    /// Account id or API token missing.
    #[error("image store not configured: {0}")]
    NotConfigured(String),

    /// Authentication failed (invalid API token).
    #[error("authentication failed: invalid API token")]
    AuthError,

    /// The image id does not exist.
    #[error("image not found: {0}")]
    NotFound(String),

    /// HTTP error response.
    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    /// The API answered `success: false`.
    #[error("API error: {0}")]
    Api(String),

    /// Stored blob is not an image.
    #[error("unexpected content-type: {0:?}")]
    NotImage(String),

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response parse error.
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ImageStoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { ImageStoreError::Timeout } else { ImageStoreError::Network(Arc::new(err)) }
    }
}
