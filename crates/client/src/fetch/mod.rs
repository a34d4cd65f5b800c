//! Outbound HTTP for capture requests.
//!
//! ### Target handling
//! - Normalize user input (default `https`, http/https only)
//! - Render eligibility is a suffix match on the configured root domain
//!
//! ### Requests
//! - Every request carries the desktop UA, an Accept header suited to what
//!   is being fetched, and the configured Accept-Language
//! - Every request gets an explicit per-call timeout from the caller's budget
//! - Bodies are read incrementally and capped at `max_bytes`

pub mod preflight;
pub mod social;
pub mod url;

use bytes::{Bytes, BytesMut};
use reqwest::{Client, StatusCode, Url, header};
use std::time::Duration;

pub use preflight::PreflightOutcome;
pub use social::{SocialImage, fetch_social_image};
pub use url::{UrlError, is_render_eligible, normalize};

use capcache_core::AppConfig;

pub(crate) const ACCEPT_DOCUMENT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
pub(crate) const ACCEPT_HTML: &str = "text/html,application/xhtml+xml;q=0.9,*/*;q=0.1";
pub(crate) const ACCEPT_IMAGE: &str = "image/avif,image/webp,image/*,*/*;q=0.1";

/// Accept header used when re-fetching a stored PNG variant.
pub const ACCEPT_VARIANT: &str = "image/png,*/*;q=0.1";

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,

    pub accept_language: String,

    /// Maximum response body size in bytes (default: 10MB)
    pub max_bytes: usize,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

impl FetchConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            accept_language: config.accept_language.clone(),
            max_bytes: config.max_bytes,
            max_redirects: 5,
        }
    }
}

/// Errors from a single outbound fetch.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("status {0}")]
    Status(u16),

    #[error("unexpected content-type: {0:?}")]
    UnexpectedContentType(String),

    #[error("{0} bytes exceeds limit")]
    TooLarge(usize),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { FetchError::Timeout } else { FetchError::Network(err.to_string()) }
    }
}

/// A downloaded image body.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Bytes,
    pub content_type: String,
}

/// HTTP fetch client shared by the preflight probe, social meta proxy and
/// cached-variant reads.
#[derive(Debug, Clone)]
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Wrap an existing reqwest client (tests use this to pin hostnames).
    pub fn with_http(http: Client, config: FetchConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub(crate) fn request(&self, method: reqwest::Method, url: &Url, accept: &str, budget: Duration) -> reqwest::RequestBuilder {
        self.http
            .request(method, url.clone())
            .header(header::USER_AGENT, &self.config.user_agent)
            .header(header::ACCEPT, accept)
            .header(header::ACCEPT_LANGUAGE, &self.config.accept_language)
            .timeout(budget)
    }

    /// GET an image. Only a 2xx response whose content-type starts with
    /// `image/` is accepted.
    pub async fn fetch_image(&self, url: &Url, accept: &str, budget: Duration) -> Result<FetchedImage, FetchError> {
        tokio::time::timeout(budget, self.get_image(url, accept, budget))
            .await
            .map_err(|_| FetchError::Timeout)?
    }

    async fn get_image(&self, url: &Url, accept: &str, budget: Duration) -> Result<FetchedImage, FetchError> {
        let response = self.request(reqwest::Method::GET, url, accept, budget).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let content_type = content_type_of(&response);
        if !content_type.starts_with("image/") {
            return Err(FetchError::UnexpectedContentType(content_type));
        }
        let bytes = read_capped(response, self.config.max_bytes).await?;
        tracing::debug!(url = %url, bytes = bytes.len(), %content_type, "fetched image");
        Ok(FetchedImage { bytes, content_type })
    }
}

/// Lowercased content-type header, empty when absent.
pub(crate) fn content_type_of(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Read a response body, failing once it grows past `max_bytes`.
pub(crate) async fn read_capped(mut response: reqwest::Response, max_bytes: usize) -> Result<Bytes, FetchError> {
    if let Some(len) = response.content_length()
        && len as usize > max_bytes
    {
        return Err(FetchError::TooLarge(len as usize));
    }

    let mut buf = BytesMut::new();
    while let Some(chunk) = response.chunk().await? {
        if buf.len() + chunk.len() > max_bytes {
            return Err(FetchError::TooLarge(buf.len() + chunk.len()));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

pub(crate) fn is_ok_status(status: StatusCode) -> bool {
    (200..400).contains(&status.as_u16())
}
