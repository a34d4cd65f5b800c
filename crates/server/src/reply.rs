//! Successful image responses.

use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

pub const X_CAPTURE_WORKER: HeaderName = HeaderName::from_static("x-capture-worker");
pub const X_CAPTURE_CACHE: HeaderName = HeaderName::from_static("x-capture-cache");
pub const X_CAPTURE_SOURCE: HeaderName = HeaderName::from_static("x-capture-source");
pub const X_CAPTURE_FAIL: HeaderName = HeaderName::from_static("x-capture-fail");

pub const CACHE_CONTROL_IMAGE: &str = "no-store, no-cache, must-revalidate";
pub const CACHE_CONTROL_FAILURE: &str = "no-store";

/// Image bytes plus the diagnostic headers describing where they came from.
#[derive(Debug, Clone)]
pub struct ImageReply {
    pub bytes: Bytes,
    pub content_type: String,
    pub cache: &'static str,
    pub source: &'static str,
    pub extra: Vec<(&'static str, String)>,
}

impl ImageReply {
    pub fn new(bytes: Bytes, content_type: impl Into<String>, cache: &'static str, source: &'static str) -> Self {
        Self { bytes, content_type: content_type.into(), cache, source, extra: Vec::new() }
    }

    /// A freshly rendered PNG.
    pub fn png(bytes: Bytes, cache: &'static str, source: &'static str) -> Self {
        Self::new(bytes, "image/png", cache, source)
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.extra.push((name, value.into()));
        self
    }
}

impl IntoResponse for ImageReply {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::OK, self.bytes).into_response();
        let headers = response.headers_mut();

        let content_type =
            HeaderValue::from_str(&self.content_type).unwrap_or_else(|_| HeaderValue::from_static("image/png"));
        headers.insert(header::CONTENT_TYPE, content_type);
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL_IMAGE));
        headers.insert(X_CAPTURE_WORKER, HeaderValue::from_static("1"));
        headers.insert(X_CAPTURE_CACHE, HeaderValue::from_static(self.cache));
        headers.insert(X_CAPTURE_SOURCE, HeaderValue::from_static(self.source));

        for (name, value) in self.extra {
            match HeaderValue::from_str(&value) {
                Ok(value) => {
                    headers.insert(HeaderName::from_static(name), value);
                }
                Err(_) => tracing::debug!(header = name, "dropping non-ascii header value"),
            }
        }
        response
    }
}
