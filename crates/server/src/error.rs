//! Structured errors for the capture endpoint.
//!
//! Every failure answers with a JSON body `{ ok: false, code, message }` and
//! the diagnostic `x-capture-fail` / `x-capture-cache` headers.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use capcache_client::{PreflightOutcome, RenderError};
use serde_json::json;

use crate::reply::{CACHE_CONTROL_FAILURE, X_CAPTURE_CACHE, X_CAPTURE_FAIL, X_CAPTURE_WORKER};

/// Whether a render failure came from a cached capture or a preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Capture,
    Preview,
}

/// Errors surfaced by the capture endpoint.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CaptureError {
    #[error("Missing 'url' query.")]
    BadRequest,

    #[error("Invalid URL or unsupported protocol (use http/https): {0}")]
    InvalidUrl(String),

    /// Preview requested for a target outside the render domain.
    #[error("Preview rendering is allowed only for {0}.")]
    AccessDenied(String),

    #[error("No social meta image (OG/Twitter/link) found; rendering capture is allowed only for {0}.")]
    NotFound(String),

    #[error("Blocked ({0})")]
    PreflightBlocked(u16),

    #[error("Rejected ({0})")]
    PreflightRejected(u16),

    #[error("Upstream error ({0})")]
    PreflightUpstream(u16),

    #[error("Preflight timeout or network error")]
    PreflightTimeout,

    #[error("{message}")]
    CaptureTimeout { mode: RenderMode, message: String },

    #[error("{message}")]
    CaptureFailed { mode: RenderMode, message: String },

    /// A cached value could not be used. Recovered as a miss, never answered.
    #[error("corrupt cache entry: {0}")]
    CacheCorrupt(String),
}

impl CaptureError {
    /// Map a failed preflight; `None` when the probe succeeded.
    pub fn from_preflight(outcome: PreflightOutcome) -> Option<Self> {
        match outcome {
            PreflightOutcome::Ok => None,
            PreflightOutcome::Blocked(s) => Some(Self::PreflightBlocked(s)),
            PreflightOutcome::Rejected(s) => Some(Self::PreflightRejected(s)),
            PreflightOutcome::UpstreamError(s) => Some(Self::PreflightUpstream(s)),
            PreflightOutcome::Timeout => Some(Self::PreflightTimeout),
        }
    }

    pub fn from_render(mode: RenderMode, err: &RenderError) -> Self {
        let message = err.to_string();
        if err.is_timeout() { Self::CaptureTimeout { mode, message } } else { Self::CaptureFailed { mode, message } }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest | Self::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            Self::AccessDenied(_) | Self::PreflightBlocked(_) | Self::PreflightRejected(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PreflightUpstream(_) | Self::PreflightTimeout | Self::CaptureTimeout { .. } => {
                StatusCode::GATEWAY_TIMEOUT
            }
            Self::CaptureFailed { .. } | Self::CacheCorrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad-request",
            Self::InvalidUrl(_) => "invalid-url",
            Self::AccessDenied(_) => "preview-not-allowed",
            Self::NotFound(_) => "social-not-found",
            Self::PreflightBlocked(_) => "preflight-blocked",
            Self::PreflightRejected(_) => "preflight-rejected",
            Self::PreflightUpstream(_) => "preflight-upstream",
            Self::PreflightTimeout => "preflight-timeout",
            Self::CaptureTimeout { mode: RenderMode::Capture, .. } => "capture-timeout",
            Self::CaptureTimeout { mode: RenderMode::Preview, .. } => "preview-timeout",
            Self::CaptureFailed { mode: RenderMode::Capture, .. } => "capture-failed",
            Self::CaptureFailed { mode: RenderMode::Preview, .. } => "preview-failed",
            Self::CacheCorrupt(_) => "cache-corrupt",
        }
    }

    /// Attach the `x-capture-cache` tag for the failure response.
    pub fn tagged(self, cache_tag: &'static str) -> CaptureFailure {
        CaptureFailure { error: self, cache_tag }
    }
}

/// A capture error together with the cache tag reported for it.
#[derive(Debug, Clone)]
pub struct CaptureFailure {
    pub error: CaptureError,
    pub cache_tag: &'static str,
}

impl IntoResponse for CaptureFailure {
    fn into_response(self) -> Response {
        let code = self.error.code();
        let body = json!({ "ok": false, "code": code, "message": self.error.to_string() });
        let mut response = (self.error.status(), Json(body)).into_response();

        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL_FAILURE));
        headers.insert(X_CAPTURE_WORKER, HeaderValue::from_static("1"));
        headers.insert(X_CAPTURE_FAIL, HeaderValue::from_static(code));
        headers.insert(X_CAPTURE_CACHE, HeaderValue::from_static(self.cache_tag));
        response
    }
}
