//! The capture endpoint: request parsing and dispatch between the preview
//! path and the cache resolution chain.

mod chain;
mod preview;
pub(crate) mod render;
pub mod writer;

use std::time::Instant;

use axum::response::{IntoResponse, Response};
use capcache_client::{UrlError, normalize};
use capcache_core::Deadline;
use url::Url;

use crate::error::{CaptureError, CaptureFailure};
use crate::reply::ImageReply;
use crate::state::AppState;
use crate::tasks::Deferred;

/// Raw capture parameters from the query string. The first occurrence of a
/// repeated parameter wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureParams {
    pub url: Option<String>,
    pub force: bool,
    pub preview: bool,
}

impl CaptureParams {
    pub fn from_query(query: Option<&str>) -> Self {
        let mut url = None;
        let mut force = None;
        let mut preview = None;
        for (name, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            match name.as_ref() {
                "url" if url.is_none() => url = Some(value.into_owned()),
                "force" if force.is_none() => force = Some(is_truthy(&value)),
                "preview" if preview.is_none() => preview = Some(is_truthy(&value)),
                _ => {}
            }
        }
        Self { url, force: force.unwrap_or(false), preview: preview.unwrap_or(false) }
    }

    /// Whether a non-blank `url` parameter is present.
    pub fn has_url(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    fn into_request(self) -> Result<CaptureRequest, CaptureFailure> {
        let raw = self.url.unwrap_or_default();
        let target = normalize(&raw).map_err(|e| {
            let err = match e {
                UrlError::Empty => CaptureError::BadRequest,
                _ => CaptureError::InvalidUrl(raw.trim().to_string()),
            };
            err.tagged("miss")
        })?;
        Ok(CaptureRequest { target, force: self.force, preview: self.preview })
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

/// A validated capture request.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub target: Url,
    pub force: bool,
    pub preview: bool,
}

/// Serve one capture. The returned batch holds the cache work to run after
/// the response is sent; it is returned on failures too.
pub async fn handle(state: &AppState, params: CaptureParams) -> (Response, Deferred) {
    let started = Instant::now();
    let mut deferred = Deferred::new();

    let result = match params.into_request() {
        Ok(req) => {
            let deadline = Deadline::from_timeouts(&state.config.timeouts);
            let outcome = if req.preview {
                preview::run(state, &req.target, &deadline).await
            } else {
                chain::run(state, &req, &deadline, &mut deferred).await
            };
            log_outcome(&req.target, &outcome, started);
            outcome
        }
        Err(failure) => {
            tracing::debug!(code = failure.error.code(), "capture request rejected");
            Err(failure)
        }
    };

    let response = match result {
        Ok(reply) => reply.into_response(),
        Err(failure) => failure.into_response(),
    };
    (response, deferred)
}

fn log_outcome(target: &Url, outcome: &Result<ImageReply, CaptureFailure>, started: Instant) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(reply) => {
            tracing::info!(%target, cache = reply.cache, source = reply.source, elapsed_ms, "capture served");
        }
        Err(failure) => tracing::warn!(
            %target,
            code = failure.error.code(),
            cache = failure.cache_tag,
            error = %failure.error,
            elapsed_ms,
            "capture failed"
        ),
    }
}
