//! Preflight-then-render, shared by the cache chain and the preview path.

use bytes::Bytes;
use capcache_client::{RenderError, RenderOptions};
use capcache_core::Deadline;
use capcache_core::config::Timeouts;
use url::Url;

use crate::error::{CaptureError, CaptureFailure, RenderMode};
use crate::state::AppState;

/// Cache tags reported when a render attempt fails.
#[derive(Debug, Clone, Copy)]
pub(super) struct FailureTags {
    pub preflight: &'static str,
    pub render: &'static str,
}

/// Per-phase budgets for one render, sized from the time left.
pub fn render_options(deadline: &Deadline, timeouts: &Timeouts) -> RenderOptions {
    RenderOptions {
        navigation: deadline.budget(timeouts.navigation()),
        settle: deadline.settle(timeouts.idle_time(), timeouts.idle_timeout()),
        capture: deadline.budget(deadline.remaining()),
    }
}

/// Render `target` with budgets from `deadline`. The whole render is bounded
/// by the time left (never less than the floor).
pub(crate) async fn render_bounded(state: &AppState, target: &Url, deadline: &Deadline) -> Result<Bytes, RenderError> {
    let opts = render_options(deadline, &state.config.timeouts);
    let limit = deadline.budget(deadline.remaining());
    match tokio::time::timeout(limit, state.caps.renderer.capture(target, &opts)).await {
        Ok(result) => result,
        Err(_) => Err(RenderError::Timeout(limit.as_millis() as u64)),
    }
}

/// Probe the target, then render it.
pub(super) async fn preflight_and_render(
    state: &AppState, target: &Url, deadline: &Deadline, mode: RenderMode, tags: FailureTags,
) -> Result<Bytes, CaptureFailure> {
    let budget = deadline.budget(state.config.timeouts.preflight());
    if let Some(err) = CaptureError::from_preflight(state.caps.fetch.preflight(target, budget).await) {
        return Err(err.tagged(tags.preflight));
    }

    render_bounded(state, target, deadline)
        .await
        .map_err(|e| CaptureError::from_render(mode, &e).tagged(tags.render))
}
