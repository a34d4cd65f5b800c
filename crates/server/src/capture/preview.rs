//! Debug preview: render an eligible target directly, bypassing meta and
//! cache. Nothing is written.

use capcache_client::is_render_eligible;
use capcache_core::Deadline;
use url::Url;

use super::render::{FailureTags, preflight_and_render};
use crate::error::{CaptureError, CaptureFailure, RenderMode};
use crate::reply::ImageReply;
use crate::state::AppState;

const TAGS: FailureTags = FailureTags { preflight: "preview-preflight", render: "preview-fail" };

pub(super) async fn run(state: &AppState, target: &Url, deadline: &Deadline) -> Result<ImageReply, CaptureFailure> {
    if !is_render_eligible(target, &state.config.root_domain) {
        return Err(CaptureError::AccessDenied(state.config.root_domain.clone()).tagged("preview-deny"));
    }

    let png = preflight_and_render(state, target, deadline, RenderMode::Preview, TAGS).await?;
    Ok(ImageReply::png(png, "preview", "preview").header("x-preview", "1"))
}
