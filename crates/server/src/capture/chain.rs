//! Cache resolution chain: social meta, cached image, fresh render.

use std::sync::Arc;

use capcache_client::{ACCEPT_VARIANT, FetchError, ImageStoreError, SocialImage, fetch_social_image, is_render_eligible};
use capcache_core::cache::Found;
use capcache_core::{CacheKeys, CacheRecord, Deadline};
use url::Url;

use super::CaptureRequest;
use super::render::{FailureTags, preflight_and_render};
use super::writer::record_capture;
use crate::error::{CaptureError, CaptureFailure, RenderMode};
use crate::reply::ImageReply;
use crate::state::{AppState, Capabilities};
use crate::tasks::Deferred;

pub(super) async fn run(
    state: &AppState, req: &CaptureRequest, deadline: &Deadline, deferred: &mut Deferred,
) -> Result<ImageReply, CaptureFailure> {
    let config = &state.config;
    let target = &req.target;

    if let Some(social) = fetch_social_image(&state.caps.fetch, target, deadline, &config.timeouts).await {
        return Ok(meta_reply(social));
    }

    if !is_render_eligible(target, &config.root_domain) {
        return Err(CaptureError::NotFound(config.root_domain.clone()).tagged("meta-miss"));
    }

    let keys = CacheKeys::for_target(target);
    if req.force {
        if let Err(e) = keys.delete_all(state.caps.kv.as_ref()).await {
            tracing::debug!(key = %keys.primary, error = %e, "forced delete incomplete");
        }
    } else {
        match keys.lookup(state.caps.kv.as_ref()).await {
            Ok(Some(found)) => {
                if let Some(reply) = serve_cached(state, &keys, found, deadline, deferred).await {
                    return Ok(reply);
                }
            }
            Ok(None) => tracing::debug!(key = %keys.primary, "cache miss"),
            Err(e) => tracing::warn!(key = %keys.primary, error = %e, "cache lookup failed, treating as miss"),
        }
    }

    let tags = if req.force {
        FailureTags { preflight: "refresh-preflight", render: "refresh-fail" }
    } else {
        FailureTags { preflight: "miss-preflight", render: "miss-fail" }
    };
    let png = preflight_and_render(state, target, deadline, RenderMode::Capture, tags).await?;

    let caps = Arc::clone(&state.caps);
    let writer_png = png.clone();
    deferred.push("cache-writer", async move { record_capture(&caps, &keys, writer_png).await });

    Ok(ImageReply::png(png, if req.force { "refresh" } else { "miss" }, "render"))
}

fn meta_reply(social: SocialImage) -> ImageReply {
    let origin = social.origin();
    let SocialImage { image, candidate } = social;
    let mut reply = ImageReply::new(image.bytes, image.content_type, "meta", "meta")
        .header("x-capture-meta", candidate.source.as_str())
        .header("x-social-origin", origin);
    if let Some(size) = candidate.size_label() {
        reply = reply.header("x-capture-meta-size", size);
    }
    reply
}

/// Try the cached image: original by id first, then the stored variant URL.
/// `None` means fall through to a render.
async fn serve_cached(
    state: &AppState, keys: &CacheKeys, found: Found, deadline: &Deadline, deferred: &mut Deferred,
) -> Option<ImageReply> {
    let caps = &state.caps;
    let record = &found.record;

    if let Some(id) = record.image_id(&state.config.images.delivery_host) {
        let budget = deadline.budget(state.config.timeouts.og_image());
        let fetched = tokio::time::timeout(budget, caps.images.fetch_original(&id))
            .await
            .unwrap_or(Err(ImageStoreError::Timeout));
        match fetched {
            Ok(original) => {
                if record.explicit_id().is_none() || !found.from_primary {
                    defer_backfill(deferred, caps, keys, &id, record.url.as_deref());
                }
                let reply = ImageReply::new(original.bytes, original.content_type.clone(), "hit", "original")
                    .header("x-images-id", id)
                    .header("x-images-ct", original.content_type);
                return Some(reply);
            }
            Err(e) => tracing::debug!(key = %found.key, %id, error = %e, "original unavailable"),
        }
    }

    let variant = record.url.as_deref()?;
    let Ok(variant_url) = Url::parse(variant) else {
        tracing::debug!(key = %found.key, error = %CaptureError::CacheCorrupt(variant.into()), "dropping cached record");
        defer_delete(deferred, caps, keys);
        return None;
    };

    let budget = deadline.budget(state.config.timeouts.og_image());
    match caps.fetch.fetch_image(&variant_url, ACCEPT_VARIANT, budget).await {
        Ok(image) => {
            let reference = variant_ref(&variant_url);
            Some(ImageReply::new(image.bytes, image.content_type.clone(), "hit", "variant")
                .header("x-images-ct", image.content_type)
                .header("x-images-ref", reference))
        }
        Err(e @ (FetchError::Status(_) | FetchError::UnexpectedContentType(_))) => {
            tracing::debug!(key = %found.key, error = %CaptureError::CacheCorrupt(e.to_string()), "dropping cached record");
            defer_delete(deferred, caps, keys);
            None
        }
        Err(e) => {
            tracing::debug!(key = %found.key, error = %e, "variant fetch failed, treating as miss");
            None
        }
    }
}

fn defer_backfill(deferred: &mut Deferred, caps: &Arc<Capabilities>, keys: &CacheKeys, id: &str, variant: Option<&str>) {
    let caps = Arc::clone(caps);
    let keys = keys.clone();
    let record = CacheRecord::with_variant(id, variant);
    deferred.push("cache-backfill", async move {
        if let Err(e) = keys.write_all(caps.kv.as_ref(), &record).await {
            tracing::warn!(key = %keys.primary, error = %e, "cache backfill failed");
        }
    });
}

fn defer_delete(deferred: &mut Deferred, caps: &Arc<Capabilities>, keys: &CacheKeys) {
    let caps = Arc::clone(caps);
    let keys = keys.clone();
    deferred.push("cache-delete", async move {
        if let Err(e) = keys.delete_all(caps.kv.as_ref()).await {
            tracing::warn!(key = %keys.primary, error = %e, "cache delete failed");
        }
    });
}

/// Last two path segments of a variant URL (`<id>/<variant>`).
fn variant_ref(url: &Url) -> String {
    let segments: Vec<&str> = url.path_segments().map(Iterator::collect).unwrap_or_default();
    segments[segments.len().saturating_sub(2)..].join("/")
}
