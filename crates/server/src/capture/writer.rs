//! Cache population after a fresh render.

use bytes::Bytes;
use capcache_client::{ImageStoreError, UploadedImage};
use capcache_core::{CacheKeys, CacheRecord};

use crate::state::Capabilities;

/// Result of an upload followed by the record writes.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub image: UploadedImage,
    /// Every key was written.
    pub written: bool,
}

/// Upload `png` and point every key at the new image id and its preferred
/// variant. Key writes are attempted even when one of them fails.
pub async fn upload_and_record(caps: &Capabilities, keys: &CacheKeys, png: Bytes) -> Result<Recorded, ImageStoreError> {
    let image = caps.images.upload(png).await?;
    let record = CacheRecord::with_variant(&image.id, image.preferred_variant());
    let written = keys.write_all(caps.kv.as_ref(), &record).await.is_ok();
    Ok(Recorded { image, written })
}

/// Best-effort writer run as a deferred step. Nothing is propagated.
pub async fn record_capture(caps: &Capabilities, keys: &CacheKeys, png: Bytes) {
    match upload_and_record(caps, keys, png).await {
        Ok(Recorded { image, written: true }) => {
            tracing::debug!(key = %keys.primary, id = %image.id, "capture cached");
        }
        Ok(Recorded { image, written: false }) => {
            tracing::warn!(key = %keys.primary, id = %image.id, "capture uploaded but cache write incomplete");
        }
        Err(e) => tracing::warn!(key = %keys.primary, error = %e, "capture upload failed"),
    }
}
