//! Hosted image storage.
//!
//! Rendered captures are uploaded to an image-hosting API and referenced
//! from the cache by id. The [`ImageStore`] trait covers the three calls the
//! capture service needs; [`CloudflareImages`] speaks the Cloudflare Images
//! v1 HTTP API and [`Unconfigured`] stands in when no credentials are set.

pub mod cloudflare;
pub mod error;
pub mod response;

use std::sync::LazyLock;

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;

pub use cloudflare::{CloudflareImages, ImagesClientConfig};
pub use error::ImageStoreError;

static PUBLIC_VARIANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/public(?:[/?]|$)").expect("invalid regex"));

/// A freshly uploaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub id: String,
    pub variants: Vec<String>,
}

impl UploadedImage {
    /// The `/public` variant when listed, else the first one.
    pub fn preferred_variant(&self) -> Option<&str> {
        self.variants
            .iter()
            .find(|v| PUBLIC_VARIANT.is_match(v))
            .or_else(|| self.variants.first())
            .map(String::as_str)
    }
}

/// The original bytes of a stored image.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub bytes: Bytes,
    pub content_type: String,
}

/// Image-hosting operations used by the capture service.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Upload PNG bytes as a publicly readable image.
    async fn upload(&self, png: Bytes) -> Result<UploadedImage, ImageStoreError>;

    /// Fetch the original upload. Fails unless the stored content is an image.
    async fn fetch_original(&self, id: &str) -> Result<StoredImage, ImageStoreError>;

    async fn delete(&self, id: &str) -> Result<(), ImageStoreError>;
}

/// Image store used when credentials are missing: every call fails, so
/// cache hits fall back to variant URLs and uploads are skipped.
#[derive(Debug, Clone, Default)]
pub struct Unconfigured;

#[async_trait]
impl ImageStore for Unconfigured {
    async fn upload(&self, _png: Bytes) -> Result<UploadedImage, ImageStoreError> {
        Err(ImageStoreError::NotConfigured("upload".into()))
    }

    async fn fetch_original(&self, _id: &str) -> Result<StoredImage, ImageStoreError> {
        Err(ImageStoreError::NotConfigured("fetch".into()))
    }

    async fn delete(&self, _id: &str) -> Result<(), ImageStoreError> {
        Err(ImageStoreError::NotConfigured("delete".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uploaded(variants: &[&str]) -> UploadedImage {
        UploadedImage { id: "img".into(), variants: variants.iter().map(|v| v.to_string()).collect() }
    }

    #[test]
    fn test_preferred_variant_is_public() {
        let img = uploaded(&["https://imagedelivery.net/a/img/thumb", "https://imagedelivery.net/a/img/public"]);
        assert_eq!(img.preferred_variant(), Some("https://imagedelivery.net/a/img/public"));
    }

    #[test]
    fn test_preferred_variant_falls_back_to_first() {
        let img = uploaded(&["https://imagedelivery.net/a/img/thumb", "https://imagedelivery.net/a/img/publicity"]);
        assert_eq!(img.preferred_variant(), Some("https://imagedelivery.net/a/img/thumb"));
        assert_eq!(uploaded(&[]).preferred_variant(), None);
    }

    #[tokio::test]
    async fn test_unconfigured_store_fails() {
        let store = Unconfigured;
        assert!(matches!(store.upload(Bytes::from_static(b"png")).await, Err(ImageStoreError::NotConfigured(_))));
        assert!(store.fetch_original("x").await.is_err());
        assert!(store.delete("x").await.is_err());
    }
}
