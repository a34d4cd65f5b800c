//! Outbound clients for capcache.
//!
//! This crate provides the HTTP fetch pipeline (target normalization,
//! preflight probing, social image proxying), social meta image selection,
//! the hosted image store client, and the headless page renderer.

pub mod fetch;
pub mod images;
pub mod meta;
pub mod render;

pub use fetch::{
    ACCEPT_VARIANT, FetchClient, FetchConfig, FetchError, FetchedImage, PreflightOutcome, SocialImage, UrlError, fetch_social_image,
    is_render_eligible, normalize,
};
pub use images::{CloudflareImages, ImageStore, ImageStoreError, ImagesClientConfig, StoredImage, Unconfigured, UploadedImage};
pub use meta::{ImageCandidate, ImageSource, find_social_image};
pub use render::{DisabledRenderer, RenderError, RenderOptions, Renderer};

#[cfg(feature = "render")]
pub use render::{HeadlessRenderer, RendererConfig};
