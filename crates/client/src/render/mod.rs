//! Page rendering to PNG.
//!
//! This module provides the renderer trait consumed by the capture service
//! and a feature-gated implementation using chromiumoxide for headless
//! Chrome/Chromium control.

#[cfg(feature = "render")]
mod headless;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use url::Url;

#[cfg(feature = "render")]
pub use headless::{HeadlessRenderer, RendererConfig};

/// Errors that can occur during page rendering.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// Failed to launch or connect to browser.
    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    /// Failed to open or prepare a page.
    #[error("page setup failed: {0}")]
    PageSetup(String),

    /// Failed to capture the screenshot.
    #[error("screenshot failed: {0}")]
    Screenshot(String),

    /// A render phase exceeded its budget.
    #[error("render timeout after {0}ms")]
    Timeout(u64),

    /// Rendering is not available in this process.
    #[error("rendering disabled")]
    Disabled,
}

impl RenderError {
    pub fn is_timeout(&self) -> bool {
        match self {
            RenderError::Timeout(_) => true,
            RenderError::PageSetup(msg) | RenderError::Screenshot(msg) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("timeout") || msg.contains("timed out")
            }
            _ => false,
        }
    }
}

/// Per-request time budgets for one capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Upper bound for navigation up to DOMContentLoaded.
    pub navigation: Duration,
    /// Sleep after navigation; zero skips it.
    pub settle: Duration,
    /// Upper bound for page setup and for the screenshot call.
    pub capture: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { navigation: Duration::from_secs(20), settle: Duration::from_millis(800), capture: Duration::from_secs(5) }
    }
}

/// Renders a URL to PNG bytes.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn capture(&self, url: &Url, opts: &RenderOptions) -> Result<Bytes, RenderError>;
}

/// Renderer used when the browser is disabled or failed to start.
#[derive(Debug, Clone, Default)]
pub struct DisabledRenderer;

#[async_trait]
impl Renderer for DisabledRenderer {
    async fn capture(&self, _url: &Url, _opts: &RenderOptions) -> Result<Bytes, RenderError> {
        Err(RenderError::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        assert!(RenderError::Timeout(100).is_timeout());
        assert!(RenderError::Screenshot("Request timed out".into()).is_timeout());
        assert!(!RenderError::Screenshot("target closed".into()).is_timeout());
        assert!(!RenderError::Disabled.is_timeout());
    }

    #[tokio::test]
    async fn test_disabled_renderer() {
        let url = Url::parse("https://root.dev").unwrap();
        let result = DisabledRenderer.capture(&url, &RenderOptions::default()).await;
        assert!(matches!(result, Err(RenderError::Disabled)));
    }
}
