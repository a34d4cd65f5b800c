//! Headless Chrome/Chromium renderer using chromiumoxide.
//!
//! One browser process is shared; each capture opens its own page, which is
//! always closed again, explicitly on success and from `Drop` otherwise.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType, SetUserAgentOverrideParams};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, EventDomContentEventFired, NavigateParams};
use chromiumoxide::page::ScreenshotParams;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use url::Url;

use super::{RenderError, RenderOptions, Renderer};
use capcache_core::AppConfig;
use capcache_core::config::Viewport;

/// Static page setup applied to every capture.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub user_agent: String,
    pub accept_language: String,
    pub viewport: Viewport,
    /// Requests whose URL contains one of these hosts are aborted.
    pub blocked_hosts: Arc<[String]>,
}

impl RendererConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            accept_language: config.accept_language.clone(),
            viewport: config.viewport,
            blocked_hosts: config.blocked_hosts.clone().into(),
        }
    }
}

/// Whether an intercepted request should be aborted.
fn should_block(resource_type: &ResourceType, url: &str, blocked_hosts: &[String]) -> bool {
    matches!(resource_type, ResourceType::Ping) || blocked_hosts.iter().any(|host| url.contains(host.as_str()))
}

/// Page handle that is closed on every path.
///
/// `close` is the normal path. If the guard is dropped first (early return,
/// cancellation, panic) the close is spawned onto the runtime captured at
/// construction. Background tasks tied to the page are aborted either way.
struct PageGuard {
    page: Option<Page>,
    url: String,
    tasks: Vec<JoinHandle<()>>,
    runtime: tokio::runtime::Handle,
}

impl PageGuard {
    fn new(page: Page, url: &Url) -> Self {
        Self { page: Some(page), url: url.to_string(), tasks: Vec::new(), runtime: tokio::runtime::Handle::current() }
    }

    fn page(&self) -> Option<&Page> {
        self.page.as_ref()
    }

    fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    async fn close(mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                tracing::warn!(url = %self.url, error = %e, "failed to close page");
            } else {
                tracing::trace!(url = %self.url, "page closed");
            }
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(page) = self.page.take() {
            let url = std::mem::take(&mut self.url);
            self.runtime.spawn(async move {
                if let Err(e) = page.close().await {
                    tracing::warn!(%url, error = %e, "page drop cleanup failed");
                }
            });
        }
    }
}

/// Headless Chrome/Chromium renderer.
pub struct HeadlessRenderer {
    browser: Browser,
    config: RendererConfig,
    handler: JoinHandle<()>,
}

impl HeadlessRenderer {
    /// Launch a headless browser.
    ///
    /// The browser uses a background task to drive Chrome DevTools Protocol
    /// events for as long as the renderer lives.
    pub async fn launch(config: RendererConfig) -> Result<Self, RenderError> {
        let browser_config = BrowserConfig::builder()
            .window_size(config.viewport.width, config.viewport.height)
            .build()
            .map_err(RenderError::BrowserLaunch)?;

        let (browser, mut handler) =
            Browser::launch(browser_config).await.map_err(|e| RenderError::BrowserLaunch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("browser handler event error: {e}");
                    break;
                }
            }
        });

        tracing::info!("headless browser launched");
        Ok(Self { browser, config, handler })
    }

    async fn prepare(&self, guard: &mut PageGuard) -> Result<(), RenderError> {
        let page = guard.page().cloned().ok_or_else(|| RenderError::PageSetup("page already closed".into()))?;

        let mut ua = SetUserAgentOverrideParams::new(self.config.user_agent.clone());
        ua.accept_language = Some(self.config.accept_language.clone());
        page.execute(ua).await.map_err(|e| RenderError::PageSetup(e.to_string()))?;

        let mut paused =
            page.event_listener::<EventRequestPaused>().await.map_err(|e| RenderError::PageSetup(e.to_string()))?;
        page.execute(EnableParams::default()).await.map_err(|e| RenderError::PageSetup(e.to_string()))?;

        let blocked = self.config.blocked_hosts.clone();
        let interceptor = page.clone();
        guard.track(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let result = if should_block(&event.resource_type, &event.request.url, &blocked) {
                    tracing::trace!(url = %event.request.url, "blocked request");
                    interceptor
                        .execute(FailRequestParams::new(event.request_id.clone(), ErrorReason::BlockedByClient))
                        .await
                        .map(|_| ())
                } else {
                    interceptor.execute(ContinueRequestParams::new(event.request_id.clone())).await.map(|_| ())
                };
                if let Err(e) = result {
                    tracing::trace!(error = %e, "request interception reply failed");
                }
            }
        }));

        let viewport = self.config.viewport;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(viewport.width),
            i64::from(viewport.height),
            viewport.scale,
            false,
        ))
        .await
        .map_err(|e| RenderError::PageSetup(e.to_string()))?;

        Ok(())
    }

    async fn shoot(&self, guard: &mut PageGuard, url: &Url, opts: &RenderOptions) -> Result<Bytes, RenderError> {
        tokio::time::timeout(opts.capture, self.prepare(guard))
            .await
            .map_err(|_| RenderError::Timeout(opts.capture.as_millis() as u64))??;

        let page = guard.page().cloned().ok_or_else(|| RenderError::PageSetup("page already closed".into()))?;

        let mut loaded = page
            .event_listener::<EventDomContentEventFired>()
            .await
            .map_err(|e| RenderError::PageSetup(e.to_string()))?;

        let navigation = async {
            page.execute(NavigateParams::new(url.as_str())).await.map_err(|e| e.to_string())?;
            loaded.next().await;
            Ok::<(), String>(())
        };
        match tokio::time::timeout(opts.navigation, navigation).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(%url, error = %e, "navigation error, capturing anyway"),
            Err(_) => tracing::debug!(%url, budget_ms = opts.navigation.as_millis() as u64, "navigation timed out, capturing anyway"),
        }

        if !opts.settle.is_zero() {
            tokio::time::sleep(opts.settle).await;
        }

        let params = ScreenshotParams::builder().format(CaptureScreenshotFormat::Png).build();
        let png = tokio::time::timeout(opts.capture, page.screenshot(params))
            .await
            .map_err(|_| RenderError::Timeout(opts.capture.as_millis() as u64))?
            .map_err(|e| RenderError::Screenshot(e.to_string()))?;

        Ok(Bytes::from(png))
    }
}

impl Drop for HeadlessRenderer {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl Renderer for HeadlessRenderer {
    async fn capture(&self, url: &Url, opts: &RenderOptions) -> Result<Bytes, RenderError> {
        let start = std::time::Instant::now();

        let page = tokio::time::timeout(opts.capture, self.browser.new_page("about:blank"))
            .await
            .map_err(|_| RenderError::Timeout(opts.capture.as_millis() as u64))?
            .map_err(|e| RenderError::PageSetup(e.to_string()))?;
        let mut guard = PageGuard::new(page, url);

        let result = self.shoot(&mut guard, url, opts).await;
        guard.close().await;

        if let Ok(png) = &result {
            tracing::debug!(%url, bytes = png.len(), elapsed_ms = start.elapsed().as_millis() as u64, "page captured");
        }
        result
    }
}
