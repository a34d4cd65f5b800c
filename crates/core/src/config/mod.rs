//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (CAPCACHE_*, nested keys split on `__`)
//! 2. TOML config file (if CAPCACHE_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! The loaded value is built once at process start and shared read-only.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Desktop Chrome user agent used for probes, meta fetches and rendering.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (CAPCACHE_*)
/// 2. TOML config file (if CAPCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Socket address the HTTP server binds to.
    ///
    /// Set via CAPCACHE_BIND_ADDR environment variable.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Trusted root domain; it and its subdomains may be rendered.
    ///
    /// Set via CAPCACHE_ROOT_DOMAIN environment variable.
    #[serde(default = "default_root_domain")]
    pub root_domain: String,

    /// Path to the SQLite key-value store.
    ///
    /// Set via CAPCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Directory served for every non-capture path.
    ///
    /// Set via CAPCACHE_ASSETS_DIR environment variable.
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,

    /// User-Agent string for outbound requests and the renderer.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Accept-Language header for outbound requests and the renderer.
    #[serde(default = "default_accept_language")]
    pub accept_language: String,

    /// Maximum bytes read from any fetched page or image.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Whether the headless browser is launched at startup.
    ///
    /// Set via CAPCACHE_RENDER_ENABLED environment variable.
    #[serde(default = "default_true")]
    pub render_enabled: bool,

    /// Hosts whose requests are aborted while rendering (analytics, trackers).
    #[serde(default = "default_blocked_hosts")]
    pub blocked_hosts: Vec<String>,

    #[serde(default)]
    pub timeouts: Timeouts,

    #[serde(default)]
    pub viewport: Viewport,

    #[serde(default)]
    pub images: ImagesConfig,

    #[serde(default)]
    pub refresh: RefreshConfig,
}

/// Per-phase time budgets, all in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeouts {
    /// Overall per-request deadline.
    #[serde(default = "default_overall_ms")]
    pub overall_ms: u64,
    #[serde(default = "default_preflight_ms")]
    pub preflight_ms: u64,
    /// HTML fetch for social meta extraction.
    #[serde(default = "default_og_html_ms")]
    pub og_html_ms: u64,
    /// Download of the selected social image (also bounds cached variant fetches).
    #[serde(default = "default_og_image_ms")]
    pub og_image_ms: u64,
    #[serde(default = "default_navigation_ms")]
    pub navigation_ms: u64,
    /// Upper bound for the post-navigation settle wait.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Settle wait after DOMContentLoaded.
    #[serde(default = "default_idle_time_ms")]
    pub idle_time_ms: u64,
    /// Floor applied to every derived sub-budget.
    #[serde(default = "default_min_budget_ms")]
    pub min_budget_ms: u64,
}

/// Rendered viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    #[serde(default = "default_viewport_width")]
    pub width: u32,
    #[serde(default = "default_viewport_height")]
    pub height: u32,
    /// Device pixel ratio.
    #[serde(default = "default_viewport_scale")]
    pub scale: f64,
}

/// Image-hosting API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// Set via CAPCACHE_IMAGES__ACCOUNT_ID.
    #[serde(default)]
    pub account_id: Option<String>,
    /// Bearer token. Set via CAPCACHE_IMAGES__API_TOKEN.
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_images_api_base")]
    pub api_base: String,
    /// Host of public delivery URLs, used to recover image ids from old records.
    #[serde(default = "default_delivery_host")]
    pub delivery_host: String,
    #[serde(default = "default_images_timeout_ms")]
    pub timeout_ms: u64,
}

/// Background refresher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_refresh_interval_secs")]
    pub interval_secs: u64,
    /// Keys processed per sweep.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8787".into()
}

fn default_root_domain() -> String {
    "example.dev".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./capcache.sqlite")
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("./public")
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}

fn default_accept_language() -> String {
    "en-US,en;q=0.9".into()
}

fn default_max_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_blocked_hosts() -> Vec<String> {
    [
        "googletagmanager.com",
        "google-analytics.com",
        "doubleclick.net",
        "googlesyndication.com",
        "facebook.net",
        "facebook.com",
        "hotjar.com",
        "hotjar.io",
        "segment.io",
        "amplitude.com",
        "mixpanel.com",
        "clarity.ms",
        "yandex.ru",
        "yandex.com",
        "cloudflareinsights.com",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_overall_ms() -> u64 {
    25_000
}

fn default_preflight_ms() -> u64 {
    4_000
}

fn default_og_html_ms() -> u64 {
    4_000
}

fn default_og_image_ms() -> u64 {
    7_000
}

fn default_navigation_ms() -> u64 {
    20_000
}

fn default_idle_timeout_ms() -> u64 {
    3_000
}

fn default_idle_time_ms() -> u64 {
    800
}

fn default_min_budget_ms() -> u64 {
    1_000
}

fn default_viewport_width() -> u32 {
    1200
}

fn default_viewport_height() -> u32 {
    630
}

fn default_viewport_scale() -> f64 {
    2.0
}

fn default_images_api_base() -> String {
    "https://api.cloudflare.com/client/v4".into()
}

fn default_delivery_host() -> String {
    "imagedelivery.net".into()
}

fn default_images_timeout_ms() -> u64 {
    15_000
}

fn default_refresh_interval_secs() -> u64 {
    3_600
}

fn default_batch_size() -> usize {
    10
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            overall_ms: default_overall_ms(),
            preflight_ms: default_preflight_ms(),
            og_html_ms: default_og_html_ms(),
            og_image_ms: default_og_image_ms(),
            navigation_ms: default_navigation_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            idle_time_ms: default_idle_time_ms(),
            min_budget_ms: default_min_budget_ms(),
        }
    }
}

impl Timeouts {
    pub fn overall(&self) -> Duration {
        Duration::from_millis(self.overall_ms)
    }

    pub fn preflight(&self) -> Duration {
        Duration::from_millis(self.preflight_ms)
    }

    pub fn og_html(&self) -> Duration {
        Duration::from_millis(self.og_html_ms)
    }

    pub fn og_image(&self) -> Duration {
        Duration::from_millis(self.og_image_ms)
    }

    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn idle_time(&self) -> Duration {
        Duration::from_millis(self.idle_time_ms)
    }

    pub fn min_budget(&self) -> Duration {
        Duration::from_millis(self.min_budget_ms)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: default_viewport_width(), height: default_viewport_height(), scale: default_viewport_scale() }
    }
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            account_id: None,
            api_token: None,
            api_base: default_images_api_base(),
            delivery_host: default_delivery_host(),
            timeout_ms: default_images_timeout_ms(),
        }
    }
}

impl ImagesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { enabled: true, interval_secs: default_refresh_interval_secs(), batch_size: default_batch_size() }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            root_domain: default_root_domain(),
            db_path: default_db_path(),
            assets_dir: default_assets_dir(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            max_bytes: default_max_bytes(),
            render_enabled: true,
            blocked_hosts: default_blocked_hosts(),
            timeouts: Timeouts::default(),
            viewport: Viewport::default(),
            images: ImagesConfig::default(),
            refresh: RefreshConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `CAPCACHE_`
    /// 2. TOML file from `CAPCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("CAPCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("CAPCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Image-hosting credentials, checked lazily so the server can still
    /// serve meta images and stale cache entries without them.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the account id or API token is not set.
    pub fn require_images_credentials(&self) -> Result<(&str, &str), ConfigError> {
        let account = self.images.account_id.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "images.account_id".into(),
            hint: "Set CAPCACHE_IMAGES__ACCOUNT_ID environment variable".into(),
        })?;
        let token = self.images.api_token.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "images.api_token".into(),
            hint: "Set CAPCACHE_IMAGES__API_TOKEN environment variable".into(),
        })?;
        Ok((account, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./capcache.sqlite"));
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.timeouts.overall_ms, 25_000);
        assert_eq!(config.timeouts.preflight_ms, 4_000);
        assert_eq!(config.viewport, Viewport { width: 1200, height: 630, scale: 2.0 });
        assert_eq!(config.refresh.batch_size, 10);
        assert!(config.render_enabled);
        assert!(config.blocked_hosts.iter().any(|h| h == "google-analytics.com"));
        assert!(config.images.account_id.is_none());
    }

    #[test]
    fn test_timeout_durations() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.overall(), Duration::from_secs(25));
        assert_eq!(timeouts.navigation(), Duration::from_secs(20));
        assert_eq!(timeouts.idle_time(), Duration::from_millis(800));
        assert_eq!(timeouts.min_budget(), Duration::from_secs(1));
    }

    #[test]
    fn test_require_images_credentials_missing() {
        let config = AppConfig::default();
        let result = config.require_images_credentials();
        assert!(matches!(result, Err(ConfigError::Missing { field, .. }) if field == "images.account_id"));
    }

    #[test]
    fn test_require_images_credentials_missing_token() {
        let config = AppConfig {
            images: ImagesConfig { account_id: Some("acct".into()), ..Default::default() },
            ..Default::default()
        };
        let result = config.require_images_credentials();
        assert!(matches!(result, Err(ConfigError::Missing { field, .. }) if field == "images.api_token"));
    }

    #[test]
    fn test_require_images_credentials_present() {
        let config = AppConfig {
            images: ImagesConfig {
                account_id: Some("acct".into()),
                api_token: Some("secret".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(config.require_images_credentials().unwrap(), ("acct", "secret"));
    }

    #[test]
    fn test_nested_values_from_toml() {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::string(
                r#"
                root_domain = "root.dev"

                [timeouts]
                overall_ms = 10000

                [refresh]
                batch_size = 5
                "#,
            ))
            .extract()
            .unwrap();
        assert_eq!(config.root_domain, "root.dev");
        assert_eq!(config.timeouts.overall_ms, 10_000);
        assert_eq!(config.timeouts.preflight_ms, 4_000);
        assert_eq!(config.refresh.batch_size, 5);
    }
}
