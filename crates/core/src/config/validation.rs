//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `root_domain` or `user_agent` is empty
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeouts.overall_ms` is outside 1s..=2min
    /// - `timeouts.min_budget_ms` is 0 or exceeds the overall deadline
    /// - the viewport is empty or its scale is outside (0, 4]
    /// - `refresh.batch_size` is 0 or above 1000
    pub fn validate(&self) -> Result<(), ConfigError> {
        let root = self.root_domain.trim();
        if root.is_empty() {
            return Err(invalid("root_domain", "must not be empty"));
        }
        if root.starts_with('.') || root.contains('/') {
            return Err(invalid("root_domain", "must be a bare hostname"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        let t = &self.timeouts;
        if t.overall_ms < 1_000 {
            return Err(invalid("timeouts.overall_ms", "must be at least 1000ms"));
        }
        if t.overall_ms > 120_000 {
            return Err(invalid("timeouts.overall_ms", "must not exceed 2 minutes (120000ms)"));
        }
        if t.min_budget_ms == 0 {
            return Err(invalid("timeouts.min_budget_ms", "must be greater than 0"));
        }
        if t.min_budget_ms > t.overall_ms {
            return Err(invalid("timeouts.min_budget_ms", "must not exceed timeouts.overall_ms"));
        }
        if t.idle_time_ms > t.idle_timeout_ms {
            tracing::warn!(
                idle_time_ms = t.idle_time_ms,
                idle_timeout_ms = t.idle_timeout_ms,
                "idle_time_ms exceeds idle_timeout_ms; settle wait is capped at idle_timeout_ms"
            );
        }

        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(invalid("viewport", "width and height must be greater than 0"));
        }
        if !(self.viewport.scale > 0.0 && self.viewport.scale <= 4.0) {
            return Err(invalid("viewport.scale", "must be in (0, 4]"));
        }

        if self.refresh.batch_size == 0 || self.refresh.batch_size > 1_000 {
            return Err(invalid("refresh.batch_size", "must be between 1 and 1000"));
        }
        if self.refresh.interval_secs == 0 {
            return Err(invalid("refresh.interval_secs", "must be at least 1 second"));
        }

        Ok(())
    }
}
