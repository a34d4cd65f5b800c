//! Shared application state.

use std::sync::Arc;

use capcache_client::{FetchClient, ImageStore, Renderer};
use capcache_core::{AppConfig, KvStore};

use crate::tasks::BackgroundTasks;

/// The external capabilities a capture needs. Each one is a trait object so
/// tests can swap in in-memory doubles.
pub struct Capabilities {
    pub kv: Arc<dyn KvStore>,
    pub images: Arc<dyn ImageStore>,
    pub renderer: Arc<dyn Renderer>,
    pub fetch: FetchClient,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub caps: Arc<Capabilities>,
    pub tasks: BackgroundTasks,
}

impl AppState {
    pub fn new(config: AppConfig, caps: Capabilities) -> Self {
        Self { config: Arc::new(config), caps: Arc::new(caps), tasks: BackgroundTasks::new() }
    }
}
