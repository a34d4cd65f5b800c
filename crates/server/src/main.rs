//! capcache server entry point.
//!
//! Boots the HTTP capture service and the background refresher. Logging is
//! JSON to stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use capcache_client::{
    CloudflareImages, DisabledRenderer, FetchClient, FetchConfig, ImageStore, ImagesClientConfig, Renderer, Unconfigured,
};
use capcache_core::{AppConfig, CacheDb};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod capture;
mod error;
mod http;
mod refresh;
mod reply;
mod state;
mod tasks;
#[cfg(test)]
mod testing;

use state::{AppState, Capabilities};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    tracing::info!(bind = %config.bind_addr, root_domain = %config.root_domain, "starting capcache");

    let db = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening cache database at {}", config.db_path.display()))?;

    let caps = Capabilities {
        kv: Arc::new(db),
        images: image_store(&config),
        renderer: renderer(&config).await,
        fetch: FetchClient::new(FetchConfig::from_app(&config)).context("building fetch client")?,
    };
    let state = AppState::new(config, caps);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresher = state.config.refresh.enabled.then(|| {
        let state = state.clone();
        tokio::spawn(async move { refresh::run(&state, shutdown_rx).await })
    });

    let listener = tokio::net::TcpListener::bind(&state.config.bind_addr)
        .await
        .with_context(|| format!("binding {}", state.config.bind_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, http::router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = refresher {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "refresher task failed");
        }
    }

    tracing::info!(pending = state.tasks.pending(), "draining deferred tasks");
    state.tasks.drain().await;
    tracing::info!("shutdown complete");
    Ok(())
}

fn image_store(config: &AppConfig) -> Arc<dyn ImageStore> {
    match ImagesClientConfig::from_app(config).and_then(CloudflareImages::new) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(error = %e, "image store unavailable; captures will not be cached");
            Arc::new(Unconfigured)
        }
    }
}

#[cfg(feature = "render")]
async fn renderer(config: &AppConfig) -> Arc<dyn Renderer> {
    use capcache_client::{HeadlessRenderer, RendererConfig};

    if !config.render_enabled {
        tracing::info!("rendering disabled by configuration");
        return Arc::new(DisabledRenderer);
    }
    match HeadlessRenderer::launch(RendererConfig::from_app(config)).await {
        Ok(renderer) => Arc::new(renderer),
        Err(e) => {
            tracing::warn!(error = %e, "browser launch failed; rendering disabled");
            Arc::new(DisabledRenderer)
        }
    }
}

#[cfg(not(feature = "render"))]
async fn renderer(config: &AppConfig) -> Arc<dyn Renderer> {
    if config.render_enabled {
        tracing::warn!("built without the render feature; rendering disabled");
    }
    Arc::new(DisabledRenderer)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
