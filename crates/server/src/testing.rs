//! In-memory doubles and a local origin for server tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use bytes::Bytes;
use capcache_client::{
    FetchClient, FetchConfig, ImageStore, ImageStoreError, RenderError, RenderOptions, Renderer, StoredImage,
    UploadedImage,
};
use capcache_core::config::RefreshConfig;
use capcache_core::{AppConfig, CacheDb, Error, KvStore, ListPage};
use tower::ServiceExt;
use url::Url;

use crate::http;
use crate::state::{AppState, Capabilities};

/// Render domain used by every test config.
pub const ROOT: &str = "root.dev";

pub const PNG: &[u8] = b"\x89PNG-test-capture";

/// Image store backed by a map.
#[derive(Default)]
pub struct MemoryImages {
    stored: Mutex<HashMap<String, Bytes>>,
    deleted: Mutex<Vec<String>>,
    next: AtomicUsize,
    fail_uploads: AtomicBool,
    fetch_delay: Mutex<Option<Duration>>,
}

impl MemoryImages {
    pub fn seed(&self, id: &str, bytes: &'static [u8]) {
        self.stored.lock().unwrap().insert(id.into(), Bytes::from_static(bytes));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.stored.lock().unwrap().contains_key(id)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> usize {
        self.next.load(Ordering::SeqCst)
    }

    pub fn fail_uploads(&self) {
        self.fail_uploads.store(true, Ordering::SeqCst);
    }

    /// Stall every `fetch_original` call for `delay`.
    pub fn delay_fetches(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl ImageStore for MemoryImages {
    async fn upload(&self, png: Bytes) -> Result<UploadedImage, ImageStoreError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(ImageStoreError::HttpError { status: 500 });
        }
        let id = format!("img-{}", self.next.fetch_add(1, Ordering::SeqCst) + 1);
        self.stored.lock().unwrap().insert(id.clone(), png);
        let variants = vec![format!("https://imagedelivery.net/acct/{id}/public")];
        Ok(UploadedImage { id, variants })
    }

    async fn fetch_original(&self, id: &str) -> Result<StoredImage, ImageStoreError> {
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let bytes = self.stored.lock().unwrap().get(id).cloned();
        bytes
            .map(|bytes| StoredImage { bytes, content_type: "image/png".into() })
            .ok_or_else(|| ImageStoreError::NotFound(id.into()))
    }

    async fn delete(&self, id: &str) -> Result<(), ImageStoreError> {
        self.stored.lock().unwrap().remove(id);
        self.deleted.lock().unwrap().push(id.into());
        Ok(())
    }
}

/// Renderer returning fixed bytes and counting calls.
#[derive(Default)]
pub struct StaticRenderer {
    calls: AtomicUsize,
}

impl StaticRenderer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for StaticRenderer {
    async fn capture(&self, _url: &Url, _opts: &RenderOptions) -> Result<Bytes, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Bytes::from_static(PNG))
    }
}

/// Renderer that always fails with the given error.
pub struct FailingRenderer(pub RenderError);

#[async_trait]
impl Renderer for FailingRenderer {
    async fn capture(&self, _url: &Url, _opts: &RenderOptions) -> Result<Bytes, RenderError> {
        Err(self.0.clone())
    }
}

/// Key-value store that logs every operation before delegating.
pub struct RecordingKv {
    inner: Arc<CacheDb>,
    ops: Mutex<Vec<String>>,
}

impl RecordingKv {
    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    fn record(&self, op: &str, key: &str) {
        self.ops.lock().unwrap().push(format!("{op} {key}"));
    }
}

#[async_trait]
impl KvStore for RecordingKv {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        self.record("get", key);
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), Error> {
        self.record("put", key);
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.record("delete", key);
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str, cursor: Option<&str>, limit: usize) -> Result<ListPage, Error> {
        self.record("list", prefix);
        self.inner.list(prefix, cursor, limit).await
    }
}

/// Serve `app` on an ephemeral localhost port.
pub async fn spawn_origin(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub fn test_config() -> AppConfig {
    AppConfig {
        root_domain: ROOT.into(),
        assets_dir: "./does-not-exist".into(),
        render_enabled: false,
        refresh: RefreshConfig { enabled: false, ..Default::default() },
        ..Default::default()
    }
}

/// A full application state wired to in-memory stores and a local origin
/// reachable as `root.dev`, `www.root.dev` and `127.0.0.1`.
pub struct Harness {
    pub state: AppState,
    pub db: Arc<CacheDb>,
    pub kv: Arc<RecordingKv>,
    pub images: Arc<MemoryImages>,
    pub origin: SocketAddr,
}

impl Harness {
    pub async fn new(origin: Router, renderer: Arc<dyn Renderer>) -> Self {
        Self::with_config(origin, renderer, test_config()).await
    }

    pub async fn with_config(origin: Router, renderer: Arc<dyn Renderer>, config: AppConfig) -> Self {
        let origin = spawn_origin(origin).await;
        let db = Arc::new(CacheDb::open_in_memory().await.unwrap());
        let kv = Arc::new(RecordingKv { inner: Arc::clone(&db), ops: Mutex::new(Vec::new()) });
        let images = Arc::new(MemoryImages::default());

        let http = reqwest::Client::builder()
            .resolve(ROOT, origin)
            .resolve(&format!("www.{ROOT}"), origin)
            .build()
            .unwrap();
        let caps = Capabilities {
            kv: kv.clone(),
            images: images.clone(),
            renderer,
            fetch: FetchClient::with_http(http, FetchConfig::default()),
        };
        let state = AppState::new(config, caps);
        Self { state, db, kv, images, origin }
    }

    /// `http://<host>:<origin port><path>`.
    pub fn target(&self, host: &str, path: &str) -> String {
        format!("http://{host}:{}{path}", self.origin.port())
    }

    pub async fn get(&self, uri: &str) -> Response {
        let req = Request::get(uri).body(Body::empty()).unwrap();
        http::router(self.state.clone()).oneshot(req).await.unwrap()
    }

    /// Wait for every deferred task spawned so far.
    pub async fn settle(&self) {
        self.state.tasks.drain().await;
    }

    pub async fn stored(&self, key: &str) -> Option<String> {
        self.db.get(key).await.unwrap()
    }

    pub async fn put(&self, key: &str, value: &str) {
        self.db.put(key, value).await.unwrap();
    }
}

pub async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
