//! Cloudflare Images v1 client.
//!
//! ### Endpoints
//!
//! - **Upload**: `POST {api_base}/accounts/{account}/images/v1`, multipart
//!   `file` plus `requireSignedURLs=false`
//! - **Original**: `GET .../images/v1/{id}/blob`
//! - **Delete**: `DELETE .../images/v1/{id}`
//! - **Authentication**: `Authorization: Bearer <token>`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{StatusCode, Url, header, multipart};

use super::response::{ApiEnvelope, UploadResult};
use super::{ImageStore, ImageStoreError, StoredImage, UploadedImage};
use capcache_core::AppConfig;

/// Default API base URL.
const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Image API client configuration.
#[derive(Debug, Clone)]
pub struct ImagesClientConfig {
    pub account_id: String,
    pub api_token: String,
    /// Base URL (default: https://api.cloudflare.com/client/v4).
    pub api_base: String,
    pub timeout: Duration,
}

impl Default for ImagesClientConfig {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            api_token: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ImagesClientConfig {
    /// Build from application config.
    ///
    /// # Errors
    ///
    /// Returns `ImageStoreError::NotConfigured` when the account id or token is missing.
    pub fn from_app(config: &AppConfig) -> Result<Self, ImageStoreError> {
        let (account_id, api_token) =
            config.require_images_credentials().map_err(|e| ImageStoreError::NotConfigured(e.to_string()))?;
        Ok(Self {
            account_id: account_id.to_string(),
            api_token: api_token.to_string(),
            api_base: config.images.api_base.clone(),
            timeout: config.images.timeout(),
        })
    }
}

/// Cloudflare Images API client.
#[derive(Debug, Clone)]
pub struct CloudflareImages {
    http: reqwest::Client,
    config: ImagesClientConfig,
}

impl CloudflareImages {
    /// Create a new client with the given configuration.
    pub fn new(config: ImagesClientConfig) -> Result<Self, ImageStoreError> {
        if config.account_id.is_empty() || config.api_token.is_empty() {
            return Err(ImageStoreError::NotConfigured("account id and API token are required".into()));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ImageStoreError::Network(Arc::new(e)))?;

        Ok(Self { http, config })
    }

    /// `{api_base}/accounts/{account}/images/v1[/extra...]`, with every
    /// segment percent-encoded.
    fn endpoint(&self, extra: &[&str]) -> Result<Url, ImageStoreError> {
        let mut url = Url::parse(self.config.api_base.trim_end_matches('/'))
            .map_err(|e| ImageStoreError::NotConfigured(format!("invalid api_base: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ImageStoreError::NotConfigured("api_base cannot be a base URL".into()))?
            .pop_if_empty()
            .extend(["accounts", self.config.account_id.as_str(), "images", "v1"])
            .extend(extra);
        Ok(url)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.bearer_auth(&self.config.api_token)
    }
}

fn check_status(status: StatusCode, id: &str) -> Result<(), ImageStoreError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ImageStoreError::AuthError);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(ImageStoreError::NotFound(id.to_string()));
    }
    if status.is_client_error() || status.is_server_error() {
        return Err(ImageStoreError::HttpError { status: status.as_u16() });
    }
    Ok(())
}

#[async_trait]
impl ImageStore for CloudflareImages {
    async fn upload(&self, png: Bytes) -> Result<UploadedImage, ImageStoreError> {
        let url = self.endpoint(&[])?;
        let file = multipart::Part::bytes(png.to_vec())
            .file_name("capture.png")
            .mime_str("image/png")
            .map_err(|e| ImageStoreError::Parse(e.to_string()))?;
        let form = multipart::Form::new().part("file", file).text("requireSignedURLs", "false");

        let response = self.authorized(self.http.post(url)).multipart(form).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ImageStoreError::AuthError);
        }

        let bytes = response.bytes().await?;
        let envelope: ApiEnvelope<UploadResult> =
            serde_json::from_slice(&bytes).map_err(|e| ImageStoreError::Parse(e.to_string()))?;

        if !status.is_success() || !envelope.success {
            tracing::debug!(status = status.as_u16(), errors = %envelope.error_summary(), "image upload rejected");
            return Err(ImageStoreError::Api(envelope.error_summary()));
        }

        let result = envelope.result.ok_or_else(|| ImageStoreError::Parse("missing result".into()))?;
        if result.id.is_empty() {
            return Err(ImageStoreError::Parse("empty image id".into()));
        }

        tracing::debug!(id = %result.id, variants = result.variants.len(), "image uploaded");
        Ok(UploadedImage { id: result.id, variants: result.variants })
    }

    async fn fetch_original(&self, id: &str) -> Result<StoredImage, ImageStoreError> {
        let url = self.endpoint(&[id, "blob"])?;
        let response = self.authorized(self.http.get(url)).send().await?;
        check_status(response.status(), id)?;

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if !content_type.to_ascii_lowercase().starts_with("image/") {
            return Err(ImageStoreError::NotImage(content_type));
        }

        let bytes = response.bytes().await?;
        Ok(StoredImage { bytes, content_type })
    }

    async fn delete(&self, id: &str) -> Result<(), ImageStoreError> {
        let url = self.endpoint(&[id])?;
        let response = self.authorized(self.http.delete(url)).send().await?;
        check_status(response.status(), id)?;
        tracing::debug!(id, "image deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::Router;
    use axum::body::Bytes as AxumBytes;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode as AxumStatus, header::CONTENT_TYPE};
    use axum::response::IntoResponse;
    use axum::routing::{delete, get, post};

    use super::*;
    use crate::fetch::testing::spawn_origin;

    #[derive(Default)]
    struct Seen {
        deleted: Vec<String>,
        upload_auth: Option<String>,
        upload_body: Vec<u8>,
    }

    type Shared = Arc<Mutex<Seen>>;

    async fn upload(State(seen): State<Shared>, headers: HeaderMap, body: AxumBytes) -> impl IntoResponse {
        let mut seen = seen.lock().unwrap();
        seen.upload_auth = headers.get("authorization").and_then(|v| v.to_str().ok()).map(String::from);
        seen.upload_body = body.to_vec();
        (
            [(CONTENT_TYPE, "application/json")],
            r#"{"success":true,"errors":[],"result":{"id":"img-1","variants":["https://imagedelivery.net/acct/img-1/public"]}}"#,
        )
    }

    async fn blob(Path(id): Path<String>) -> impl IntoResponse {
        match id.as_str() {
            "img-1" => ([(CONTENT_TYPE, "image/png")], vec![7u8; 3]).into_response(),
            "broken" => ([(CONTENT_TYPE, "text/plain")], "oops").into_response(),
            _ => AxumStatus::NOT_FOUND.into_response(),
        }
    }

    async fn remove(State(seen): State<Shared>, Path(id): Path<String>) -> impl IntoResponse {
        seen.lock().unwrap().deleted.push(id);
        ([(CONTENT_TYPE, "application/json")], r#"{"success":true,"errors":[],"result":{}}"#)
    }

    async fn store() -> (CloudflareImages, Shared) {
        let seen: Shared = Arc::default();
        let app = Router::new()
            .route("/client/v4/accounts/acct/images/v1", post(upload))
            .route("/client/v4/accounts/acct/images/v1/:id/blob", get(blob))
            .route("/client/v4/accounts/acct/images/v1/:id", delete(remove))
            .with_state(seen.clone());
        let addr = spawn_origin(app).await;

        let config = ImagesClientConfig {
            account_id: "acct".into(),
            api_token: "secret".into(),
            api_base: format!("http://{addr}/client/v4"),
            timeout: Duration::from_secs(2),
        };
        (CloudflareImages::new(config).unwrap(), seen)
    }

    #[test]
    fn test_new_requires_credentials() {
        let result = CloudflareImages::new(ImagesClientConfig::default());
        assert!(matches!(result, Err(ImageStoreError::NotConfigured(_))));
    }

    #[test]
    fn test_from_app_missing_credentials() {
        let result = ImagesClientConfig::from_app(&AppConfig::default());
        assert!(matches!(result, Err(ImageStoreError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_upload_sends_bearer_and_form() {
        let (store, seen) = store().await;
        let uploaded = store.upload(Bytes::from_static(b"\x89PNG")).await.unwrap();
        assert_eq!(uploaded.id, "img-1");
        assert_eq!(uploaded.preferred_variant(), Some("https://imagedelivery.net/acct/img-1/public"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.upload_auth.as_deref(), Some("Bearer secret"));
        let body = String::from_utf8_lossy(&seen.upload_body);
        assert!(body.contains("name=\"requireSignedURLs\""));
        assert!(body.contains("name=\"file\"; filename=\"capture.png\""));
    }

    #[tokio::test]
    async fn test_fetch_original() {
        let (store, _) = store().await;
        let image = store.fetch_original("img-1").await.unwrap();
        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.bytes.len(), 3);

        assert!(matches!(store.fetch_original("broken").await, Err(ImageStoreError::NotImage(_))));
        assert!(matches!(store.fetch_original("gone").await, Err(ImageStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, seen) = store().await;
        store.delete("old-id").await.unwrap();
        assert_eq!(seen.lock().unwrap().deleted, vec!["old-id".to_string()]);
    }

    #[test]
    fn test_endpoint_encodes_id() {
        let config = ImagesClientConfig { account_id: "acct".into(), api_token: "t".into(), ..Default::default() };
        let store = CloudflareImages::new(config).unwrap();
        let url = store.endpoint(&["a/b", "blob"]).unwrap();
        assert_eq!(url.as_str(), "https://api.cloudflare.com/client/v4/accounts/acct/images/v1/a%2Fb/blob");
    }
}
