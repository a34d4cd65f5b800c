//! HTTP surface: health check, capture dispatch and the static landing.

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::{Value, json};
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::capture::{self, CaptureParams};
use crate::state::AppState;

const X_CAPTURE_LANDING: HeaderName = HeaderName::from_static("x-capture-landing");

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .fallback(dispatch)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn is_capture_path(path: &str) -> bool {
    path.starts_with("/screenshot") || path.starts_with("/api/screenshot")
}

async fn dispatch(State(state): State<AppState>, req: Request) -> Response {
    let params = CaptureParams::from_query(req.uri().query());
    if is_capture_path(req.uri().path()) || params.has_url() {
        let (response, deferred) = capture::handle(&state, params).await;
        state.tasks.spawn(deferred);
        return response;
    }
    landing(&state, req).await
}

async fn landing(state: &AppState, req: Request) -> Response {
    let assets = ServeDir::new(&state.config.assets_dir);
    let mut response = match assets.oneshot(req).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    };
    response.headers_mut().insert(X_CAPTURE_LANDING, HeaderValue::from_static("1"));
    response.into_response()
}
