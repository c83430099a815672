// src/server/http.rs

//! The HTTP surface sharing the WebSocket port: the UI page, static assets
//! and the `/data` snapshot endpoint. All of it is gated by `HTTP_response`.

use super::gateway;
use crate::core::state::ServerState;
use axum::Json;
use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{ConnectInfo, Path as UrlPath, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Builds the router serving both WebSocket upgrades and plain HTTP.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/data", get(data_handler))
        .route("/{file}", get(asset_handler))
        .with_state(state)
}

/// `/` is the WebSocket endpoint for upgrade requests and the UI page otherwise.
async fn root_handler(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match upgrade {
        Ok(upgrade) => gateway::accept(upgrade, addr, state),
        Err(_) => serve_public_file(&state, "index.html", addr).await,
    }
}

async fn asset_handler(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    UrlPath(file): UrlPath<String>,
) -> Response {
    serve_public_file(&state, &file, addr).await
}

/// Returns the current variable table as a JSON object.
async fn data_handler(State(state): State<Arc<ServerState>>) -> Response {
    if !state.config.http_response {
        return forbidden();
    }
    let snapshot = state.store.snapshot().await;
    Json(snapshot.as_table().clone()).into_response()
}

async fn serve_public_file(state: &ServerState, file: &str, addr: SocketAddr) -> Response {
    if !state.config.http_response {
        return forbidden();
    }
    let Some(path) = resolve_public_path(Path::new(&state.config.public_dir), file) else {
        warn!("[404] {} requested an invalid path '{}'.", addr, file);
        return not_found();
    };

    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => {
            warn!("[404] {} requested '{}', which is not a file.", addr, file);
            return not_found();
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("[404] IP: {} PATH: {}", addr, file);
            return not_found();
        }
        Err(e) => {
            error!("Failed to stat '{}': {}", path.display(), e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    match tokio::fs::read(&path).await {
        Ok(body) => {
            debug!("Serving '{}' to {}", path.display(), addr);
            ([(header::CONTENT_TYPE, content_type_for(&path))], body).into_response()
        }
        Err(e) => {
            error!("Failed to read '{}': {}", path.display(), e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Joins a single requested file name onto `public_dir`. Rejects anything
/// that is not exactly one plain path component.
pub fn resolve_public_path(public_dir: &Path, file: &str) -> Option<PathBuf> {
    let requested = Path::new(file);
    let mut components = requested.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if !file.contains('\\') => {
            Some(public_dir.join(name))
        }
        _ => None,
    }
}

/// Maps a file extension to a MIME type.
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, "403 Forbidden").into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "404 Not Found").into_response()
}
