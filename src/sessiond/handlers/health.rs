use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::fs;
use tracing::error;

use crate::{sessiond::state::AppState, GIT_COMMIT_HASH};

#[derive(Serialize, Deserialize, Debug)]
pub struct Health {
    pub commit: String,
    pub name: String,
    pub version: String,
    pub storage: String,
}

// axum handler for health
pub async fn health(state: Extension<Arc<AppState>>) -> impl IntoResponse {
    let base_dir = state.sessions().config().base_dir();
    let (status, storage) = match fs::metadata(base_dir).await {
        Ok(meta) if meta.is_dir() => (StatusCode::OK, "ok"),
        Ok(_) => {
            error!("Session directory is not a directory: {}", base_dir.display());
            (StatusCode::SERVICE_UNAVAILABLE, "error")
        }
        Err(err) => {
            error!("Session directory unavailable: {err}");
            (StatusCode::SERVICE_UNAVAILABLE, "error")
        }
    };

    let body = Json(Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage: storage.to_string(),
    });

    let short_hash = GIT_COMMIT_HASH.get(0..7).unwrap_or("");

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format!(
        "{}:{}:{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_hash
    )) {
        headers.insert("X-App", value);
    }

    (status, headers, body)
}
