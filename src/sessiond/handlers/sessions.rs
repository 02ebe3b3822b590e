//! Every session of the calling subject: list and revoke all.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::session::SessionRecord;
use crate::sessiond::{error::ApiError, state::AppState};

#[derive(Serialize, Deserialize, Debug)]
pub struct SessionSummary {
    /// Token prefix; the full token is never listed.
    pub token_hint: String,
    pub current: bool,
    pub client_ip: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub async fn list_sessions(
    state: Extension<Arc<AppState>>,
    Extension(current): Extension<SessionRecord>,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state.sessions().list_sessions(&current.subject_id).await?;
    let summaries: Vec<SessionSummary> = sessions
        .into_iter()
        .map(|record| SessionSummary {
            token_hint: record.token_hint().to_string(),
            current: record.token == current.token,
            client_ip: record.client_ip,
            user_agent: record.user_agent,
            created_at: record.created_at,
            updated_at: record.updated_at,
            expires_at: record.expires_at,
        })
        .collect();
    Ok(Json(summaries))
}

/// Log out everywhere, including the calling session.
pub async fn revoke_sessions(
    state: Extension<Arc<AppState>>,
    Extension(current): Extension<SessionRecord>,
) -> Result<impl IntoResponse, ApiError> {
    let revoked = state.sessions().destroy_all(&current.subject_id).await?;
    info!(subject_id = %current.subject_id, revoked, "revoked all sessions");

    let mut headers = HeaderMap::new();
    if let Some(cookie) = state.clear_cookie() {
        headers.insert(SET_COOKIE, cookie);
    }
    Ok((headers, Json(json!({ "revoked": revoked }))))
}
