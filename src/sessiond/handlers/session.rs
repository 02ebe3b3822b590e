//! Current-session endpoints: inspect and log out.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, sync::Arc};
use tracing::error;

use crate::session::SessionRecord;
use crate::sessiond::state::AppState;

#[derive(Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub subject_id: String,
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<SessionRecord> for SessionResponse {
    fn from(record: SessionRecord) -> Self {
        Self {
            subject_id: record.subject_id,
            roles: record.roles,
            permissions: record.permissions,
            created_at: record.created_at,
            expires_at: record.expires_at,
        }
    }
}

pub async fn session(Extension(record): Extension<SessionRecord>) -> impl IntoResponse {
    Json(SessionResponse::from(record))
}

pub async fn logout(
    state: Extension<Arc<AppState>>,
    Extension(record): Extension<SessionRecord>,
) -> impl IntoResponse {
    if let Err(err) = state.sessions().destroy(&record).await {
        error!("Failed to destroy session: {err}");
    }

    // Always clear the cookie, even if cleanup failed.
    let mut headers = HeaderMap::new();
    if let Some(cookie) = state.clear_cookie() {
        headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, headers)
}
