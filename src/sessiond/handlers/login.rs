use axum::{
    extract::{ConnectInfo, Extension},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, instrument};

use crate::sessiond::{error::ApiError, extract::request_meta, state::AppState};

#[derive(Deserialize)]
pub struct LoginRequest {
    subject: String,
    secret: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub token: String,
    pub subject_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Verify credentials and open a session.
///
/// The token comes back both as the session cookie and in the body for
/// bearer clients.
#[instrument(skip_all)]
pub async fn login(
    state: Extension<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Option<Json<LoginRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload".to_string()));
    };

    let Some(principal) = state
        .authenticator()
        .authenticate(request.subject.trim(), &request.secret)
    else {
        return Err(ApiError::unauthorized());
    };

    let meta = request_meta(&headers, peer.map(|info| info.0));
    let record = state.sessions().create(&principal, &meta).await?;
    info!(subject_id = %record.subject_id, "login succeeded");

    let mut response_headers = HeaderMap::new();
    if let Some(cookie) = state.session_cookie(&record.token) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    let body = LoginResponse {
        token: record.token,
        subject_id: record.subject_id,
        expires_at: record.expires_at,
    };
    Ok((StatusCode::CREATED, response_headers, Json(body)))
}
