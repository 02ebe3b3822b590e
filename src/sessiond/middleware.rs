//! Session gate for protected routes.
//!
//! On success the refreshed [`SessionRecord`] is attached to the request and
//! the cookie is re-issued with the new expiry. On failure the request stops
//! here with a 401 and the client cookie is cleared.

use axum::{
    extract::{ConnectInfo, Extension, Request},
    http::header::SET_COOKIE,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{net::SocketAddr, sync::Arc};

use super::{
    error::ApiError,
    extract::{extract_session_token, request_meta},
    state::AppState,
};
use crate::session::SessionRecord;

pub async fn require_session(
    Extension(state): Extension<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_session_token(request.headers()) else {
        return ApiError::unauthorized().into_response();
    };
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let meta = request_meta(request.headers(), peer);

    let record: SessionRecord = match state.sessions().load(&token, &meta).await {
        Ok(record) => record,
        Err(err) => {
            return ApiError::from(err)
                .with_cleared_cookie(state.clear_cookie())
                .into_response();
        }
    };

    let refreshed = state.session_cookie(&record.token);
    request.extensions_mut().insert(record);

    let mut response = next.run(request).await;
    // Handlers that already set a cookie (logout) win.
    if !response.headers().contains_key(SET_COOKIE) {
        if let Some(cookie) = refreshed {
            response.headers_mut().insert(SET_COOKIE, cookie);
        }
    }
    response
}
