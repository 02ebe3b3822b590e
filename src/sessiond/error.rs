//! HTTP error mapping.
//!
//! Every re-authenticate condition collapses into the same 401 body so a
//! client cannot tell an unknown token from an expired or untrusted one.

use axum::{
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, error};

use crate::session::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized { clear_cookie: Option<HeaderValue> },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::Unauthorized { clear_cookie: None }
    }

    /// Attach a cookie-clearing header to an unauthorized response.
    #[must_use]
    pub fn with_cleared_cookie(self, cookie: Option<HeaderValue>) -> Self {
        match self {
            Self::Unauthorized { .. } => Self::Unauthorized {
                clear_cookie: cookie,
            },
            other => other,
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        if err.is_unauthorized() {
            debug!("session rejected: {err}");
            Self::unauthorized()
        } else {
            Self::Internal(err.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized { clear_cookie } => {
                let mut headers = HeaderMap::new();
                if let Some(cookie) = clear_cookie {
                    headers.insert(SET_COOKIE, cookie);
                }
                (
                    StatusCode::UNAUTHORIZED,
                    headers,
                    Json(json!({ "error": "unauthorized" })),
                )
                    .into_response()
            }
            Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            Self::Internal(message) => {
                error!(error = %message, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_session_errors_map_to_401() {
        for err in [
            SessionError::NotAuthenticated,
            SessionError::Expired,
            SessionError::Untrusted { score: 2 },
        ] {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn storage_errors_map_to_500() {
        let err = SessionError::Storage {
            path: "/tmp/sessions".into(),
            source: std::io::Error::other("disk full"),
        };
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn cleared_cookie_is_attached() {
        let cookie = HeaderValue::from_static("sessiond_session=; Max-Age=0");
        let response = ApiError::unauthorized()
            .with_cleared_cookie(Some(cookie.clone()))
            .into_response();
        assert_eq!(response.headers().get(SET_COOKIE), Some(&cookie));
    }
}
