//! Shared server state.

use std::sync::Arc;

use super::{
    auth::Authenticator,
    cookie::{clear_session_cookie, session_cookie, CookieConfig},
};
use crate::session::SessionManager;
use axum::http::HeaderValue;
use tracing::error;

pub struct AppState {
    sessions: SessionManager,
    cookie: CookieConfig,
    authenticator: Arc<dyn Authenticator>,
}

impl AppState {
    #[must_use]
    pub fn new(
        sessions: SessionManager,
        cookie_secure: bool,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        let cookie = CookieConfig::new(sessions.config().lifetime_seconds(), cookie_secure);
        Self {
            sessions,
            cookie,
            authenticator,
        }
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    #[must_use]
    pub fn cookie(&self) -> &CookieConfig {
        &self.cookie
    }

    /// Cookie for `token`, or `None` (logged) if the header cannot be built.
    #[must_use]
    pub fn session_cookie(&self, token: &str) -> Option<HeaderValue> {
        session_cookie(&self.cookie, token)
            .map_err(|err| error!("Failed to build session cookie: {err}"))
            .ok()
    }

    #[must_use]
    pub fn clear_cookie(&self) -> Option<HeaderValue> {
        clear_session_cookie(&self.cookie)
            .map_err(|err| error!("Failed to build clearing cookie: {err}"))
            .ok()
    }
}
