//! Session cookie construction.

use axum::http::{header::InvalidHeaderValue, HeaderValue};

pub const SESSION_COOKIE_NAME: &str = "sessiond_session";

#[derive(Clone, Copy, Debug)]
pub struct CookieConfig {
    max_age_seconds: i64,
    secure: bool,
}

impl CookieConfig {
    #[must_use]
    pub fn new(max_age_seconds: i64, secure: bool) -> Self {
        Self {
            max_age_seconds,
            secure,
        }
    }

    #[must_use]
    pub fn secure(&self) -> bool {
        self.secure
    }
}

/// Build the `HttpOnly` cookie carrying the session token.
pub fn session_cookie(
    config: &CookieConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = config.max_age_seconds;
    let mut cookie =
        format!("{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    // Only mark cookies secure when TLS terminates in front of us.
    if config.secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Build a cookie that makes the client forget its session.
pub fn clear_session_cookie(config: &CookieConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT"
    );
    if config.secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_flags() {
        let cookie = session_cookie(&CookieConfig::new(600, false), "abc").unwrap();
        let value = cookie.to_str().unwrap();
        assert_eq!(
            value,
            "sessiond_session=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=600"
        );
    }

    #[test]
    fn secure_flag_follows_config() {
        let cookie = session_cookie(&CookieConfig::new(600, true), "abc").unwrap();
        assert!(cookie.to_str().unwrap().ends_with("; Secure"));

        let cleared = clear_session_cookie(&CookieConfig::new(600, true)).unwrap();
        let value = cleared.to_str().unwrap();
        assert!(value.starts_with("sessiond_session=;"));
        assert!(value.contains("Max-Age=0"));
        assert!(value.ends_with("; Secure"));
    }
}
