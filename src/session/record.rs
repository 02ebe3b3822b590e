//! The session record and the request metadata it is checked against.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Anything a session can be opened for.
///
/// The session layer only needs an identity and the capability sets; it
/// copies them into the record at creation and never reads the principal again.
pub trait Principal {
    fn identity(&self) -> String;
    fn roles(&self) -> BTreeSet<String>;
    fn permissions(&self) -> BTreeSet<String>;

    fn can(&self, permission: &str) -> bool {
        self.permissions().contains(permission)
    }

    fn has_role(&self, role: &str) -> bool {
        self.roles().contains(role)
    }
}

/// Fingerprintable fields of an incoming request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub client_ip: String,
    pub user_agent: String,
    pub accept_language: String,
    pub fingerprint: String,
}

impl RequestMeta {
    #[must_use]
    pub fn new(
        client_ip: impl Into<String>,
        user_agent: impl Into<String>,
        accept_language: impl Into<String>,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            client_ip: client_ip.into(),
            user_agent: user_agent.into(),
            accept_language: accept_language.into(),
            fingerprint: fingerprint.into(),
        }
    }
}

/// One authenticated login, as persisted in the session store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub token: String,
    pub subject_id: String,
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
    pub client_ip: String,
    pub user_agent: String,
    pub accept_language: String,
    pub device_fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Build a fresh record for `principal`, captured from `meta`.
    #[must_use]
    pub fn new<P: Principal + ?Sized>(
        token: String,
        principal: &P,
        meta: &RequestMeta,
        lifetime: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token,
            subject_id: principal.identity(),
            roles: principal.roles(),
            permissions: principal.permissions(),
            client_ip: meta.client_ip.clone(),
            user_agent: meta.user_agent.clone(),
            accept_language: meta.accept_language.clone(),
            device_fingerprint: meta.fingerprint.clone(),
            created_at: now,
            updated_at: now,
            expires_at: now + lifetime,
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Push expiry out to `now + lifetime`.
    pub fn touch(&mut self, lifetime: Duration, now: DateTime<Utc>) {
        self.updated_at = now;
        self.expires_at = now + lifetime;
    }

    #[must_use]
    pub fn can(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Short token prefix, safe for logs and listings.
    #[must_use]
    pub fn token_hint(&self) -> &str {
        token_hint(&self.token)
    }
}

pub(crate) fn token_hint(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal principal used across the session tests.
    pub(crate) struct TestUser {
        pub(crate) id: String,
    }

    impl Principal for TestUser {
        fn identity(&self) -> String {
            self.id.clone()
        }

        fn roles(&self) -> BTreeSet<String> {
            BTreeSet::from(["editor".to_string()])
        }

        fn permissions(&self) -> BTreeSet<String> {
            BTreeSet::from(["posts.write".to_string(), "posts.read".to_string()])
        }
    }

    fn record(lifetime: Duration, now: DateTime<Utc>) -> SessionRecord {
        let user = TestUser {
            id: "user-1".to_string(),
        };
        let meta = RequestMeta::new("1.2.3.4", "ua-A", "es", "fp-1");
        SessionRecord::new("a".repeat(64), &user, &meta, lifetime, now)
    }

    #[test]
    fn fresh_record_is_not_expired() {
        let now = Utc::now();
        let rec = record(Duration::minutes(10), now);
        assert!(!rec.is_expired_at(now));
        assert!(!rec.is_expired_at(now + Duration::minutes(10)));
        assert!(rec.is_expired_at(now + Duration::minutes(10) + Duration::seconds(1)));
        assert!(rec.expires_at >= rec.created_at);
    }

    #[test]
    fn record_snapshots_principal_and_meta() {
        let rec = record(Duration::minutes(10), Utc::now());
        assert_eq!(rec.subject_id, "user-1");
        assert!(rec.can("posts.write"));
        assert!(!rec.can("posts.delete"));
        assert!(rec.has_role("editor"));
        assert!(!rec.has_role("admin"));
        assert_eq!(rec.client_ip, "1.2.3.4");
        assert_eq!(rec.device_fingerprint, "fp-1");
        assert_eq!(rec.token_hint(), "aaaaaaaa");
    }

    #[test]
    fn touch_extends_expiry() {
        let now = Utc::now();
        let mut rec = record(Duration::minutes(10), now);
        let later = now + Duration::minutes(5);
        rec.touch(Duration::minutes(10), later);
        assert_eq!(rec.updated_at, later);
        assert_eq!(rec.expires_at, later + Duration::minutes(10));
        assert_eq!(rec.created_at, now);
    }

    #[test]
    fn principal_default_checks() {
        let user = TestUser {
            id: "user-1".to_string(),
        };
        assert!(user.can("posts.read"));
        assert!(user.has_role("editor"));
        assert!(!user.has_role("root"));
    }
}
