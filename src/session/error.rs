//! Error taxonomy for the session layer.
//!
//! Callers only ever see two classes: unauthorized (re-authenticate) and
//! internal. The variants stay distinct so logs can tell them apart.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No token supplied, malformed token, or no record for it.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Record found but past its expiry.
    #[error("session expired")]
    Expired,

    /// Record found and alive, but the request did not score high enough.
    #[error("session untrusted (score {score})")]
    Untrusted { score: u8 },

    /// Record file exists but could not be decoded.
    #[error("corrupt session data at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: rmp_serde::decode::Error,
    },

    #[error("storage failure at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode session data: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Entropy source unavailable while minting a token or code.
    #[error("failed to generate {what}: {source}")]
    Generation {
        what: &'static str,
        #[source]
        source: rand::Error,
    },

    /// One or more cleanup steps of a destroy failed.
    #[error("session cleanup failed: {}", join_errors(.0))]
    Cleanup(Vec<SessionError>),
}

impl SessionError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// True for every condition the caller should answer with a uniform 401.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated | Self::Expired | Self::Untrusted { .. } | Self::Corrupt { .. }
        )
    }
}

fn join_errors(errors: &[SessionError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_classes() {
        assert!(SessionError::NotAuthenticated.is_unauthorized());
        assert!(SessionError::Expired.is_unauthorized());
        assert!(SessionError::Untrusted { score: 3 }.is_unauthorized());
        assert!(!SessionError::storage(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied")
        )
        .is_unauthorized());
    }

    #[test]
    fn cleanup_reports_every_failure() {
        let err = SessionError::Cleanup(vec![
            SessionError::storage("a", std::io::Error::other("disk gone")),
            SessionError::storage("b", std::io::Error::other("still gone")),
        ]);
        let message = err.to_string();
        assert!(message.contains("disk gone"));
        assert!(message.contains("still gone"));
        assert!(!err.is_unauthorized());
    }
}
