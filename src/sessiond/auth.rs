//! Credential check in front of session creation.
//!
//! Verifying who someone is stays outside the session layer; this module only
//! holds the boundary trait and a file-backed implementation for small
//! deployments.

use anyhow::{Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::session::Principal;

/// A principal resolved from credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedPrincipal {
    pub id: String,
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
}

impl Principal for AuthenticatedPrincipal {
    fn identity(&self) -> String {
        self.id.clone()
    }

    fn roles(&self) -> BTreeSet<String> {
        self.roles.clone()
    }

    fn permissions(&self) -> BTreeSet<String> {
        self.permissions.clone()
    }
}

pub trait Authenticator: Send + Sync {
    fn authenticate(&self, subject: &str, secret: &str) -> Option<AuthenticatedPrincipal>;
}

/// Rejects every login. Used when no credential source is configured.
#[derive(Clone, Debug)]
pub struct NoopAuthenticator;

impl Authenticator for NoopAuthenticator {
    fn authenticate(&self, _subject: &str, _secret: &str) -> Option<AuthenticatedPrincipal> {
        None
    }
}

#[derive(Debug, Deserialize)]
struct PrincipalEntry {
    id: String,
    secret_sha256: String,
    #[serde(default)]
    roles: BTreeSet<String>,
    #[serde(default)]
    permissions: BTreeSet<String>,
}

#[derive(Debug)]
struct StoredPrincipal {
    digest: Vec<u8>,
    principal: AuthenticatedPrincipal,
}

/// Principals read from a JSON array of
/// `{"id", "secret_sha256", "roles", "permissions"}` objects.
#[derive(Debug, Default)]
pub struct PrincipalsFile {
    principals: HashMap<String, StoredPrincipal>,
}

impl PrincipalsFile {
    /// Load and validate a principals file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or a digest is not
    /// 32 bytes of hex.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read principals file: {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("Invalid principals file: {}", path.display()))
    }

    /// Parse principals from JSON text.
    ///
    /// # Errors
    /// Returns an error on malformed JSON or digests.
    pub fn from_json(raw: &str) -> Result<Self> {
        let entries: Vec<PrincipalEntry> = serde_json::from_str(raw)?;
        let mut principals = HashMap::with_capacity(entries.len());
        for entry in entries {
            let digest = hex::decode(entry.secret_sha256.trim())
                .with_context(|| format!("secret_sha256 for {} is not hex", entry.id))?;
            anyhow::ensure!(
                digest.len() == 32,
                "secret_sha256 for {} must be 32 bytes",
                entry.id
            );
            principals.insert(
                entry.id.clone(),
                StoredPrincipal {
                    digest,
                    principal: AuthenticatedPrincipal {
                        id: entry.id,
                        roles: entry.roles,
                        permissions: entry.permissions,
                    },
                },
            );
        }
        Ok(Self { principals })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.principals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }
}

impl Authenticator for PrincipalsFile {
    fn authenticate(&self, subject: &str, secret: &str) -> Option<AuthenticatedPrincipal> {
        // Hash before the lookup so unknown subjects cost the same.
        let digest = Sha256::digest(secret.as_bytes());
        let stored = self.principals.get(subject)?;
        if bool::from(stored.digest.as_slice().ct_eq(digest.as_slice())) {
            Some(stored.principal.clone())
        } else {
            debug!(subject, "credential mismatch");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_hex(secret: &str) -> String {
        hex::encode(Sha256::digest(secret.as_bytes()))
    }

    fn principals() -> PrincipalsFile {
        let json = format!(
            r#"[{{"id":"alice","secret_sha256":"{}","roles":["admin"],"permissions":["users.read"]}}]"#,
            digest_hex("correct horse")
        );
        PrincipalsFile::from_json(&json).unwrap()
    }

    #[test]
    fn authenticates_matching_secret() {
        let principal = principals().authenticate("alice", "correct horse").unwrap();
        assert_eq!(principal.id, "alice");
        assert!(principal.has_role("admin"));
        assert!(principal.can("users.read"));
    }

    #[test]
    fn rejects_wrong_secret_and_unknown_subject() {
        let principals = principals();
        assert_eq!(principals.len(), 1);
        assert!(principals.authenticate("alice", "wrong").is_none());
        assert!(principals.authenticate("bob", "correct horse").is_none());
    }

    #[test]
    fn rejects_bad_digest() {
        assert!(PrincipalsFile::from_json(r#"[{"id":"a","secret_sha256":"zz"}]"#).is_err());
        assert!(PrincipalsFile::from_json(r#"[{"id":"a","secret_sha256":"abcd"}]"#).is_err());
    }

    #[tokio::test]
    async fn load_reads_principals_file() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("principals.json");
        tokio::fs::write(
            &path,
            format!(
                r#"[{{"id":"alice","secret_sha256":"{}"}}]"#,
                digest_hex("correct horse")
            ),
        )
        .await?;

        let principals = PrincipalsFile::load(&path).await?;
        assert_eq!(principals.len(), 1);
        assert!(principals.authenticate("alice", "correct horse").is_some());

        let missing = PrincipalsFile::load(&dir.path().join("absent.json")).await;
        assert!(missing.is_err());
        Ok(())
    }

    #[test]
    fn noop_rejects_everything() {
        assert!(NoopAuthenticator.authenticate("alice", "x").is_none());
    }
}
