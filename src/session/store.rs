//! Durable storage of session records, one MessagePack file per token.

use std::path::{Path, PathBuf};
use tracing::debug;

use super::{
    error::{Result, SessionError},
    record::{token_hint, SessionRecord},
    shard::{self, ShardLayout},
    token,
};

const TOKEN_SHARD_FIRST: usize = 3;
const TOKEN_SHARD_SECOND: usize = 3;

#[derive(Clone, Debug)]
pub struct SessionStore {
    layout: ShardLayout,
}

impl SessionStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            layout: ShardLayout::new(root, TOKEN_SHARD_FIRST, TOKEN_SHARD_SECOND),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    /// File location for `token`, `None` if the token is malformed.
    #[must_use]
    pub fn path_for(&self, token: &str) -> Option<PathBuf> {
        token::is_well_formed(token).then(|| self.layout.path_for(token))
    }

    /// Persist the full record.
    ///
    /// # Errors
    /// `NotAuthenticated` for a malformed token, `Encode` or `Storage` otherwise.
    pub async fn save(&self, record: &SessionRecord) -> Result<()> {
        let path = self
            .path_for(&record.token)
            .ok_or(SessionError::NotAuthenticated)?;
        let encoded = rmp_serde::to_vec_named(record)?;
        shard::write_atomic(&path, &encoded).await
    }

    /// Load the record for `token`.
    ///
    /// # Errors
    /// `NotAuthenticated` when the token is malformed or unknown, `Corrupt`
    /// when the file cannot be decoded, `Storage` on I/O failure.
    pub async fn load(&self, token: &str) -> Result<SessionRecord> {
        let path = self.path_for(token).ok_or(SessionError::NotAuthenticated)?;
        let Some(bytes) = shard::read(&path).await? else {
            debug!(token = token_hint(token), "session record not found");
            return Err(SessionError::NotAuthenticated);
        };
        rmp_serde::from_slice(&bytes).map_err(|source| SessionError::Corrupt { path, source })
    }

    /// Remove the record for `token`. Missing records are not an error.
    ///
    /// # Errors
    /// `Storage` when the file exists but cannot be removed.
    pub async fn delete(&self, token: &str) -> Result<()> {
        let Some(path) = self.path_for(token) else {
            return Ok(());
        };
        if !shard::remove(&path).await? {
            debug!(token = token_hint(token), "session record already gone");
        }
        Ok(())
    }

    /// Tokens of every record on disk.
    ///
    /// # Errors
    /// `Storage` when the tree cannot be walked.
    pub async fn tokens(&self) -> Result<Vec<String>> {
        let mut tokens = self.layout.keys().await?;
        tokens.retain(|token| token::is_well_formed(token));
        Ok(tokens)
    }
}
