//! Secondary index from subject id to that subject's live tokens.
//!
//! The index is eventually consistent with the session store and never the
//! source of truth. Every mutation is a read-modify-write under the subject
//! lock so concurrent logins for one subject cannot drop each other's entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{
    error::{Result, SessionError},
    lock::{LockKind, LockRegistry},
    shard::{self, ShardLayout},
};

const SUBJECT_SHARD_FIRST: usize = 4;
const SUBJECT_SHARD_SECOND: usize = 4;

/// Token to creation time.
pub type TokenMap = BTreeMap<String, DateTime<Utc>>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    subject_id: String,
    tokens: TokenMap,
}

#[derive(Clone, Debug)]
pub struct UserSessionIndex {
    layout: ShardLayout,
    locks: Arc<LockRegistry>,
}

impl UserSessionIndex {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, locks: Arc<LockRegistry>) -> Self {
        Self {
            layout: ShardLayout::new(root, SUBJECT_SHARD_FIRST, SUBJECT_SHARD_SECOND),
            locks,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    /// Index file location for `subject_id`.
    ///
    /// Subject ids are arbitrary strings, so the shard key is the hex SHA-256
    /// of the id.
    #[must_use]
    pub fn path_for(&self, subject_id: &str) -> PathBuf {
        self.layout.path_for(&subject_key(subject_id))
    }

    /// Register `token` for `subject_id`.
    ///
    /// # Errors
    /// `Storage`, `Corrupt` or `Encode` on read/write failure.
    pub async fn add_token(
        &self,
        subject_id: &str,
        token: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let _guard = self.locks.lock(LockKind::Subject, subject_id).await;
        let path = self.path_for(subject_id);
        let mut index = read_index(&path).await?;
        index.subject_id = subject_id.to_string();
        index.tokens.insert(token.to_string(), created_at);
        write_index(&path, &index).await
    }

    /// Add `token` only if it is not already present. Returns whether it was added.
    ///
    /// # Errors
    /// `Storage`, `Corrupt` or `Encode` on read/write failure.
    pub async fn ensure_token(
        &self,
        subject_id: &str,
        token: &str,
        created_at: DateTime<Utc>,
    ) -> Result<bool> {
        let _guard = self.locks.lock(LockKind::Subject, subject_id).await;
        let path = self.path_for(subject_id);
        let mut index = read_index(&path).await?;
        if index.tokens.contains_key(token) {
            return Ok(false);
        }
        index.subject_id = subject_id.to_string();
        index.tokens.insert(token.to_string(), created_at);
        write_index(&path, &index).await?;
        Ok(true)
    }

    /// Unregister `token`. Removing the last token deletes the index file.
    ///
    /// # Errors
    /// `Storage`, `Corrupt` or `Encode` on read/write failure.
    pub async fn remove_token(&self, subject_id: &str, token: &str) -> Result<()> {
        self.remove_tokens(subject_id, &[token.to_string()]).await
    }

    /// Unregister several tokens in one read-modify-write.
    ///
    /// # Errors
    /// `Storage`, `Corrupt` or `Encode` on read/write failure.
    pub async fn remove_tokens(&self, subject_id: &str, tokens: &[String]) -> Result<()> {
        let _guard = self.locks.lock(LockKind::Subject, subject_id).await;
        let path = self.path_for(subject_id);
        let mut index = read_index(&path).await?;

        let before = index.tokens.len();
        for token in tokens {
            index.tokens.remove(token);
        }
        if index.tokens.len() == before {
            return Ok(());
        }

        if index.tokens.is_empty() {
            debug!(subject_id, "last session gone, dropping index file");
            shard::remove(&path).await?;
            return Ok(());
        }
        write_index(&path, &index).await
    }

    /// Every token registered for `subject_id`, with its creation time.
    ///
    /// # Errors
    /// `Storage` or `Corrupt` on read failure.
    pub async fn list_tokens(&self, subject_id: &str) -> Result<TokenMap> {
        let path = self.path_for(subject_id);
        Ok(read_index(&path).await?.tokens)
    }
}

fn subject_key(subject_id: &str) -> String {
    hex::encode(Sha256::digest(subject_id.as_bytes()))
}

async fn read_index(path: &Path) -> Result<IndexFile> {
    let Some(bytes) = shard::read(path).await? else {
        return Ok(IndexFile::default());
    };
    rmp_serde::from_slice(&bytes).map_err(|source| {
        warn!(path = %path.display(), "undecodable session index");
        SessionError::Corrupt {
            path: path.to_path_buf(),
            source,
        }
    })
}

async fn write_index(path: &Path, index: &IndexFile) -> Result<()> {
    let encoded = rmp_serde::to_vec_named(index)?;
    shard::write_atomic(path, &encoded).await
}
