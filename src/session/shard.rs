//! Two-level prefix sharded file tree with atomic writes.
//!
//! A key `abcdef0123...` under a 3/3 layout lives at `root/abc/def/0123...`.
//! Writes go to a hidden temp file in the same directory and are renamed into
//! place, so readers see either the old or the new content, never a torn file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};
use ulid::Ulid;

use super::error::{Result, SessionError};

#[derive(Clone, Debug)]
pub struct ShardLayout {
    root: PathBuf,
    first: usize,
    second: usize,
}

impl ShardLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, first: usize, second: usize) -> Self {
        Self {
            root: root.into(),
            first,
            second,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of `key`. The key must be ASCII and longer than both prefixes.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        let split = self.first + self.second;
        self.root
            .join(&key[..self.first])
            .join(&key[self.first..split])
            .join(&key[split..])
    }

    /// True when `key` is long enough to shard and has no path characters.
    #[must_use]
    pub fn accepts(&self, key: &str) -> bool {
        key.len() > self.first + self.second && key.bytes().all(|b| b.is_ascii_alphanumeric())
    }

    /// Every key currently stored under the root.
    ///
    /// # Errors
    /// Returns `SessionError::Storage` if a directory cannot be read.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for first in list_dir(&self.root).await? {
            let first_dir = self.root.join(&first);
            for second in list_dir(&first_dir).await? {
                let second_dir = first_dir.join(&second);
                for rest in list_dir(&second_dir).await? {
                    if rest.starts_with('.') {
                        continue;
                    }
                    keys.push(format!("{first}{second}{rest}"));
                }
            }
        }
        Ok(keys)
    }
}

async fn list_dir(dir: &Path) -> Result<Vec<String>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(SessionError::storage(dir, err)),
    };
    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|err| SessionError::storage(dir, err))?
    {
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Write `bytes` to `path` via temp file + rename.
///
/// # Errors
/// Returns `SessionError::Storage` on any filesystem failure.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| SessionError::storage(path, ErrorKind::InvalidInput.into()))?;
    fs::create_dir_all(parent)
        .await
        .map_err(|err| SessionError::storage(parent, err))?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("record");
    let tmp = parent.join(format!(".{file_name}.{}.tmp", Ulid::new()));

    let write = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        fs::rename(&tmp, path).await
    };
    if let Err(err) = write.await {
        let _ = fs::remove_file(&tmp).await;
        return Err(SessionError::storage(path, err));
    }
    Ok(())
}

/// Read the file at `path`, `None` when it does not exist.
///
/// # Errors
/// Returns `SessionError::Storage` on any other filesystem failure.
pub async fn read(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(SessionError::storage(path, err)),
    }
}

/// Remove the file at `path`. Returns whether something was removed.
///
/// # Errors
/// Returns `SessionError::Storage` on any failure other than "not found".
pub async fn remove(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(SessionError::storage(path, err)),
    }
}
