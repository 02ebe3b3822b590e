//! Session lifecycle: create, load (validate + refresh), destroy.
//!
//! Lock discipline: an operation holds at most the token lock while touching
//! the primary record, and takes the subject lock (inside the index) only
//! after the token lock is released or from a separate task.

use chrono::{Duration, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::{
    error::{Result, SessionError},
    index::UserSessionIndex,
    lock::{LockKind, LockRegistry},
    record::{token_hint, Principal, RequestMeta, SessionRecord},
    store::SessionStore,
    token,
    trust::TrustScorer,
};

const DEFAULT_SESSION_LIFETIME_SECONDS: i64 = 7 * 24 * 60 * 60;
const RECORDS_DIR: &str = "records";
const INDEX_DIR: &str = "index";

#[derive(Clone, Debug)]
pub struct SessionConfig {
    base_dir: PathBuf,
    lifetime_seconds: i64,
    trust: TrustScorer,
}

impl SessionConfig {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            lifetime_seconds: DEFAULT_SESSION_LIFETIME_SECONDS,
            trust: TrustScorer::default(),
        }
    }

    #[must_use]
    pub fn with_lifetime_seconds(mut self, seconds: i64) -> Self {
        self.lifetime_seconds = seconds.max(1);
        self
    }

    #[must_use]
    pub fn with_trust_threshold(mut self, threshold: u8) -> Self {
        self.trust = self.trust.with_threshold(threshold);
        self
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[must_use]
    pub fn lifetime_seconds(&self) -> i64 {
        self.lifetime_seconds
    }

    #[must_use]
    pub fn lifetime(&self) -> Duration {
        Duration::seconds(self.lifetime_seconds)
    }
}

#[derive(Debug)]
pub struct SessionManager {
    config: SessionConfig,
    store: SessionStore,
    index: UserSessionIndex,
    locks: Arc<LockRegistry>,
    scorer: TrustScorer,
}

impl SessionManager {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        let locks = Arc::new(LockRegistry::new());
        let store = SessionStore::new(config.base_dir.join(RECORDS_DIR));
        let index = UserSessionIndex::new(config.base_dir.join(INDEX_DIR), locks.clone());
        let scorer = config.trust;
        Self {
            config,
            store,
            index,
            locks,
            scorer,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    #[must_use]
    pub fn index(&self) -> &UserSessionIndex {
        &self.index
    }

    #[must_use]
    pub fn scorer(&self) -> &TrustScorer {
        &self.scorer
    }

    /// Open a session for `principal`.
    ///
    /// The record save and the index registration run concurrently; both must
    /// succeed. A failure on one side does not roll back the other.
    ///
    /// # Errors
    /// `Generation` if no token could be minted, `Storage`/`Encode` on write failure.
    #[instrument(skip_all, fields(subject_id = %principal.identity()))]
    pub async fn create<P: Principal + ?Sized>(
        &self,
        principal: &P,
        meta: &RequestMeta,
    ) -> Result<SessionRecord> {
        let token = token::new_session_token()?;
        let record = SessionRecord::new(token, principal, meta, self.config.lifetime(), Utc::now());

        let save = async {
            let _guard = self.locks.lock(LockKind::Token, &record.token).await;
            self.store.save(&record).await
        };
        let register =
            self.index
                .add_token(&record.subject_id, &record.token, record.created_at);

        let (saved, registered) = tokio::join!(save, register);
        if let Err(err) = &saved {
            error!(token = record.token_hint(), "failed to save session record: {err}");
        }
        if let Err(err) = &registered {
            error!(token = record.token_hint(), "failed to index session: {err}");
        }
        saved?;
        registered?;

        info!(token = record.token_hint(), "session created");
        Ok(record)
    }

    /// Resolve `token` into a live, trusted, refreshed session.
    ///
    /// Expired and untrusted sessions are destroyed before the error is returned.
    ///
    /// # Errors
    /// `NotAuthenticated`, `Expired`, `Untrusted` or `Corrupt` for requests that
    /// must re-authenticate; `Storage`/`Encode` on I/O failure.
    #[instrument(skip_all, fields(token = token_hint(token)))]
    pub async fn load(&self, token: &str, meta: &RequestMeta) -> Result<SessionRecord> {
        if !token::is_well_formed(token) {
            return Err(SessionError::NotAuthenticated);
        }

        let guard = self.locks.lock(LockKind::Token, token).await;
        let mut record = match self.store.load(token).await {
            Ok(record) => record,
            Err(err @ SessionError::Corrupt { .. }) => {
                warn!("dropping undecodable session record: {err}");
                if let Err(cleanup) = self.store.delete(token).await {
                    error!("failed to delete corrupt session record: {cleanup}");
                }
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let now = Utc::now();
        if record.is_expired_at(now) {
            let deleted = self.store.delete(token).await;
            drop(guard);
            self.finish_destroy(&record, deleted).await;
            info!(subject_id = %record.subject_id, "session expired");
            return Err(SessionError::Expired);
        }

        let score = self.scorer.evaluate(&record, meta);
        if !self.scorer.accepts(score) {
            let deleted = self.store.delete(token).await;
            drop(guard);
            self.finish_destroy(&record, deleted).await;
            warn!(
                subject_id = %record.subject_id,
                score,
                threshold = self.scorer.threshold(),
                "untrusted session destroyed"
            );
            return Err(SessionError::Untrusted { score });
        }

        record.touch(self.config.lifetime(), now);
        self.store.save(&record).await?;
        drop(guard);

        self.repair_index(&record).await;

        debug!(score, "session accepted");
        Ok(record)
    }

    /// Extend the session's expiry and persist it.
    ///
    /// A session destroyed in the meantime is not brought back, and one that
    /// already expired is destroyed instead of extended.
    ///
    /// # Errors
    /// `NotAuthenticated` if the record no longer exists, `Expired` if it was
    /// past its expiry, `Storage`/`Encode` on failure.
    #[instrument(skip_all, fields(token = record.token_hint()))]
    pub async fn refresh(&self, record: &mut SessionRecord) -> Result<()> {
        let guard = self.locks.lock(LockKind::Token, &record.token).await;
        let stored = self.store.load(&record.token).await?;
        let now = Utc::now();
        if stored.is_expired_at(now) {
            let deleted = self.store.delete(&stored.token).await;
            drop(guard);
            self.finish_destroy(&stored, deleted).await;
            info!(subject_id = %stored.subject_id, "session expired");
            return Err(SessionError::Expired);
        }
        record.touch(self.config.lifetime(), now);
        record.created_at = stored.created_at;
        self.store.save(record).await
    }

    /// Remove the record and its index entry. Both are attempted; every
    /// failure is reported. Destroying an already destroyed session is a no-op.
    ///
    /// # Errors
    /// `Cleanup` listing each failed deletion.
    #[instrument(skip_all, fields(token = record.token_hint()))]
    pub async fn destroy(&self, record: &SessionRecord) -> Result<()> {
        let deleted = {
            let _guard = self.locks.lock(LockKind::Token, &record.token).await;
            self.store.delete(&record.token).await
        };
        let mut failures = Vec::new();
        if let Err(err) = deleted {
            failures.push(err);
        }
        if let Err(err) = self
            .index
            .remove_token(&record.subject_id, &record.token)
            .await
        {
            failures.push(err);
        }
        if failures.is_empty() {
            info!(subject_id = %record.subject_id, "session destroyed");
            Ok(())
        } else {
            Err(SessionError::Cleanup(failures))
        }
    }

    /// Live sessions of `subject_id`, oldest first.
    ///
    /// Index entries pointing at missing or corrupt records are pruned and
    /// expired records are destroyed along the way.
    ///
    /// # Errors
    /// `Storage` or `Corrupt` when the index cannot be read.
    #[instrument(skip(self))]
    pub async fn list_sessions(&self, subject_id: &str) -> Result<Vec<SessionRecord>> {
        let tokens = self.index.list_tokens(subject_id).await?;
        let now = Utc::now();
        let mut live = Vec::new();
        let mut stale = Vec::new();

        for token in tokens.keys() {
            match self.store.load(token).await {
                Ok(record) if record.subject_id != subject_id => stale.push(token.clone()),
                Ok(record) if record.is_expired_at(now) => {
                    if let Err(err) = self.destroy(&record).await {
                        warn!("failed to reap expired session: {err}");
                    }
                }
                Ok(record) => live.push(record),
                Err(SessionError::NotAuthenticated | SessionError::Corrupt { .. }) => {
                    stale.push(token.clone());
                }
                Err(err) => return Err(err),
            }
        }

        if !stale.is_empty() {
            debug!(count = stale.len(), "pruning stale index entries");
            self.index.remove_tokens(subject_id, &stale).await?;
        }

        live.sort_by_key(|record| record.created_at);
        Ok(live)
    }

    /// Destroy every session of `subject_id`. Returns how many were destroyed.
    ///
    /// # Errors
    /// `Cleanup` if any destroy failed, or the listing error.
    #[instrument(skip(self))]
    pub async fn destroy_all(&self, subject_id: &str) -> Result<usize> {
        let sessions = self.list_sessions(subject_id).await?;
        let mut failures = Vec::new();
        let mut destroyed = 0;
        for record in &sessions {
            match self.destroy(record).await {
                Ok(()) => destroyed += 1,
                Err(err) => failures.push(err),
            }
        }
        if failures.is_empty() {
            Ok(destroyed)
        } else {
            Err(SessionError::Cleanup(failures))
        }
    }

    /// Destroy every expired record on disk. Returns how many were reaped.
    ///
    /// # Errors
    /// `Storage` when the record tree cannot be walked.
    #[instrument(skip(self))]
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut reaped = 0;
        for token in self.store.tokens().await? {
            let guard = self.locks.lock(LockKind::Token, &token).await;
            let record = match self.store.load(&token).await {
                Ok(record) if record.is_expired_at(now) => record,
                Ok(_) | Err(SessionError::NotAuthenticated) => continue,
                Err(err @ SessionError::Corrupt { .. }) => {
                    warn!("dropping undecodable session record: {err}");
                    if let Err(cleanup) = self.store.delete(&token).await {
                        warn!("failed to delete corrupt session record: {cleanup}");
                    }
                    continue;
                }
                Err(err) => {
                    warn!("skipping unreadable session record: {err}");
                    continue;
                }
            };
            let deleted = self.store.delete(&token).await;
            drop(guard);
            self.finish_destroy(&record, deleted).await;
            reaped += 1;
        }
        if reaped > 0 {
            info!(reaped, "expired sessions swept");
        }
        Ok(reaped)
    }

    /// Re-register a live token missing from its subject's index.
    ///
    /// A destroy may finish between the caller's save and the re-registration;
    /// the record is checked again under the token lock and the entry dropped
    /// if it is gone.
    async fn repair_index(&self, record: &SessionRecord) {
        match self
            .index
            .ensure_token(&record.subject_id, &record.token, record.created_at)
            .await
        {
            Ok(true) => {}
            Ok(false) => return,
            Err(err) => {
                warn!("failed to verify session index: {err}");
                return;
            }
        }

        let gone = {
            let _guard = self.locks.lock(LockKind::Token, &record.token).await;
            matches!(
                self.store.load(&record.token).await,
                Err(SessionError::NotAuthenticated | SessionError::Corrupt { .. })
            )
        };
        if gone {
            debug!("session destroyed during index repair");
            if let Err(err) = self
                .index
                .remove_token(&record.subject_id, &record.token)
                .await
            {
                error!(token = record.token_hint(), "failed to remove session from index: {err}");
            }
        } else {
            info!(subject_id = %record.subject_id, "re-registered session missing from index");
        }
    }

    /// Second half of a destroy whose record delete already ran under the token lock.
    async fn finish_destroy(&self, record: &SessionRecord, deleted: Result<()>) {
        if let Err(err) = deleted {
            error!(token = record.token_hint(), "failed to delete session record: {err}");
        }
        if let Err(err) = self
            .index
            .remove_token(&record.subject_id, &record.token)
            .await
        {
            error!(token = record.token_hint(), "failed to remove session from index: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::record::tests::TestUser;
    use crate::session::shard;
    use anyhow::Result;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> SessionManager {
        SessionManager::new(SessionConfig::new(dir.path()).with_lifetime_seconds(3600))
    }

    fn user(id: &str) -> TestUser {
        TestUser { id: id.to_string() }
    }

    fn origin() -> RequestMeta {
        RequestMeta::new("1.2.3.4", "ua-A", "es", "fp-1")
    }

    async fn expire(manager: &SessionManager, record: &SessionRecord) -> Result<()> {
        let mut expired = record.clone();
        expired.created_at = Utc::now() - Duration::hours(2);
        expired.expires_at = Utc::now() - Duration::seconds(1);
        manager.store().save(&expired).await?;
        Ok(())
    }

    #[tokio::test]
    async fn create_persists_record_and_index() -> Result<()> {
        let dir = TempDir::new()?;
        let manager = manager(&dir);
        let record = manager.create(&user("U"), &origin()).await?;

        assert!(!record.is_expired());
        assert_eq!(manager.store().load(&record.token).await?, record);
        let tokens = manager.index().list_tokens("U").await?;
        assert_eq!(tokens.get(&record.token), Some(&record.created_at));
        assert!(dir.path().join("records").is_dir());
        assert!(dir.path().join("index").is_dir());
        Ok(())
    }

    #[tokio::test]
    async fn trust_scenario_from_login_to_rejection() -> Result<()> {
        let dir = TempDir::new()?;
        let manager = manager(&dir);
        let created = manager.create(&user("U"), &origin()).await?;

        let first = manager.load(&created.token, &origin()).await?;
        assert!(first.expires_at >= created.expires_at);
        assert!(first.updated_at >= created.updated_at);

        // Roaming IP: UA + fingerprint + locale = 5, accepted.
        let roamed = RequestMeta::new("9.9.9.9", "ua-A", "es", "fp-1");
        let second = manager.load(&created.token, &roamed).await?;
        assert!(second.expires_at >= first.expires_at);

        // New IP and new UA: fingerprint + locale = 3, rejected and destroyed.
        let hijack = RequestMeta::new("9.9.9.9", "ua-B", "es", "fp-1");
        let err = manager
            .load(&created.token, &hijack)
            .await
            .expect_err("untrusted");
        assert!(matches!(err, SessionError::Untrusted { score: 3 }));

        let after = manager.load(&created.token, &origin()).await;
        assert!(matches!(after, Err(SessionError::NotAuthenticated)));
        assert!(manager.index().list_tokens("U").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn expired_session_is_destroyed_on_load() -> Result<()> {
        let dir = TempDir::new()?;
        let manager = manager(&dir);
        let record = manager.create(&user("U"), &origin()).await?;
        expire(&manager, &record).await?;

        let err = manager
            .load(&record.token, &origin())
            .await
            .expect_err("expired");
        assert!(matches!(err, SessionError::Expired));
        assert!(err.is_unauthorized());
        assert!(manager.store().path_for(&record.token).is_some_and(|p| !p.exists()));
        assert!(manager.index().list_tokens("U").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn destroy_twice_is_a_noop() -> Result<()> {
        let dir = TempDir::new()?;
        let manager = manager(&dir);
        let keep = manager.create(&user("U"), &origin()).await?;
        let record = manager.create(&user("U"), &origin()).await?;

        manager.destroy(&record).await?;
        manager.destroy(&record).await?;

        assert!(matches!(
            manager.store().load(&record.token).await,
            Err(SessionError::NotAuthenticated)
        ));
        let tokens = manager.index().list_tokens("U").await?;
        assert_eq!(tokens.len(), 1);
        assert!(tokens.contains_key(&keep.token));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_extends_but_never_resurrects() -> Result<()> {
        let dir = TempDir::new()?;
        let manager = manager(&dir);
        let mut record = manager.create(&user("U"), &origin()).await?;
        let before = record.expires_at;

        manager.refresh(&mut record).await?;
        assert!(record.expires_at >= before);
        assert_eq!(manager.store().load(&record.token).await?, record);

        manager.destroy(&record).await?;
        let err = manager.refresh(&mut record).await.expect_err("destroyed");
        assert!(matches!(err, SessionError::NotAuthenticated));
        assert!(manager.store().path_for(&record.token).is_some_and(|p| !p.exists()));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_does_not_extend_expired_session() -> Result<()> {
        let dir = TempDir::new()?;
        let manager = manager(&dir);
        let mut record = manager.create(&user("U"), &origin()).await?;
        expire(&manager, &record).await?;

        let err = manager.refresh(&mut record).await.expect_err("expired");
        assert!(matches!(err, SessionError::Expired));
        assert!(matches!(
            manager.store().load(&record.token).await,
            Err(SessionError::NotAuthenticated)
        ));
        assert!(!manager
            .index()
            .list_tokens("U")
            .await?
            .contains_key(&record.token));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_creates_for_one_subject_are_all_indexed() -> Result<()> {
        let dir = TempDir::new()?;
        let manager = Arc::new(manager(&dir));
        let mut tasks = Vec::new();
        for _ in 0..24 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move {
                manager.create(&user("U"), &origin()).await
            }));
        }
        let mut created = HashSet::new();
        for task in tasks {
            created.insert(task.await??.token);
        }

        let indexed: HashSet<String> = manager
            .index()
            .list_tokens("U")
            .await?
            .into_keys()
            .collect();
        assert_eq!(created.len(), 24);
        assert_eq!(indexed, created);
        Ok(())
    }

    #[tokio::test]
    async fn load_repairs_missing_index_entry() -> Result<()> {
        let dir = TempDir::new()?;
        let manager = manager(&dir);
        let record = manager.create(&user("U"), &origin()).await?;
        manager.index().remove_token("U", &record.token).await?;

        manager.load(&record.token, &origin()).await?;
        let tokens = manager.index().list_tokens("U").await?;
        assert!(tokens.contains_key(&record.token));
        Ok(())
    }

    #[tokio::test]
    async fn index_repair_does_not_revive_destroyed_session() -> Result<()> {
        let dir = TempDir::new()?;
        let manager = manager(&dir);
        let record = manager.create(&user("U"), &origin()).await?;
        let other = manager.create(&user("U"), &origin()).await?;

        // A load saved `record`, then a destroy ran both deletions before the
        // load got to repair the index.
        let loaded = manager.load(&record.token, &origin()).await?;
        manager.destroy(&record).await?;
        manager.repair_index(&loaded).await;

        let tokens = manager.index().list_tokens("U").await?;
        assert!(!tokens.contains_key(&record.token));
        assert!(tokens.contains_key(&other.token));
        Ok(())
    }

    #[tokio::test]
    async fn sweep_continues_past_corrupt_records() -> Result<()> {
        let dir = TempDir::new()?;
        let manager = manager(&dir);
        let corrupt = token::new_session_token()?;
        let corrupt_path = manager.store().path_for(&corrupt).expect("well-formed token");
        shard::write_atomic(&corrupt_path, b"garbage").await?;
        let record = manager.create(&user("U"), &origin()).await?;
        expire(&manager, &record).await?;

        assert_eq!(manager.sweep_expired().await?, 1);
        assert!(!corrupt_path.exists());
        assert!(matches!(
            manager.store().load(&record.token).await,
            Err(SessionError::NotAuthenticated)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_record_is_unauthorized_and_removed() -> Result<()> {
        let dir = TempDir::new()?;
        let manager = manager(&dir);
        let token = token::new_session_token()?;
        let path = manager.store().path_for(&token).expect("well-formed token");
        shard::write_atomic(&path, b"garbage").await?;

        let err = manager.load(&token, &origin()).await.expect_err("corrupt");
        assert!(matches!(err, SessionError::Corrupt { .. }));
        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn list_sessions_prunes_stale_and_expired_entries() -> Result<()> {
        let dir = TempDir::new()?;
        let manager = manager(&dir);
        let live = manager.create(&user("U"), &origin()).await?;
        let expired = manager.create(&user("U"), &origin()).await?;
        expire(&manager, &expired).await?;
        manager
            .index()
            .add_token("U", &token::new_session_token()?, Utc::now())
            .await?;

        let sessions = manager.list_sessions("U").await?;
        assert_eq!(sessions, vec![live.clone()]);

        let tokens = manager.index().list_tokens("U").await?;
        assert_eq!(tokens.keys().collect::<Vec<_>>(), vec![&live.token]);
        Ok(())
    }

    #[tokio::test]
    async fn destroy_all_revokes_every_session() -> Result<()> {
        let dir = TempDir::new()?;
        let manager = manager(&dir);
        let a = manager.create(&user("U"), &origin()).await?;
        let b = manager.create(&user("U"), &origin()).await?;
        let other = manager.create(&user("V"), &origin()).await?;

        assert_eq!(manager.destroy_all("U").await?, 2);
        for token in [&a.token, &b.token] {
            assert!(matches!(
                manager.load(token, &origin()).await,
                Err(SessionError::NotAuthenticated)
            ));
        }
        assert!(manager.load(&other.token, &origin()).await.is_ok());
        assert!(!manager.index().path_for("U").exists());
        Ok(())
    }

    #[tokio::test]
    async fn sweep_reaps_only_expired_records() -> Result<()> {
        let dir = TempDir::new()?;
        let manager = manager(&dir);
        let live = manager.create(&user("U"), &origin()).await?;
        let dead = manager.create(&user("V"), &origin()).await?;
        expire(&manager, &dead).await?;

        assert_eq!(manager.sweep_expired().await?, 1);
        assert!(manager.store().load(&live.token).await.is_ok());
        assert!(matches!(
            manager.store().load(&dead.token).await,
            Err(SessionError::NotAuthenticated)
        ));
        assert!(manager.index().list_tokens("V").await?.is_empty());
        assert_eq!(manager.sweep_expired().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_token_is_not_authenticated() -> Result<()> {
        let dir = TempDir::new()?;
        let manager = manager(&dir);
        for token in ["", "short", "../../../../etc/passwd"] {
            assert!(matches!(
                manager.load(token, &origin()).await,
                Err(SessionError::NotAuthenticated)
            ));
        }
        Ok(())
    }
}
