//! Per-key mutual exclusion for tokens and subjects.
//!
//! Handles are created lazily and never evicted, so memory grows with the
//! number of distinct keys ever seen.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// The two independent key spaces. No operation holds both at once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LockKind {
    Token,
    Subject,
}

impl LockKind {
    const fn prefix(self) -> &'static str {
        match self {
            Self::Token => "token:",
            Self::Subject => "subject:",
        }
    }
}

#[derive(Debug, Default)]
pub struct LockRegistry {
    handles: DashMap<String, Arc<Mutex<()>>>,
}

impl LockRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the handle for `key`, creating it on first use.
    #[must_use]
    pub fn handle(&self, kind: LockKind, key: &str) -> Arc<Mutex<()>> {
        let name = format!("{}{key}", kind.prefix());
        self.handles
            .entry(name)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the lock for `key`, waiting if another task holds it.
    pub async fn lock(&self, kind: LockKind, key: &str) -> OwnedMutexGuard<()> {
        self.handle(kind, key).lock_owned().await
    }

    /// Number of handles ever created.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn same_key_shares_a_handle() {
        let registry = LockRegistry::new();
        let a = registry.handle(LockKind::Token, "abc");
        let b = registry.handle(LockKind::Token, "abc");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn key_spaces_are_independent() {
        let registry = LockRegistry::new();
        let token = registry.handle(LockKind::Token, "same");
        let subject = registry.handle(LockKind::Subject, "same");
        assert!(!Arc::ptr_eq(&token, &subject));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn lock_serializes_holders() {
        let registry = Arc::new(LockRegistry::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = registry.lock(LockKind::Subject, "user-1").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
