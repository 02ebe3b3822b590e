//! Server-side login sessions.
//!
//! Flow Overview: login mints a token and a [`SessionRecord`], which is saved
//! to the [`SessionStore`] and registered in the [`UserSessionIndex`] at the
//! same time. Every later request goes through [`SessionManager::load`]: the
//! record is read, checked for expiry, scored by the [`TrustScorer`] against
//! the request metadata, and refreshed. Expired or untrusted sessions are
//! destroyed on the spot.
//!
//! Storage is two parallel sharded file trees under one base directory
//! (`records/` keyed by token, `index/` keyed by subject). There is no
//! background worker unless the caller runs [`SessionManager::sweep_expired`].

pub mod error;
pub mod index;
pub mod lock;
pub mod manager;
pub mod record;
pub mod shard;
pub mod store;
pub mod token;
pub mod trust;

pub use error::SessionError;
pub use index::UserSessionIndex;
pub use lock::{LockKind, LockRegistry};
pub use manager::{SessionConfig, SessionManager};
pub use record::{Principal, RequestMeta, SessionRecord};
pub use store::SessionStore;
pub use token::{new_session_token, new_verification_code};
pub use trust::TrustScorer;
