//! # sessiond
//!
//! Server-side login sessions kept on the local filesystem.
//!
//! ## Sessions
//!
//! A session is addressed by an opaque 64-character hex token. Each token has
//! one record on disk holding the subject, a snapshot of its roles and
//! permissions, the request fingerprint captured at login and a sliding
//! expiry. A second tree indexes the tokens of every subject so all of its
//! sessions can be listed or revoked at once.
//!
//! ## Trust
//!
//! Every load compares the current request with the one that opened the
//! session (client IP, user agent, device fingerprint, accepted language).
//! Below the trust threshold the session is destroyed and the caller must log
//! in again. Unknown, expired and untrusted tokens are indistinguishable to
//! the client.
//!
//! ## Service
//!
//! The `sessiond` binary exposes login, logout and session inspection over
//! HTTP using [`session::SessionManager`].

pub mod cli;
pub mod session;
pub mod sessiond;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
