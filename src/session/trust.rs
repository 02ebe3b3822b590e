//! Per-request hijack heuristic.
//!
//! Each field that still matches what was captured at login adds its weight:
//!
//! | field              | weight |
//! |--------------------|--------|
//! | client IP          | 2      |
//! | User-Agent         | 2      |
//! | device fingerprint | 2      |
//! | Accept-Language    | 1      |
//!
//! With the default threshold of 5, two of IP/UA/fingerprint pass only
//! together with the locale; all three pass on their own. Two strong fields
//! alone score 4 and are rejected.

use super::record::{RequestMeta, SessionRecord};

pub const IP_WEIGHT: u8 = 2;
pub const USER_AGENT_WEIGHT: u8 = 2;
pub const FINGERPRINT_WEIGHT: u8 = 2;
pub const LANGUAGE_WEIGHT: u8 = 1;
pub const MAX_SCORE: u8 = IP_WEIGHT + USER_AGENT_WEIGHT + FINGERPRINT_WEIGHT + LANGUAGE_WEIGHT;
pub const DEFAULT_THRESHOLD: u8 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrustScorer {
    threshold: u8,
}

impl Default for TrustScorer {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl TrustScorer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold.min(MAX_SCORE);
        self
    }

    #[must_use]
    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Score `meta` against the fields captured in `record`.
    #[must_use]
    pub fn evaluate(&self, record: &SessionRecord, meta: &RequestMeta) -> u8 {
        let mut score = 0;
        if record.client_ip == meta.client_ip {
            score += IP_WEIGHT;
        }
        if record.user_agent == meta.user_agent {
            score += USER_AGENT_WEIGHT;
        }
        if record.device_fingerprint == meta.fingerprint {
            score += FINGERPRINT_WEIGHT;
        }
        if record.accept_language == meta.accept_language {
            score += LANGUAGE_WEIGHT;
        }
        score
    }

    /// Inclusive threshold check.
    #[must_use]
    pub fn accepts(&self, score: u8) -> bool {
        score >= self.threshold
    }
}
