//! Duplicate suppression over a sliding time window
//!
//! Records are identified by a digest of their level and message. The first
//! occurrence is let through and starts the suppression window; repeats inside
//! the window are dropped without extending it, so a flood of identical
//! records collapses to one delivery per window.

use super::log_level::LogLevel;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// 128-bit content key
type Fingerprint = [u8; 16];

#[derive(Debug)]
pub struct Deduplicator {
    window: Duration,
    seen: Mutex<HashMap<Fingerprint, Instant>>,
}

impl Deduplicator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check-and-record in one critical section
    ///
    /// Returns `true` when the same (level, message) pair was first seen less
    /// than one window ago; the caller should suppress it.
    pub fn is_duplicate(&self, message: &str, level: LogLevel) -> bool {
        let key = fingerprint(message, level);
        let now = Instant::now();

        let mut seen = self.seen.lock();
        seen.retain(|_, first_seen| now.saturating_duration_since(*first_seen) < self.window);

        if seen.contains_key(&key) {
            return true;
        }
        seen.insert(key, now);
        false
    }

    /// Number of fingerprints currently tracked, expired ones included
    pub fn tracked(&self) -> usize {
        self.seen.lock().len()
    }
}

fn fingerprint(message: &str, level: LogLevel) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(level.to_str().as_bytes());
    hasher.update(b":");
    hasher.update(message.as_bytes());
    let digest = hasher.finalize();

    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[..16]);
    key
}
