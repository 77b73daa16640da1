//! Consent gate — one-shot, TTL-bounded permits for high-risk topics.
//!
//! A process-local map from normalized topic to absolute expiry. Consuming a
//! live token also deletes it, so re-use of the same high-risk topic requires
//! a fresh grant.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default time-to-live for a granted token: 5 minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

pub struct ConsentGate {
    ttl: Duration,
    entries: Mutex<HashMap<String, Instant>>,
}

impl ConsentGate {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Grant consent for a topic, replacing any existing token.
    pub fn grant(&self, topic: &str) {
        let expiry = Instant::now() + self.ttl;
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(normalize_topic(topic), expiry);
        }
    }

    /// Erase any pending token for a topic.
    pub fn deny(&self, topic: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&normalize_topic(topic));
        }
    }

    /// Atomically remove the topic's token and report whether it was live.
    /// Returns `true` at most once per grant.
    pub fn consume(&self, topic: &str) -> bool {
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        match entries.remove(&normalize_topic(topic)) {
            Some(expiry) => Instant::now() < expiry,
            None => false,
        }
    }

    /// Number of tokens currently held (live or expired-but-unswept).
    pub fn pending(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

impl Default for ConsentGate {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

/// Case-folded, trimmed topic key.
fn normalize_topic(topic: &str) -> String {
    topic.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_is_single_use() {
        let gate = ConsentGate::default();
        gate.grant("my finances");
        assert!(gate.consume("my finances"));
        assert!(!gate.consume("my finances"));
    }

    #[test]
    fn topics_are_normalized() {
        let gate = ConsentGate::default();
        gate.grant("  My Finances ");
        assert!(gate.consume("my finances"));
    }

    #[test]
    fn deny_erases_a_pending_grant() {
        let gate = ConsentGate::default();
        gate.grant("salary");
        gate.deny("salary");
        assert!(!gate.consume("salary"));
    }

    #[test]
    fn expired_tokens_do_not_consume() {
        let gate = ConsentGate::new(Duration::ZERO);
        gate.grant("salary");
        std::thread::sleep(Duration::from_millis(5));
        assert!(!gate.consume("salary"));
        // The expired entry was still removed.
        assert_eq!(gate.pending(), 0);
    }

    #[test]
    fn consume_without_grant_is_false() {
        let gate = ConsentGate::default();
        assert!(!gate.consume("anything"));
    }

    #[test]
    fn regrant_refreshes_the_token() {
        let gate = ConsentGate::default();
        gate.grant("topic");
        gate.grant("topic");
        assert_eq!(gate.pending(), 1);
        assert!(gate.consume("topic"));
    }
}
