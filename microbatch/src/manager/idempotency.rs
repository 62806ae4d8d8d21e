//! Duplicate-submission detection.
//!
//! A submission is identified by a fingerprint: the caller's explicit idempotency key
//! if one was given, otherwise a hash of its ids (order-insensitive) and priority.
//! The index remembers which request each fingerprint produced for `window`; a repeat
//! inside the window resolves to that request instead of creating a new one.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::types::{ItemId, Priority, RequestId};

/// Content fingerprint of a submission.
///
/// SHA-256 of the canonical JSON `{"ids": <sorted ids>, "priority": <priority>}`,
/// truncated to 16 hex characters.
pub fn fingerprint(ids: &[ItemId], priority: Priority) -> String {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();

    // serde_json orders object keys alphabetically
    let canonical = json!({ "ids": sorted, "priority": priority }).to_string();
    let digest = Sha256::digest(canonical.as_bytes());

    let mut hex = String::with_capacity(16);
    for byte in &digest[..8] {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// Fingerprint for a caller-supplied idempotency key. Namespaced so it can never
/// collide with a content fingerprint.
pub fn explicit_key(key: &str) -> String {
    format!("key:{key}")
}

/// Fingerprint to request mapping with expiry.
#[derive(Debug)]
pub struct IdempotencyIndex {
    window: Duration,
    entries: HashMap<String, (RequestId, Instant)>,
}

impl IdempotencyIndex {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    /// The request recorded for `fingerprint`, if it is still inside the window.
    ///
    /// Expired entries are pruned as a side effect.
    pub fn lookup(&mut self, fingerprint: &str) -> Option<RequestId> {
        let now = Instant::now();
        let window = self.window;
        self.entries
            .retain(|_, (_, recorded_at)| now.duration_since(*recorded_at) < window);
        self.entries.get(fingerprint).map(|(id, _)| *id)
    }

    pub fn record(&mut self, fingerprint: String, request_id: RequestId) {
        self.entries.insert(fingerprint, (request_id, Instant::now()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
