//! Idempotency markers for single-event ingestion
//!
//! Markers are best-effort and expire after a TTL. They only short-circuit
//! the HTTP path; the database unique index on `event_id` is what actually
//! guarantees no duplicate rows when a marker has already expired.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// In-memory TTL marker store keyed by event id.
#[derive(Clone)]
pub struct IdempotencyStore {
    ttl: Duration,
    entries: Arc<Mutex<HashMap<String, Instant>>>,
}

impl IdempotencyStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn key(event_id: &str) -> String {
        format!("idempotency:webhook:{}", event_id)
    }

    /// Record an event id as seen. Returns `false` if a live marker for the
    /// id already existed.
    pub async fn mark_processed(&self, event_id: &str) -> bool {
        let key = Self::key(event_id);
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        if let Some(expires_at) = entries.get(&key) {
            if *expires_at > now {
                debug!(event_id, "idempotency marker hit, skipping");
                return false;
            }
        }

        entries.insert(key, now + self.ttl);
        true
    }

    /// Whether a live marker exists for the event id.
    pub async fn is_processed(&self, event_id: &str) -> bool {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries
            .get(&Self::key(event_id))
            .map(|expires_at| *expires_at > now)
            .unwrap_or(false)
    }

    /// Remove expired markers. Called periodically so the map does not grow
    /// without bound between restarts.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        before - entries.len()
    }
}
