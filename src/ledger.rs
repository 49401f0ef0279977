//! Session ledger: per-item processed flags and last-success timestamps.
//!
//! Keys are `processed:<item>` and `rateLimit:<item>`. The backing store lives
//! for one session and is never persisted.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

const PROCESSED_PREFIX: &str = "processed:";
const RATE_LIMIT_PREFIX: &str = "rateLimit:";

/// Session-scoped string key-value store.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn delete(&self, key: &str);
    /// Keys starting with `prefix`, sorted.
    fn list_keys(&self, prefix: &str) -> Vec<String>;
}

/// In-process store; the session ends when it is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries().insert(key.to_string(), value.to_string());
    }

    fn delete(&self, key: &str) {
        self.entries().remove(key);
    }

    fn list_keys(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

/// Source of wall-clock time for cooldown bookkeeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for dry runs and tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Idempotency guard and per-item rate limiter over a [`KvStore`].
pub struct Ledger {
    store: Arc<dyn KvStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Ledger over a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    // =========================================================================
    // Idempotency
    // =========================================================================

    pub fn is_processed(&self, item_id: &str) -> bool {
        self.store.get(&processed_key(item_id)).as_deref() == Some("true")
    }

    pub fn mark_processed(&self, item_id: &str) {
        self.store.set(&processed_key(item_id), "true");
    }

    /// Roll back a processed flag. Absent flags are left absent.
    pub fn unmark_processed(&self, item_id: &str) {
        self.store.delete(&processed_key(item_id));
    }

    // =========================================================================
    // Rate limiting
    // =========================================================================

    /// Time of the last successful action on `item_id`.
    pub fn last_execution(&self, item_id: &str) -> Option<DateTime<Utc>> {
        let raw = self.store.get(&rate_limit_key(item_id))?;
        let millis = raw.parse::<i64>().ok()?;
        DateTime::from_timestamp_millis(millis)
    }

    pub fn record_execution(&self, item_id: &str, at: DateTime<Utc>) {
        self.store
            .set(&rate_limit_key(item_id), &at.timestamp_millis().to_string());
    }

    /// Time left before `item_id` may run again, or `None` when the window
    /// has elapsed (or nothing was recorded).
    pub fn cooldown_remaining(
        &self,
        item_id: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Option<Duration> {
        let last = self.last_execution(item_id)?;
        let elapsed = now - last;
        if elapsed >= window {
            None
        } else {
            Some(window - elapsed)
        }
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Remove the processed flag for one item. Returns 1 if a flag existed.
    pub fn clear_processed(&self, item_id: &str) -> usize {
        self.clear_key(&processed_key(item_id))
    }

    pub fn clear_all_processed(&self) -> usize {
        self.clear_prefix(PROCESSED_PREFIX)
    }

    pub fn clear_rate_limit(&self, item_id: &str) -> usize {
        self.clear_key(&rate_limit_key(item_id))
    }

    pub fn clear_all_rate_limits(&self) -> usize {
        self.clear_prefix(RATE_LIMIT_PREFIX)
    }

    /// Number of processed flags and rate-limit stamps currently held.
    pub fn counts(&self) -> (usize, usize) {
        (
            self.store.list_keys(PROCESSED_PREFIX).len(),
            self.store.list_keys(RATE_LIMIT_PREFIX).len(),
        )
    }

    fn clear_key(&self, key: &str) -> usize {
        if self.store.get(key).is_some() {
            self.store.delete(key);
            1
        } else {
            0
        }
    }

    fn clear_prefix(&self, prefix: &str) -> usize {
        let keys = self.store.list_keys(prefix);
        for key in &keys {
            self.store.delete(key);
        }
        debug!("cleared {} '{}' entries", keys.len(), prefix);
        keys.len()
    }
}

fn processed_key(item_id: &str) -> String {
    format!("{}{}", PROCESSED_PREFIX, item_id)
}

fn rate_limit_key(item_id: &str) -> String {
    format!("{}{}", RATE_LIMIT_PREFIX, item_id)
}
