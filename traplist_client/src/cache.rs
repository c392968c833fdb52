//! Expiring key/value cache with an injectable clock.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::models::{ItemView, SearchFilter};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock; only moves when advanced.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|guard| *guard).unwrap_or_else(|_| Utc::now())
    }
}

struct Entry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

pub struct TtlCache<V> {
    entries: HashMap<String, Entry<V>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            clock,
        }
    }

    /// Live value for `key`. Expired entries read as misses.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let expires_at = self.clock.now() + self.ttl;
        self.entries
            .insert(key.into(), Entry { value, expires_at });
    }

    pub fn invalidate(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drops expired entries, returning how many went.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Search results keyed by the serialized filter payload.
pub struct SearchCache {
    inner: TtlCache<Vec<ItemView>>,
}

impl SearchCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: TtlCache::new(ttl),
        }
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: TtlCache::with_clock(ttl, clock),
        }
    }

    pub fn key_for(filter: &SearchFilter) -> String {
        serde_json::to_string(filter).unwrap_or_default()
    }

    pub fn get(&self, filter: &SearchFilter) -> Option<Vec<ItemView>> {
        self.inner.get(&Self::key_for(filter))
    }

    pub fn get_by_key(&self, key: &str) -> Option<Vec<ItemView>> {
        self.inner.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, items: Vec<ItemView>) {
        self.inner.insert(key, items);
    }

    /// Drops everything, e.g. after a rating changed an item's tier.
    pub fn invalidate_all(&mut self) {
        self.inner.clear();
    }

    pub fn purge_expired(&mut self) -> usize {
        self.inner.purge_expired()
    }
}
