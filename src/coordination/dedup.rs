//! # Deduplication Cache
//!
//! Time-windowed store of the most recent successful result per signature.
//! Reads honour a per-call window; entries are evicted lazily once older than
//! `max_age`, or in bulk by [`DedupCache::sweep`]. Failures are never stored.

use crate::signature::RequestSignature;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    stored_at: Instant,
}

#[derive(Debug)]
pub struct DedupCache<T> {
    entries: DashMap<RequestSignature, CacheEntry<T>>,
    max_age: Duration,
}

impl<T: Clone> DedupCache<T> {
    pub fn new(max_age: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_age,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Cached value for `signature` if it was stored less than `window` before `now`
    pub fn get(&self, signature: &RequestSignature, window: Duration, now: Instant) -> Option<T> {
        let expired = {
            let entry = self.entries.get(signature)?;
            let age = now.saturating_duration_since(entry.stored_at);
            if age < window {
                return Some(entry.value.clone());
            }
            age >= self.max_age
        };

        // The shard guard above must be released before removing
        if expired {
            self.entries.remove_if(signature, |_, entry| {
                now.saturating_duration_since(entry.stored_at) >= self.max_age
            });
        }

        None
    }

    /// Store a successful result, overwriting any previous entry
    pub fn put(&self, signature: RequestSignature, value: T) {
        self.put_at(signature, value, Instant::now());
    }

    pub fn put_at(&self, signature: RequestSignature, value: T, stored_at: Instant) {
        self.entries.insert(signature, CacheEntry { value, stored_at });
    }

    /// Remove every entry whose age has reached `max_age`; returns how many were removed
    pub fn sweep(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = now.saturating_duration_since(entry.stored_at) < self.max_age;
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "🧹 Swept dedup cache");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
