//! Thread-safe evaluation cache keyed by canonical position key.
//!
//! The cache is shared between the tree builder and the coordinator through an
//! `Arc`. Every operation takes one short mutex; no lock is held across calls.
//!
//! Re-inserting an existing key overwrites it: the newer score wins. If the
//! two scores differ the event is logged as cache corruption and the search
//! carries on.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::config::CachePolicy;
use crate::error::SearchError;
use crate::ordering::PositionKey;

/// Scores closer than this are treated as the same score.
const SCORE_TOLERANCE: f32 = 1e-6;

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub corruptions: u64,
}

#[derive(Debug)]
struct CacheEntry {
    value: f32,
    last_used: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<PositionKey, CacheEntry>,
    /// Access tick -> key, oldest first. Only maintained for LRU caches.
    recency: BTreeMap<u64, PositionKey>,
    tick: u64,
}

impl CacheInner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// Mapping from position key to evaluator score.
#[derive(Debug)]
pub struct EvalCache {
    policy: CachePolicy,
    inner: Mutex<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    corruptions: AtomicU64,
}

impl Default for EvalCache {
    fn default() -> Self {
        Self::new(CachePolicy::Unbounded)
    }
}

impl EvalCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(CacheInner::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            corruptions: AtomicU64::new(0),
        }
    }

    /// Unbounded cache.
    pub fn unbounded() -> Self {
        Self::new(CachePolicy::Unbounded)
    }

    /// Cache that evicts the least recently used entry past `capacity`.
    pub fn lru(capacity: usize) -> Self {
        Self::new(CachePolicy::Lru {
            capacity: capacity.max(1),
        })
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Look up a score. A hit refreshes the entry's recency.
    pub fn lookup(&self, key: &PositionKey) -> Option<f32> {
        let mut inner = self.inner.lock();
        let tick = inner.next_tick();
        let Some(entry) = inner.entries.get_mut(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let value = entry.value;
        let previous_tick = std::mem::replace(&mut entry.last_used, tick);
        if matches!(self.policy, CachePolicy::Lru { .. }) {
            inner.recency.remove(&previous_tick);
            inner.recency.insert(tick, key.clone());
        }
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    /// Check presence without touching recency or counters.
    pub fn contains(&self, key: &PositionKey) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Store a score. An existing entry is overwritten.
    pub fn insert(&self, key: PositionKey, value: f32) {
        let mut inner = self.inner.lock();
        let tick = inner.next_tick();
        let lru = matches!(self.policy, CachePolicy::Lru { .. });

        if let Some(entry) = inner.entries.get_mut(&key) {
            if (entry.value - value).abs() > SCORE_TOLERANCE {
                self.corruptions.fetch_add(1, Ordering::Relaxed);
                let event = SearchError::CacheCorruption {
                    key: key.to_string(),
                    previous: entry.value,
                    current: value,
                };
                warn!("{}", event);
            }
            entry.value = value;
            let previous_tick = std::mem::replace(&mut entry.last_used, tick);
            if lru {
                inner.recency.remove(&previous_tick);
                inner.recency.insert(tick, key);
            }
            return;
        }

        if let CachePolicy::Lru { capacity } = self.policy {
            while inner.entries.len() >= capacity {
                let Some((_, oldest)) = inner.recency.pop_first() else {
                    break;
                };
                inner.entries.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
            inner.recency.insert(tick, key.clone());
        }
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                last_used: tick,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.recency.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            corruptions: self.corruptions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod cache_tests;
