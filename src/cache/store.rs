//! Size-bounded LRU response store.
//!
//! # Responsibilities
//! - Map raw request bytes to complete origin responses
//! - Refresh recency on every hit
//! - Keep the accounted total within the byte budget by evicting the
//!   least recently used entry
//! - Silently refuse entries over the per-entry limit

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cache::entry::{accounting_size, CacheEntry, CachedResponse};
use crate::config::CacheConfig;
use crate::observability::metrics;

/// Result of an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The entry was linked into the cache.
    Stored {
        /// Entries evicted to make room.
        evicted: usize,
        /// An entry with the same key was replaced.
        replaced: bool,
    },
    /// The entry's accounting size is over the per-entry limit; nothing changed.
    TooLarge { size: usize },
}

/// Point-in-time view of cache occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: usize,
}

/// Everything guarded by the cache mutex.
#[derive(Debug, Default)]
struct CacheState {
    entries: Vec<CacheEntry>,
    total_bytes: usize,
    clock: u64,
}

impl CacheState {
    /// Advance the logical clock. Every access gets a strictly larger tick.
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn position(&self, key: &[u8]) -> Option<usize> {
        self.entries.iter().position(|e| *e.url == *key)
    }

    fn unlink(&mut self, index: usize) -> CacheEntry {
        let entry = self.entries.swap_remove(index);
        self.total_bytes -= entry.accounting_size();
        entry
    }

    /// Unlink the entry with the smallest last-access tick.
    fn evict_one(&mut self) -> Option<CacheEntry> {
        let victim = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.last_access)
            .map(|(i, _)| i)?;
        Some(self.unlink(victim))
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            total_bytes: self.total_bytes,
        }
    }
}

/// Process-wide response cache.
///
/// Lookup, insert and eviction all run under one exclusive lock.
#[derive(Debug)]
pub struct ResponseCache {
    state: Mutex<CacheState>,
    max_total_bytes: usize,
    max_element_bytes: usize,
}

impl ResponseCache {
    /// Create an empty cache with the given byte limits.
    pub fn new(max_total_bytes: usize, max_element_bytes: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            max_total_bytes,
            max_element_bytes,
        }
    }

    /// Create an empty cache from configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_total_bytes, config.max_element_bytes)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // Mutations never panic halfway, so a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Per-entry accounting limit.
    pub fn max_element_bytes(&self) -> usize {
        self.max_element_bytes
    }

    /// Find the response stored under exactly `key`, refreshing its recency.
    pub fn lookup(&self, key: &[u8]) -> Option<CachedResponse> {
        let hit = {
            let mut state = self.lock();
            match state.position(key) {
                Some(index) => {
                    let now = state.tick();
                    let entry = &mut state.entries[index];
                    entry.last_access = now;
                    Some(CachedResponse::new(Arc::clone(&entry.data)))
                }
                None => None,
            }
        };

        metrics::record_cache_lookup(hit.is_some());
        hit
    }

    /// Store `data` under `key`, evicting least recently used entries as needed.
    ///
    /// Entries whose accounting size exceeds the per-entry limit are dropped
    /// without touching the cache.
    pub fn insert(&self, key: &[u8], data: &[u8]) -> InsertOutcome {
        let size = accounting_size(key.len(), data.len());
        if size > self.max_element_bytes || size > self.max_total_bytes {
            tracing::debug!(size, limit = self.max_element_bytes, "Response too large to cache");
            return InsertOutcome::TooLarge { size };
        }

        // Built completely before it becomes visible to other workers.
        let mut entry = CacheEntry::new(key, data, 0);

        let (outcome, stats) = {
            let mut state = self.lock();

            let replaced = match state.position(key) {
                Some(index) => {
                    state.unlink(index);
                    true
                }
                None => false,
            };

            let mut evicted = 0;
            while state.total_bytes + size > self.max_total_bytes {
                if state.evict_one().is_none() {
                    break;
                }
                evicted += 1;
            }

            entry.last_access = state.tick();
            state.entries.push(entry);
            state.total_bytes += size;

            (InsertOutcome::Stored { evicted, replaced }, state.stats())
        };

        if let InsertOutcome::Stored { evicted, .. } = outcome {
            metrics::record_cache_evictions(evicted);
        }
        metrics::record_cache_size(stats.entries, stats.total_bytes);
        tracing::debug!(
            size,
            entries = stats.entries,
            total_bytes = stats.total_bytes,
            "Response cached"
        );
        outcome
    }

    /// Evict the least recently used entry.
    ///
    /// Returns the freed accounting size, or `None` when the cache is empty.
    pub fn evict_one(&self) -> Option<usize> {
        let (freed, stats) = {
            let mut state = self.lock();
            let freed = state.evict_one().map(|e| e.accounting_size());
            (freed, state.stats())
        };

        if freed.is_some() {
            metrics::record_cache_evictions(1);
            metrics::record_cache_size(stats.entries, stats.total_bytes);
        }
        freed
    }

    /// Whether `key` is cached, without touching its recency.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.lock().position(key).is_some()
    }

    /// Current entry count and accounted bytes.
    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}
