//! Bounded storage: LRU ordering with simultaneous count and byte ceilings.

use lru::LruCache;
use std::time::{Duration, Instant};

/// A stored payload plus the bookkeeping the cache policies need.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub payload: Vec<u8>,
    pub compressed: bool,
    pub original_size: usize,
    pub stored_size: usize,
    pub ttl: Duration,
    pub created_at: Instant,
    pub last_accessed_at: Instant,
    pub access_count: u64,
    pub pattern_tag: Option<String>,
}

impl Entry {
    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }

    pub(crate) fn age(&self, now: Instant) -> Duration {
        now.duration_since(self.created_at)
    }
}

/// Why an entry left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemovalCause {
    Expired,
    Evicted,
}

/// LRU store enforcing `len <= max_size` and `memory_usage <= max_memory`.
///
/// All mutation happens under the owner's lock; this type is purely
/// single-threaded bookkeeping.
pub(crate) struct CacheStore {
    entries: LruCache<String, Entry>,
    memory_usage: usize,
    max_size: usize,
    max_memory: usize,
}

impl CacheStore {
    pub(crate) fn new(max_size: usize, max_memory: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            memory_usage: 0,
            max_size,
            max_memory,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn memory_usage(&self) -> usize {
        self.memory_usage
    }

    /// Looks up a live entry, updating recency and access stats.
    /// An expired entry is removed and reported, not returned.
    pub(crate) fn get(&mut self, key: &str, now: Instant) -> Result<Option<&Entry>, RemovalCause> {
        let expired = match self.entries.peek(key) {
            None => return Ok(None),
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            self.remove(key);
            return Err(RemovalCause::Expired);
        }
        // `get_mut` also promotes the key to most-recently-used.
        let entry = self.entries.get_mut(key).expect("checked entry present");
        entry.last_accessed_at = now;
        entry.access_count += 1;
        Ok(Some(&*entry))
    }

    /// Reads entry metadata without touching recency or access stats.
    pub(crate) fn peek(&self, key: &str) -> Option<&Entry> {
        self.entries.peek(key)
    }

    /// Inserts an entry, then restores both ceilings by removing
    /// least-recently-used entries. Returns everything removed, oldest first,
    /// with the reason it was removed.
    pub(crate) fn insert(&mut self, key: String, entry: Entry) -> Vec<(String, RemovalCause)> {
        let now = Instant::now();
        if let Some(previous) = self.entries.pop(&key) {
            self.memory_usage -= previous.stored_size;
        }
        self.memory_usage += entry.stored_size;
        self.entries.push(key, entry);

        let mut removed = Vec::new();
        while self.entries.len() > self.max_size || self.memory_usage > self.max_memory {
            let Some((victim_key, victim)) = self.entries.pop_lru() else {
                break;
            };
            self.memory_usage -= victim.stored_size;
            let cause = if victim.is_expired(now) {
                RemovalCause::Expired
            } else {
                RemovalCause::Evicted
            };
            removed.push((victim_key, cause));
        }
        removed
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.pop(key)?;
        self.memory_usage -= entry.stored_size;
        Some(entry)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.memory_usage = 0;
    }

    /// Keys whose entries have expired, for the sweeper.
    pub(crate) fn expired_keys(&self, now: Instant) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }
}
