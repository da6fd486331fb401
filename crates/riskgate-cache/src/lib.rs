//! Intelligent response cache for the riskgate pipeline.
//!
//! Entries are serialized to JSON bytes, optionally gzip-compressed above a
//! size threshold, and held under three simultaneous policies: per-entry TTL,
//! LRU ordering with a hard entry count, and a hard memory ceiling. Reads
//! that find an entry past its staleness ratio schedule a background refresh
//! through a registered loader so hot keys stay warm without blocking the
//! caller.
//!
//! # Example
//!
//! ```
//! use riskgate_cache::{CacheConfig, IntelligentCache};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache: IntelligentCache<String> = IntelligentCache::new(
//!     CacheConfig::builder()
//!         .max_size(100)
//!         .default_ttl(Duration::from_secs(60))
//!         .name("assessments")
//!         .build(),
//! );
//!
//! cache.set("customer:1", &"low-risk".to_string(), None).unwrap();
//! assert_eq!(cache.get("customer:1"), Some("low-risk".to_string()));
//! # cache.destroy();
//! # }
//! ```

mod compression;
mod config;
mod error;
mod events;
mod refresh;
mod store;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use error::CacheError;
pub use events::CacheEvent;
pub use refresh::RefreshFn;

use crate::store::{CacheStore, Entry, RemovalCause};
use hashbrown::HashSet;
use parking_lot::Mutex;
use refresh::RefreshRegistry;
use riskgate_core::RiskError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Point-in-time cache statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Live entry count.
    pub entries: usize,
    /// Stored payload bytes.
    pub memory_usage: usize,
    /// Reads served from the cache.
    pub hits: u64,
    /// Reads that found nothing usable.
    pub misses: u64,
    /// Successful inserts.
    pub sets: u64,
    /// Live entries removed under size or memory pressure.
    pub evictions: u64,
    /// Entries removed because their TTL elapsed.
    pub expirations: u64,
    /// Payloads stored in compressed form.
    pub compressions: u64,
    /// Entries discarded because their payload failed to decompress.
    pub decompression_failures: u64,
    /// Background refreshes scheduled.
    pub refreshes_scheduled: u64,
    /// Background refreshes that failed.
    pub refreshes_failed: u64,
    /// `hits / (hits + misses)`, 0 when idle.
    pub hit_rate: f64,
    /// Stored/original byte ratio across compressed payloads; always <= 1.
    pub compression_ratio: f64,
}

/// Metadata for a single entry, read without touching its access stats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub key: String,
    pub compressed: bool,
    pub original_size: usize,
    pub stored_size: usize,
    pub ttl: Duration,
    pub age: Duration,
    pub access_count: u64,
    pub pattern_tag: Option<String>,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    compressions: AtomicU64,
    decompression_failures: AtomicU64,
    refreshes_scheduled: AtomicU64,
    refreshes_failed: AtomicU64,
    compressed_original_bytes: AtomicU64,
    compressed_stored_bytes: AtomicU64,
}

struct CacheInner<V> {
    config: CacheConfig,
    store: Mutex<CacheStore>,
    registry: Mutex<RefreshRegistry<V>>,
    refreshing: Mutex<HashSet<String>>,
    counters: Counters,
}

/// TTL + LRU + memory-bounded cache with compression and background refresh.
///
/// `V` is the cached value type; values are stored serialized, so `V` needs
/// `Serialize` + `DeserializeOwned` rather than `Clone`.
pub struct IntelligentCache<V> {
    inner: Arc<CacheInner<V>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<V> IntelligentCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Creates a cache and starts its expired-entry sweeper.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: CacheConfig) -> Self {
        let inner = Arc::new(CacheInner {
            store: Mutex::new(CacheStore::new(config.max_size, config.max_memory)),
            registry: Mutex::new(RefreshRegistry::new()),
            refreshing: Mutex::new(HashSet::new()),
            counters: Counters::default(),
            config,
        });

        let sweeper = {
            let inner = Arc::clone(&inner);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(inner.config.cleanup_interval);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tick.tick().await;
                    inner.sweep_expired();
                }
            })
        };

        Self {
            inner,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Stores `value` under `key`.
    ///
    /// `ttl` overrides the configured default; passing an explicit zero TTL
    /// is an error. Returns once the insert, any compression, and any
    /// required evictions are visible to concurrent readers.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: &V,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.inner.store_value(key.into(), value, ttl)
    }

    /// Returns the live value for `key`, if any.
    ///
    /// Updates recency and access stats on a hit. When the entry's age has
    /// crossed the refresh threshold and a refresh function matches the key,
    /// a background refresh is scheduled (at most one in flight per key)
    /// without blocking this call.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let inner = &self.inner;
        let (hit, expired) = {
            let mut store = inner.store.lock();
            match store.get(key, now) {
                Ok(None) => (None, false),
                Err(_) => (None, true),
                Ok(Some(entry)) => (
                    Some((
                        entry.payload.clone(),
                        entry.compressed,
                        entry.age(now),
                        entry.ttl,
                    )),
                    false,
                ),
            }
        };
        if expired {
            inner.counters.expirations.fetch_add(1, Ordering::Relaxed);
            inner.emit(CacheEvent::Expired {
                component: inner.config.name.clone(),
                timestamp: now,
                key: key.to_string(),
            });
        }

        let Some((payload, compressed, age, ttl)) = hit else {
            inner.counters.misses.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "metrics")]
            counter!("cache_reads_total", "cache" => inner.config.name.clone(), "outcome" => "miss")
                .increment(1);
            inner.emit(CacheEvent::Miss {
                component: inner.config.name.clone(),
                timestamp: now,
                key: key.to_string(),
            });
            return None;
        };

        let bytes = if compressed {
            match compression::decompress(&payload) {
                Ok(bytes) => bytes,
                Err(err) => {
                    return self.discard_corrupt(key, &err.to_string());
                }
            }
        } else {
            payload
        };

        let value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(err) => {
                return self.discard_corrupt(key, &err.to_string());
            }
        };

        inner.counters.hits.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        counter!("cache_reads_total", "cache" => inner.config.name.clone(), "outcome" => "hit")
            .increment(1);
        inner.emit(CacheEvent::Hit {
            component: inner.config.name.clone(),
            timestamp: now,
            key: key.to_string(),
        });

        if age.as_secs_f64() >= inner.config.refresh_threshold * ttl.as_secs_f64() {
            self.maybe_schedule_refresh(key, ttl);
        }

        Some(value)
    }

    /// Returns the cached value or runs `loader`, storing its result.
    ///
    /// A storage failure (e.g. an oversized payload) does not fail the load;
    /// it is logged and the freshly-loaded value is returned uncached.
    pub async fn get_or_load<F>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        loader: F,
    ) -> Result<V, RiskError>
    where
        F: Future<Output = Result<V, RiskError>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = loader.await?;
        if let Err(err) = self.set(key.to_string(), &value, ttl) {
            tracing::warn!(cache = %self.inner.config.name, %key, error = %err, "loaded value not cached");
        }
        Ok(value)
    }

    /// Removes `key`. Returns true when an entry was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.inner.store.lock().remove(key).is_some()
    }

    /// Removes every entry. Counters are preserved.
    pub fn clear(&self) {
        self.inner.store.lock().clear();
    }

    /// Registers a refresh function for `pattern` (exact key, or a prefix
    /// with a trailing `*`).
    pub fn register_refresh_fn<F, Fut>(&self, pattern: &str, f: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, RiskError>> + Send + 'static,
    {
        let wrapped: RefreshFn<V> = Arc::new(move |key| Box::pin(f(key)));
        self.inner.registry.lock().register(pattern, wrapped);
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        let inner = &self.inner;
        let (entries, memory_usage) = {
            let store = inner.store.lock();
            (store.len(), store.memory_usage())
        };
        let hits = inner.counters.hits.load(Ordering::Relaxed);
        let misses = inner.counters.misses.load(Ordering::Relaxed);
        let original = inner
            .counters
            .compressed_original_bytes
            .load(Ordering::Relaxed);
        let stored = inner
            .counters
            .compressed_stored_bytes
            .load(Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        gauge!("cache_memory_bytes", "cache" => inner.config.name.clone())
            .set(memory_usage as f64);
        CacheStats {
            entries,
            memory_usage,
            hits,
            misses,
            sets: inner.counters.sets.load(Ordering::Relaxed),
            evictions: inner.counters.evictions.load(Ordering::Relaxed),
            expirations: inner.counters.expirations.load(Ordering::Relaxed),
            compressions: inner.counters.compressions.load(Ordering::Relaxed),
            decompression_failures: inner
                .counters
                .decompression_failures
                .load(Ordering::Relaxed),
            refreshes_scheduled: inner.counters.refreshes_scheduled.load(Ordering::Relaxed),
            refreshes_failed: inner.counters.refreshes_failed.load(Ordering::Relaxed),
            hit_rate: if hits + misses > 0 {
                hits as f64 / (hits + misses) as f64
            } else {
                0.0
            },
            compression_ratio: if original > 0 {
                stored as f64 / original as f64
            } else {
                1.0
            },
        }
    }

    /// Metadata for `key` without updating its access stats.
    pub fn entry_info(&self, key: &str) -> Option<EntryInfo> {
        let store = self.inner.store.lock();
        let entry = store.peek(key)?;
        Some(EntryInfo {
            key: key.to_string(),
            compressed: entry.compressed,
            original_size: entry.original_size,
            stored_size: entry.stored_size,
            ttl: entry.ttl,
            age: entry.age(Instant::now()),
            access_count: entry.access_count,
            pattern_tag: entry.pattern_tag.clone(),
        })
    }

    /// Stops the background sweeper. Idempotent.
    pub fn destroy(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }

    fn maybe_schedule_refresh(&self, key: &str, ttl: Duration) {
        let inner = &self.inner;
        let Some((_, refresh_fn)) = inner.registry.lock().lookup(key) else {
            return;
        };
        // At most one refresh in flight per key.
        if !inner.refreshing.lock().insert(key.to_string()) {
            return;
        }
        inner
            .counters
            .refreshes_scheduled
            .fetch_add(1, Ordering::Relaxed);
        inner.emit(CacheEvent::RefreshScheduled {
            component: inner.config.name.clone(),
            timestamp: Instant::now(),
            key: key.to_string(),
        });

        let inner = Arc::clone(inner);
        let key = key.to_string();
        tokio::spawn(async move {
            let outcome = refresh_fn(key.clone()).await;
            match outcome {
                Ok(value) => {
                    if let Err(err) = inner.store_value(key.clone(), &value, Some(ttl)) {
                        tracing::warn!(cache = %inner.config.name, %key, error = %err, "refreshed value not stored");
                    }
                }
                Err(err) => {
                    inner
                        .counters
                        .refreshes_failed
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(cache = %inner.config.name, %key, error = %err, "background refresh failed");
                    inner.emit(CacheEvent::RefreshFailed {
                        component: inner.config.name.clone(),
                        timestamp: Instant::now(),
                        key: key.clone(),
                    });
                }
            }
            inner.refreshing.lock().remove(&key);
        });
    }

    fn discard_corrupt(&self, key: &str, reason: &str) -> Option<V> {
        let inner = &self.inner;
        inner.store.lock().remove(key);
        inner
            .counters
            .decompression_failures
            .fetch_add(1, Ordering::Relaxed);
        inner.counters.misses.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            cache = %inner.config.name,
            %key,
            reason,
            "discarded undecodable cache entry"
        );
        None
    }
}

impl<V> CacheInner<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn store_value(&self, key: String, value: &V, ttl: Option<Duration>) -> Result<(), CacheError> {
        if matches!(ttl, Some(ttl) if ttl.is_zero()) {
            return Err(CacheError::InvalidTtl);
        }
        let ttl = ttl.unwrap_or(self.config.default_ttl);

        let serialized =
            serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let original_size = serialized.len();

        let (payload, compressed) = if self.config.compression_enabled
            && original_size >= self.config.compression_threshold
        {
            match compression::compress(&serialized) {
                // Keep the raw form when compression does not pay for itself.
                Ok(packed) if packed.len() < original_size => (packed, true),
                Ok(_) => (serialized, false),
                Err(err) => {
                    tracing::warn!(cache = %self.config.name, error = %err, "compression failed, storing raw");
                    (serialized, false)
                }
            }
        } else {
            (serialized, false)
        };
        let stored_size = payload.len();

        if stored_size > self.config.max_memory {
            return Err(CacheError::ValueTooLarge {
                size: stored_size,
                ceiling: self.config.max_memory,
            });
        }

        if compressed {
            self.counters.compressions.fetch_add(1, Ordering::Relaxed);
            self.counters
                .compressed_original_bytes
                .fetch_add(original_size as u64, Ordering::Relaxed);
            self.counters
                .compressed_stored_bytes
                .fetch_add(stored_size as u64, Ordering::Relaxed);
        }

        let pattern_tag = self.registry.lock().lookup(&key).map(|(pattern, _)| pattern);
        let now = Instant::now();
        let entry = Entry {
            payload,
            compressed,
            original_size,
            stored_size,
            ttl,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            pattern_tag,
        };

        let removed = {
            let mut store = self.store.lock();
            store.insert(key, entry)
        };
        self.counters.sets.fetch_add(1, Ordering::Relaxed);

        for (victim, cause) in removed {
            match cause {
                RemovalCause::Evicted => {
                    self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                    #[cfg(feature = "metrics")]
                    counter!("cache_evictions_total", "cache" => self.config.name.clone())
                        .increment(1);
                    self.emit(CacheEvent::Evicted {
                        component: self.config.name.clone(),
                        timestamp: Instant::now(),
                        key: victim,
                    });
                }
                RemovalCause::Expired => {
                    self.counters.expirations.fetch_add(1, Ordering::Relaxed);
                    self.emit(CacheEvent::Expired {
                        component: self.config.name.clone(),
                        timestamp: Instant::now(),
                        key: victim,
                    });
                }
            }
        }
        Ok(())
    }

    fn sweep_expired(&self) {
        let now = Instant::now();
        let expired = {
            let mut store = self.store.lock();
            let keys = store.expired_keys(now);
            for key in &keys {
                store.remove(key);
            }
            keys
        };
        for key in expired {
            self.counters.expirations.fetch_add(1, Ordering::Relaxed);
            self.emit(CacheEvent::Expired {
                component: self.config.name.clone(),
                timestamp: now,
                key,
            });
        }
    }

    fn emit(&self, event: CacheEvent) {
        self.config.event_listeners.emit(&event);
    }
}

impl<V> Drop for IntelligentCache<V> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}
