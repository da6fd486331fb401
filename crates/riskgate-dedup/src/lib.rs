//! Request deduplication for the riskgate pipeline.
//!
//! Concurrent requests that normalize to the same fingerprint are collapsed
//! into a single in-flight computation: the first caller becomes the leader
//! and its work is spawned onto the runtime, every later caller attaches to
//! the same broadcast result. The leader's work keeps running even if the
//! caller that started it goes away, so attached waiters always observe a
//! settlement.
//!
//! After a computation settles, its completion timestamp is retained for the
//! deduplication TTL so `is_duplicate` probes and cache-hit accounting can
//! recognize recently-served keys. A background sweeper removes slots and
//! timestamps past the TTL.
//!
//! # Example
//!
//! ```
//! use riskgate_dedup::{DedupConfig, RequestDeduplicator};
//! use riskgate_core::RiskError;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let dedup: RequestDeduplicator<String> =
//!     RequestDeduplicator::new(DedupConfig::builder().name("assessments").build());
//!
//! let result = dedup
//!     .register("fingerprint-1".to_string(), async {
//!         Ok::<_, RiskError>("profile".to_string())
//!     })
//!     .await;
//! assert_eq!(result.unwrap(), "profile");
//! # dedup.destroy();
//! # }
//! ```

mod config;
mod events;

pub use config::{DedupConfig, DedupConfigBuilder};
pub use events::DedupEvent;

use hashbrown::HashMap;
use parking_lot::Mutex;
use riskgate_core::RiskError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[cfg(feature = "metrics")]
use metrics::counter;

/// Point-in-time statistics for a deduplicator instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupStats {
    /// Number of live in-flight slots.
    pub pending_requests: usize,
    /// Number of retained completion timestamps.
    pub cached_timestamps: usize,
    /// Requests that became leaders since construction.
    pub leaders: u64,
    /// Requests that attached to an existing computation since construction.
    pub coalesced: u64,
}

struct PendingSlot<T> {
    tx: broadcast::Sender<Result<T, RiskError>>,
    registered_at: Instant,
}

struct Shared<T> {
    pending: Mutex<HashMap<String, PendingSlot<T>>>,
    completed: Mutex<HashMap<String, Instant>>,
    leaders: AtomicU64,
    coalesced: AtomicU64,
}

/// Collapses concurrent identical requests into a single computation.
///
/// `T` is the result type of the deduplicated work; it must be `Clone`
/// because every attached caller receives its own copy of the settlement.
pub struct RequestDeduplicator<T> {
    config: Arc<DedupConfig>,
    shared: Arc<Shared<T>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + 'static,
{
    /// Creates a deduplicator and starts its background sweeper.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: DedupConfig) -> Self {
        let config = Arc::new(config);
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            completed: Mutex::new(HashMap::new()),
            leaders: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        });

        let sweeper = {
            let shared = Arc::clone(&shared);
            let config = Arc::clone(&config);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(config.sweep_interval);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tick.tick().await;
                    Self::sweep(&shared, &config);
                }
            })
        };

        Self {
            config,
            shared,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Registers `work` under `key` and returns its eventual outcome.
    ///
    /// If no computation is in flight for `key`, `work` is spawned and this
    /// caller becomes the leader; otherwise `work` is dropped unexecuted and
    /// the caller attaches to the in-flight computation. All attached callers
    /// observe the same result or the same error. Dropping any caller's
    /// future (including the leader's) does not cancel the spawned work.
    pub async fn register<F>(&self, key: String, work: F) -> Result<T, RiskError>
    where
        F: Future<Output = Result<T, RiskError>> + Send + 'static,
    {
        let mut rx = {
            let mut pending = self.shared.pending.lock();
            if let Some(slot) = pending.get(&key) {
                self.shared.coalesced.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "metrics")]
                counter!("dedup_requests_total", "dedup" => self.config.name.clone(), "role" => "waiter")
                    .increment(1);
                tracing::debug!(dedup = %self.config.name, %key, "attached to in-flight request");
                self.config
                    .event_listeners
                    .emit(&DedupEvent::WaiterAttached {
                        component: self.config.name.clone(),
                        timestamp: Instant::now(),
                        key: key.clone(),
                    });
                slot.tx.subscribe()
            } else {
                let (tx, rx) = broadcast::channel(1);
                pending.insert(
                    key.clone(),
                    PendingSlot {
                        tx,
                        registered_at: Instant::now(),
                    },
                );
                drop(pending);

                self.shared.leaders.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "metrics")]
                counter!("dedup_requests_total", "dedup" => self.config.name.clone(), "role" => "leader")
                    .increment(1);
                tracing::debug!(dedup = %self.config.name, %key, "executing as leader");
                self.config.event_listeners.emit(&DedupEvent::LeaderStarted {
                    component: self.config.name.clone(),
                    timestamp: Instant::now(),
                    key: key.clone(),
                });

                let shared = Arc::clone(&self.shared);
                let config = Arc::clone(&self.config);
                tokio::spawn(async move {
                    let result = work.await;
                    let success = result.is_ok();
                    let slot = {
                        let mut pending = shared.pending.lock();
                        let slot = pending.remove(&key);
                        shared.completed.lock().insert(key.clone(), Instant::now());
                        slot
                    };
                    // Slot may already be gone if the sweeper expired it.
                    if let Some(slot) = slot {
                        let _ = slot.tx.send(result);
                    }
                    config.event_listeners.emit(&DedupEvent::Settled {
                        component: config.name.clone(),
                        timestamp: Instant::now(),
                        key,
                        success,
                    });
                });
                rx
            }
        };

        match rx.recv().await {
            Ok(result) => result,
            Err(_) => Err(RiskError::internal(
                "deduplicated request settled without a result",
            )),
        }
    }

    /// True when `key` has a live in-flight computation or settled within the
    /// deduplication TTL.
    pub fn is_duplicate(&self, key: &str) -> bool {
        if self.shared.pending.lock().contains_key(key) {
            return true;
        }
        self.shared
            .completed
            .lock()
            .get(key)
            .is_some_and(|at| at.elapsed() < self.config.ttl)
    }

    /// Number of live in-flight slots.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Current statistics.
    pub fn stats(&self) -> DedupStats {
        DedupStats {
            pending_requests: self.shared.pending.lock().len(),
            cached_timestamps: self.shared.completed.lock().len(),
            leaders: self.shared.leaders.load(Ordering::Relaxed),
            coalesced: self.shared.coalesced.load(Ordering::Relaxed),
        }
    }

    fn sweep(shared: &Shared<T>, config: &DedupConfig) {
        let now = Instant::now();
        let expired_pending = {
            let mut pending = shared.pending.lock();
            let before = pending.len();
            // Dropping a slot's sender wakes its waiters with an error.
            pending.retain(|_, slot| now.duration_since(slot.registered_at) < config.ttl);
            before - pending.len()
        };
        let expired_timestamps = {
            let mut completed = shared.completed.lock();
            let before = completed.len();
            completed.retain(|_, at| now.duration_since(*at) < config.ttl);
            before - completed.len()
        };
        if expired_pending > 0 || expired_timestamps > 0 {
            tracing::debug!(
                dedup = %config.name,
                expired_pending,
                expired_timestamps,
                "sweeper removed stale entries"
            );
            config.event_listeners.emit(&DedupEvent::Swept {
                component: config.name.clone(),
                timestamp: Instant::now(),
                expired_pending,
                expired_timestamps,
            });
        }
    }

    /// Stops the background sweeper. Idempotent.
    pub fn destroy(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}

impl<T> Drop for RequestDeduplicator<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn dedup<T: Clone + Send + 'static>(ttl: Duration) -> RequestDeduplicator<T> {
        RequestDeduplicator::new(DedupConfig::builder().ttl(ttl).name("test").build())
    }

    #[tokio::test]
    async fn leader_executes_work_once() {
        let dedup: RequestDeduplicator<u32> = dedup(Duration::from_secs(300));
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        let result = dedup
            .register("k".into(), async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dedup.pending_count(), 0);
        dedup.destroy();
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let dedup: Arc<RequestDeduplicator<u32>> = Arc::new(dedup(Duration::from_secs(300)));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let dedup = Arc::clone(&dedup);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                dedup
                    .register("same-key".into(), async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = dedup.stats();
        assert_eq!(stats.pending_requests, 0);
        assert_eq!(stats.cached_timestamps, 1);
        assert_eq!(stats.leaders, 1);
        dedup.destroy();
    }

    #[tokio::test]
    async fn failures_propagate_to_every_caller() {
        let dedup: Arc<RequestDeduplicator<u32>> = Arc::new(dedup(Duration::from_secs(300)));

        let a = {
            let dedup = Arc::clone(&dedup);
            tokio::spawn(async move {
                dedup
                    .register("k".into(), async {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Err(RiskError::database("store down"))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let b = {
            let dedup = Arc::clone(&dedup);
            tokio::spawn(async move {
                dedup
                    .register("k".into(), async { Ok(1) })
                    .await
            })
        };

        let ea = a.await.unwrap().unwrap_err();
        let eb = b.await.unwrap().unwrap_err();
        assert_eq!(ea, eb);
        assert_eq!(dedup.pending_count(), 0);
        dedup.destroy();
    }

    #[tokio::test]
    async fn cancelled_originator_does_not_cancel_work() {
        let dedup: Arc<RequestDeduplicator<u32>> = Arc::new(dedup(Duration::from_secs(300)));
        let calls = Arc::new(AtomicUsize::new(0));

        let leader = {
            let dedup = Arc::clone(&dedup);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                dedup
                    .register("k".into(), async move {
                        tokio::time::sleep(Duration::from_millis(40)).await;
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(9)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        let waiter = {
            let dedup = Arc::clone(&dedup);
            tokio::spawn(async move { dedup.register("k".into(), async { Ok(0) }).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        // The originating caller goes away; the spawned work must still
        // settle for the remaining waiter.
        leader.abort();
        assert_eq!(waiter.await.unwrap().unwrap(), 9);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        dedup.destroy();
    }

    #[tokio::test]
    async fn is_duplicate_tracks_pending_and_recent() {
        let dedup: Arc<RequestDeduplicator<u32>> = Arc::new(dedup(Duration::from_secs(300)));
        assert!(!dedup.is_duplicate("k"));

        let handle = {
            let dedup = Arc::clone(&dedup);
            tokio::spawn(async move {
                dedup
                    .register("k".into(), async {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok(1)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(dedup.is_duplicate("k"));

        handle.await.unwrap().unwrap();
        // Settled, but the completion timestamp is still within the TTL.
        assert!(dedup.is_duplicate("k"));
        dedup.destroy();
    }

    #[tokio::test]
    async fn sweeper_expires_timestamps() {
        let dedup: RequestDeduplicator<u32> = RequestDeduplicator::new(
            DedupConfig::builder()
                .ttl(Duration::from_millis(40))
                .sweep_interval(Duration::from_millis(20))
                .build(),
        );

        dedup.register("k".into(), async { Ok(1) }).await.unwrap();
        assert_eq!(dedup.stats().cached_timestamps, 1);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(dedup.stats().cached_timestamps, 0);
        assert!(!dedup.is_duplicate("k"));
        dedup.destroy();
    }
}
