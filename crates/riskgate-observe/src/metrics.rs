//! Per-endpoint performance metrics with rolling windows and periodic
//! samples.

use parking_lot::Mutex;
use riskgate_core::ErrorKind;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

const MAX_SAMPLES: usize = 288;

/// One recorded API call.
#[derive(Debug, Clone)]
struct ApiCallRecord {
    at: Instant,
    duration: Duration,
    status: u16,
    cache_hit: bool,
    error_kind: Option<ErrorKind>,
}

#[derive(Default)]
struct EndpointWindow {
    records: VecDeque<ApiCallRecord>,
    breaker_trips: u64,
    lifetime_requests: u64,
}

/// Aggregate statistics for one endpoint over the rolling window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointStats {
    pub endpoint: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub avg_response_ms: f64,
    pub p50_response_ms: u64,
    pub p95_response_ms: u64,
    pub p99_response_ms: u64,
    pub error_rate: f64,
    pub cache_hit_rate: f64,
    pub circuit_breaker_trips: u64,
    pub lifetime_requests: u64,
}

/// One periodic snapshot of system-level numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSample {
    pub epoch_ms: u64,
    pub memory_bytes: u64,
    pub active_connections: usize,
    pub requests_per_sec: f64,
    pub avg_response_ms: f64,
    pub error_rate: f64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn percentile_ms(sorted: &[Duration], q: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (sorted.len() as f64 * q).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1].as_millis() as u64
}

/// Collects per-endpoint timings, outcomes, and cache hits.
///
/// Recording is a short synchronous critical section and never blocks on
/// I/O; percentiles are computed from a sorted snapshot at query time.
pub struct PerformanceMetrics {
    endpoints: Mutex<BTreeMap<String, EndpointWindow>>,
    samples: Mutex<VecDeque<PerformanceSample>>,
    window: Duration,
    snapshotter: Mutex<Option<JoinHandle<()>>>,
}

impl PerformanceMetrics {
    /// Collector with a five-minute rolling window.
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(300))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            endpoints: Mutex::new(BTreeMap::new()),
            samples: Mutex::new(VecDeque::new()),
            window,
            snapshotter: Mutex::new(None),
        }
    }

    /// Records one API call.
    ///
    /// A `CircuitBreaker` error kind also bumps the endpoint's breaker-trip
    /// counter.
    pub fn record_api_call(
        &self,
        endpoint: &str,
        duration: Duration,
        status: u16,
        cache_hit: bool,
        error_kind: Option<ErrorKind>,
    ) {
        let now = Instant::now();
        let mut endpoints = self.endpoints.lock();
        let window = endpoints.entry(endpoint.to_string()).or_default();
        while let Some(front) = window.records.front() {
            if now.duration_since(front.at) > self.window {
                window.records.pop_front();
            } else {
                break;
            }
        }
        window.records.push_back(ApiCallRecord {
            at: now,
            duration,
            status,
            cache_hit,
            error_kind,
        });
        window.lifetime_requests += 1;
        if error_kind == Some(ErrorKind::CircuitBreaker) {
            window.breaker_trips += 1;
        }
    }

    /// Stats for one endpoint, `None` when it has never been seen.
    pub fn endpoint_stats(&self, endpoint: &str) -> Option<EndpointStats> {
        let now = Instant::now();
        let endpoints = self.endpoints.lock();
        let window = endpoints.get(endpoint)?;
        Some(Self::stats_for(endpoint, window, now, self.window))
    }

    /// Stats for every known endpoint.
    pub fn all_stats(&self) -> Vec<EndpointStats> {
        let now = Instant::now();
        let endpoints = self.endpoints.lock();
        endpoints
            .iter()
            .map(|(name, window)| Self::stats_for(name, window, now, self.window))
            .collect()
    }

    fn stats_for(
        endpoint: &str,
        window: &EndpointWindow,
        now: Instant,
        horizon: Duration,
    ) -> EndpointStats {
        let live: Vec<&ApiCallRecord> = window
            .records
            .iter()
            .filter(|r| now.duration_since(r.at) <= horizon)
            .collect();
        let total = live.len() as u64;
        let failed = live
            .iter()
            .filter(|r| r.status >= 500 || r.error_kind.is_some())
            .count() as u64;
        let cache_hits = live.iter().filter(|r| r.cache_hit).count() as u64;

        let mut durations: Vec<Duration> = live.iter().map(|r| r.duration).collect();
        durations.sort_unstable();
        let avg_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().map(|d| d.as_secs_f64() * 1000.0).sum::<f64>()
                / durations.len() as f64
        };

        EndpointStats {
            endpoint: endpoint.to_string(),
            total_requests: total,
            successful_requests: total - failed,
            failed_requests: failed,
            avg_response_ms: avg_ms,
            p50_response_ms: percentile_ms(&durations, 0.50),
            p95_response_ms: percentile_ms(&durations, 0.95),
            p99_response_ms: percentile_ms(&durations, 0.99),
            error_rate: if total > 0 {
                failed as f64 / total as f64
            } else {
                0.0
            },
            cache_hit_rate: if total > 0 {
                cache_hits as f64 / total as f64
            } else {
                0.0
            },
            circuit_breaker_trips: window.breaker_trips,
            lifetime_requests: window.lifetime_requests,
        }
    }

    /// Takes one system sample with caller-supplied memory and connection
    /// numbers; the rest is derived from the rolling windows.
    pub fn record_sample(&self, memory_bytes: u64, active_connections: usize) {
        let stats = self.all_stats();
        let total: u64 = stats.iter().map(|s| s.total_requests).sum();
        let failed: u64 = stats.iter().map(|s| s.failed_requests).sum();
        let weighted_avg = if total > 0 {
            stats
                .iter()
                .map(|s| s.avg_response_ms * s.total_requests as f64)
                .sum::<f64>()
                / total as f64
        } else {
            0.0
        };

        let sample = PerformanceSample {
            epoch_ms: now_ms(),
            memory_bytes,
            active_connections,
            requests_per_sec: total as f64 / self.window.as_secs_f64().max(1.0),
            avg_response_ms: weighted_avg,
            error_rate: if total > 0 {
                failed as f64 / total as f64
            } else {
                0.0
            },
        };

        let mut samples = self.samples.lock();
        if samples.len() >= MAX_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// The most recent `n` samples, oldest first.
    pub fn recent_samples(&self, n: usize) -> Vec<PerformanceSample> {
        let samples = self.samples.lock();
        let skip = samples.len().saturating_sub(n);
        samples.iter().skip(skip).cloned().collect()
    }

    /// Starts a periodic sampler that pulls memory and connection numbers
    /// from `source`. Must be called from within a tokio runtime.
    pub fn start_snapshotter<F>(self: std::sync::Arc<Self>, interval: Duration, source: F)
    where
        F: Fn() -> (u64, usize) + Send + Sync + 'static,
    {
        let metrics = std::sync::Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                let (memory, connections) = source();
                metrics.record_sample(memory, connections);
            }
        });
        if let Some(previous) = self.snapshotter.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stops the snapshotter. Idempotent.
    pub fn destroy(&self) {
        if let Some(handle) = self.snapshotter.lock().take() {
            handle.abort();
        }
    }

    /// Clears all windows, counters, and samples.
    pub fn reset(&self) {
        self.endpoints.lock().clear();
        self.samples.lock().clear();
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PerformanceMetrics {
    fn drop(&mut self) {
        if let Some(handle) = self.snapshotter.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(metrics: &PerformanceMetrics, ms: u64, status: u16, hit: bool) {
        metrics.record_api_call(
            "/api/assess",
            Duration::from_millis(ms),
            status,
            hit,
            (status >= 500).then_some(ErrorKind::Database),
        );
    }

    #[test]
    fn aggregates_per_endpoint() {
        let metrics = PerformanceMetrics::new();
        call(&metrics, 10, 200, true);
        call(&metrics, 30, 200, false);
        call(&metrics, 200, 500, false);

        let stats = metrics.endpoint_stats("/api/assess").unwrap();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.failed_requests, 1);
        assert!((stats.avg_response_ms - 80.0).abs() < 1.0);
        assert!((stats.error_rate - 1.0 / 3.0).abs() < 1e-9);
        assert!((stats.cache_hit_rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn percentiles_come_from_sorted_snapshot() {
        let metrics = PerformanceMetrics::new();
        for ms in 1..=100 {
            call(&metrics, ms, 200, false);
        }
        let stats = metrics.endpoint_stats("/api/assess").unwrap();
        assert_eq!(stats.p50_response_ms, 50);
        assert_eq!(stats.p95_response_ms, 95);
        assert_eq!(stats.p99_response_ms, 99);
    }

    #[test]
    fn breaker_errors_bump_the_trip_counter() {
        let metrics = PerformanceMetrics::new();
        metrics.record_api_call(
            "/api/assess",
            Duration::from_millis(5),
            503,
            false,
            Some(ErrorKind::CircuitBreaker),
        );
        metrics.record_api_call(
            "/api/assess",
            Duration::from_millis(5),
            200,
            false,
            None,
        );
        let stats = metrics.endpoint_stats("/api/assess").unwrap();
        assert_eq!(stats.circuit_breaker_trips, 1);
    }

    #[test]
    fn unknown_endpoint_is_none() {
        let metrics = PerformanceMetrics::new();
        assert!(metrics.endpoint_stats("/nope").is_none());
    }

    #[test]
    fn samples_are_bounded_and_ordered() {
        let metrics = PerformanceMetrics::new();
        call(&metrics, 10, 200, false);
        for _ in 0..3 {
            metrics.record_sample(1024, 2);
        }
        let samples = metrics.recent_samples(2);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].active_connections, 2);
        assert!(samples[0].requests_per_sec > 0.0);
    }
}
