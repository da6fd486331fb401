//! Bounded per-query metric window and slow-query detection.

use riskgate_core::ErrorKind;
use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// The typed queries the optimizer executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QueryType {
    CustomerByIdentifiers,
    OrderEvents,
    CheckoutCorrelation,
    HealthCheck,
}

impl QueryType {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryType::CustomerByIdentifiers => "customer_by_identifiers",
            QueryType::OrderEvents => "order_events",
            QueryType::CheckoutCorrelation => "checkout_correlation",
            QueryType::HealthCheck => "health_check",
        }
    }
}

/// One recorded query execution.
#[derive(Debug, Clone)]
pub struct QueryMetric {
    pub query_type: QueryType,
    pub params_hash: String,
    pub duration: Duration,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    pub(crate) at: Instant,
}

/// Payload handed to slow-query callbacks.
#[derive(Debug, Clone)]
pub struct SlowQuery {
    pub query_type: QueryType,
    pub duration: Duration,
    pub params_hash: String,
}

/// Aggregate statistics over a metric window.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryStats {
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    pub slow_queries: usize,
    pub avg_duration: Duration,
    /// Per-query-type count and average duration.
    pub by_type: BTreeMap<&'static str, TypeStats>,
}

/// Per-type aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeStats {
    pub count: usize,
    pub avg_duration: Duration,
}

const MAX_RETAINED_METRICS: usize = 10_000;

/// Rolling window of query metrics with bounded retention.
pub(crate) struct MetricWindow {
    records: VecDeque<QueryMetric>,
    retention: Duration,
}

impl MetricWindow {
    pub(crate) fn new(retention: Duration) -> Self {
        Self {
            records: VecDeque::new(),
            retention,
        }
    }

    pub(crate) fn push(&mut self, metric: QueryMetric) {
        self.trim(Instant::now());
        self.records.push_back(metric);
        while self.records.len() > MAX_RETAINED_METRICS {
            self.records.pop_front();
        }
    }

    pub(crate) fn stats(&mut self, window: Option<Duration>, slow_threshold: Duration) -> QueryStats {
        let now = Instant::now();
        self.trim(now);
        let horizon = window.unwrap_or(self.retention);

        let mut total = 0usize;
        let mut successes = 0usize;
        let mut slow = 0usize;
        let mut sum = Duration::ZERO;
        let mut by_type: BTreeMap<&'static str, (usize, Duration)> = BTreeMap::new();

        for record in self
            .records
            .iter()
            .filter(|r| now.duration_since(r.at) <= horizon)
        {
            total += 1;
            if record.success {
                successes += 1;
            }
            if record.duration >= slow_threshold {
                slow += 1;
            }
            sum += record.duration;
            let entry = by_type
                .entry(record.query_type.as_str())
                .or_insert((0, Duration::ZERO));
            entry.0 += 1;
            entry.1 += record.duration;
        }

        QueryStats {
            total,
            successes,
            failures: total - successes,
            slow_queries: slow,
            avg_duration: if total > 0 {
                sum / total as u32
            } else {
                Duration::ZERO
            },
            by_type: by_type
                .into_iter()
                .map(|(k, (count, dur))| {
                    (
                        k,
                        TypeStats {
                            count,
                            avg_duration: dur / count as u32,
                        },
                    )
                })
                .collect(),
        }
    }

    fn trim(&mut self, now: Instant) {
        while let Some(front) = self.records.front() {
            if now.duration_since(front.at) > self.retention {
                self.records.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(query_type: QueryType, ms: u64, success: bool) -> QueryMetric {
        QueryMetric {
            query_type,
            params_hash: "abcd".into(),
            duration: Duration::from_millis(ms),
            success,
            error_kind: None,
            at: Instant::now(),
        }
    }

    #[test]
    fn aggregates_by_type() {
        let mut window = MetricWindow::new(Duration::from_secs(300));
        window.push(metric(QueryType::CustomerByIdentifiers, 10, true));
        window.push(metric(QueryType::CustomerByIdentifiers, 30, true));
        window.push(metric(QueryType::OrderEvents, 100, false));

        let stats = window.stats(None, Duration::from_millis(50));
        assert_eq!(stats.total, 3);
        assert_eq!(stats.successes, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.slow_queries, 1);
        assert_eq!(
            stats.by_type["customer_by_identifiers"].avg_duration,
            Duration::from_millis(20)
        );
    }

    #[test]
    fn empty_window_is_zeroed() {
        let mut window = MetricWindow::new(Duration::from_secs(300));
        let stats = window.stats(None, Duration::from_secs(1));
        assert_eq!(stats.total, 0);
        assert_eq!(stats.avg_duration, Duration::ZERO);
    }
}
