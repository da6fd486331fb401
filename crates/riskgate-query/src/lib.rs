//! Query optimizer for the riskgate pipeline.
//!
//! Sits between the resilience layers and the opaque [`DataStore`], choosing
//! the most selective lookup path for a set of customer identifiers (phone
//! unique index, then email, then checkout-token correlation, then order
//! lookup), executing batches in priority order with per-item failure
//! isolation, and tracking per-query metrics with slow-query callbacks.
//!
//! # Example
//!
//! ```
//! use riskgate_query::{InMemoryStore, QueryOptimizer};
//! use riskgate_query::store::CustomerRecord;
//! use riskgate_core::{hash_identifier, RequestIdentifiers};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = Arc::new(InMemoryStore::new());
//! store.add_customer(CustomerRecord {
//!     id: "c1".into(),
//!     phone_hash: Some(hash_identifier("3001234567")),
//!     email_hash: None,
//!     risk_tier: "low".into(),
//!     risk_score: 12.0,
//!     total_orders: 4,
//!     failed_deliveries: 0,
//! });
//!
//! let optimizer = QueryOptimizer::new(store);
//! let ids = RequestIdentifiers {
//!     phone: Some("+92 300 123 4567".into()),
//!     ..Default::default()
//! }
//! .normalized();
//! let customer = optimizer.find_customer_by_identifiers(&ids).await.unwrap();
//! assert_eq!(customer.unwrap().id, "c1");
//! # }
//! ```

mod mem;
mod metrics;
pub mod store;

pub use mem::InMemoryStore;
pub use metrics::{QueryMetric, QueryStats, QueryType, SlowQuery, TypeStats};
pub use store::{
    CheckoutCorrelation, CustomerRecord, CustomerSelector, DataStore, OrderEvent, OrderEventFilter,
};

use metrics::MetricWindow;
use parking_lot::{Mutex, RwLock};
use riskgate_core::{hash_identifier, short_hash, NormalizedIdentifiers, RiskError};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Callback invoked when a query exceeds the slow-query threshold.
pub type SlowQueryCallback = Arc<dyn Fn(&SlowQuery) + Send + Sync>;

/// One entry in a batch request.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub query: BatchQuery,
    pub priority: BatchPriority,
}

/// The queries a batch may carry. `Other` exists for callers that build
/// batches from untyped input; it always fails its own item.
#[derive(Debug, Clone)]
pub enum BatchQuery {
    CustomerByIdentifiers(NormalizedIdentifiers),
    OrderEvents {
        customer_id: String,
        filter: OrderEventFilter,
    },
    CheckoutCorrelation {
        token: String,
    },
    Other {
        query_type: String,
    },
}

/// Execution priority; higher runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BatchPriority {
    High,
    Medium,
    Low,
}

/// Per-item batch result, in the order the items were submitted.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchResult {
    Customer(Option<CustomerRecord>),
    OrderEvents(Vec<OrderEvent>),
    Correlation(Option<CheckoutCorrelation>),
}

/// Typed query surface over the data store with metrics and slow-query
/// tracking.
pub struct QueryOptimizer {
    store: Arc<dyn DataStore>,
    window: Mutex<MetricWindow>,
    slow_threshold_ms: AtomicU64,
    slow_callbacks: RwLock<Vec<SlowQueryCallback>>,
}

impl QueryOptimizer {
    /// Creates an optimizer over `store` with a 1s slow-query threshold and
    /// five minutes of metric retention.
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            window: Mutex::new(MetricWindow::new(Duration::from_secs(300))),
            slow_threshold_ms: AtomicU64::new(1000),
            slow_callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Finds a customer by the most selective identifier available:
    /// phone hash, then email hash, then checkout-token correlation, then
    /// order id / order name.
    pub async fn find_customer_by_identifiers(
        &self,
        ids: &NormalizedIdentifiers,
    ) -> Result<Option<CustomerRecord>, RiskError> {
        let params_hash = short_hash(&format!(
            "{}|{}|{}|{}|{}",
            ids.phone.as_deref().unwrap_or(""),
            ids.email.as_deref().unwrap_or(""),
            ids.order_id.as_deref().unwrap_or(""),
            ids.checkout_token.as_deref().unwrap_or(""),
            ids.order_name.as_deref().unwrap_or(""),
        ));
        let store = &self.store;
        self.timed(QueryType::CustomerByIdentifiers, params_hash, async move {
            if let Some(phone) = &ids.phone {
                let hash = hash_identifier(phone);
                if let Some(customer) = store.find_customer_by_phone_hash(&hash).await? {
                    return Ok(Some(customer));
                }
            }
            if let Some(email) = &ids.email {
                let hash = hash_identifier(email);
                if let Some(customer) = store.find_customer_by_email_hash(&hash).await? {
                    return Ok(Some(customer));
                }
            }
            if let Some(token) = &ids.checkout_token {
                if let Some(correlation) = store.find_checkout_correlation(token).await? {
                    let selector = CustomerSelector {
                        customer_id: Some(correlation.customer_id),
                        ..Default::default()
                    };
                    if let Some(customer) = store.find_customer_first(&selector).await? {
                        return Ok(Some(customer));
                    }
                }
            }
            let selector = CustomerSelector {
                customer_id: None,
                order_id: ids.order_id.clone(),
                order_name: ids.order_name.clone(),
            };
            if selector.is_empty() {
                return Ok(None);
            }
            store.find_customer_first(&selector).await
        })
        .await
    }

    /// Order events for a customer, newest first.
    pub async fn find_order_events(
        &self,
        customer_id: &str,
        filter: &OrderEventFilter,
    ) -> Result<Vec<OrderEvent>, RiskError> {
        let params_hash = short_hash(customer_id);
        let store = &self.store;
        self.timed(QueryType::OrderEvents, params_hash, async move {
            store.find_order_events(customer_id, filter).await
        })
        .await
    }

    /// Correlation record for a checkout token.
    pub async fn find_checkout_correlation(
        &self,
        token: &str,
    ) -> Result<Option<CheckoutCorrelation>, RiskError> {
        let params_hash = short_hash(token);
        let store = &self.store;
        self.timed(QueryType::CheckoutCorrelation, params_hash, async move {
            store.find_checkout_correlation(token).await
        })
        .await
    }

    /// Store liveness probe.
    pub async fn health_check(&self) -> Result<(), RiskError> {
        let store = &self.store;
        self.timed(QueryType::HealthCheck, String::new(), async move {
            store.health_check().await
        })
        .await
    }

    /// Executes a batch, grouped by priority (high first) and query type.
    ///
    /// Results come back in submission order; each item succeeds or fails on
    /// its own, and an unknown query type fails only that item.
    pub async fn batch_query(
        &self,
        items: Vec<BatchItem>,
    ) -> Vec<Result<BatchResult, RiskError>> {
        let mut order: Vec<(usize, BatchItem)> = items.into_iter().enumerate().collect();
        // Stable sort keeps submission order inside each priority/type group.
        order.sort_by_key(|(_, item)| (item.priority, discriminant_rank(&item.query)));

        let mut results: Vec<Option<Result<BatchResult, RiskError>>> =
            (0..order.len()).map(|_| None).collect();

        for (index, item) in order {
            let result = match item.query {
                BatchQuery::CustomerByIdentifiers(ids) => self
                    .find_customer_by_identifiers(&ids)
                    .await
                    .map(BatchResult::Customer),
                BatchQuery::OrderEvents {
                    customer_id,
                    filter,
                } => self
                    .find_order_events(&customer_id, &filter)
                    .await
                    .map(BatchResult::OrderEvents),
                BatchQuery::CheckoutCorrelation { token } => self
                    .find_checkout_correlation(&token)
                    .await
                    .map(BatchResult::Correlation),
                BatchQuery::Other { query_type } => Err(RiskError::validation(format!(
                    "unknown query type: {query_type}"
                ))),
            };
            results[index] = Some(result);
        }

        results.into_iter().map(|r| r.expect("filled")).collect()
    }

    /// Aggregate statistics over the retained window, optionally narrowed to
    /// the last `window`.
    pub fn query_stats(&self, window: Option<Duration>) -> QueryStats {
        let threshold = Duration::from_millis(self.slow_threshold_ms.load(Ordering::Relaxed));
        self.window.lock().stats(window, threshold)
    }

    /// Registers a slow-query callback. Callback panics are swallowed.
    pub fn on_slow_query<F>(&self, callback: F)
    where
        F: Fn(&SlowQuery) + Send + Sync + 'static,
    {
        self.slow_callbacks.write().push(Arc::new(callback));
    }

    /// Updates the slow-query threshold.
    pub fn set_slow_query_threshold(&self, threshold: Duration) {
        self.slow_threshold_ms
            .store(threshold.as_millis() as u64, Ordering::Relaxed);
    }

    async fn timed<T, F>(
        &self,
        query_type: QueryType,
        params_hash: String,
        fut: F,
    ) -> Result<T, RiskError>
    where
        F: Future<Output = Result<T, RiskError>>,
    {
        let start = Instant::now();
        let result = fut.await;
        let duration = start.elapsed();

        let (success, error_kind) = match &result {
            Ok(_) => (true, None),
            Err(err) => (false, Some(err.kind)),
        };
        self.window.lock().push(QueryMetric {
            query_type,
            params_hash: params_hash.clone(),
            duration,
            success,
            error_kind,
            at: Instant::now(),
        });

        let threshold = Duration::from_millis(self.slow_threshold_ms.load(Ordering::Relaxed));
        if duration >= threshold {
            tracing::warn!(
                query_type = query_type.as_str(),
                duration_ms = duration.as_millis() as u64,
                params_hash = %params_hash,
                "slow query detected"
            );
            let slow = SlowQuery {
                query_type,
                duration,
                params_hash,
            };
            let callbacks = self.slow_callbacks.read().clone();
            for callback in callbacks {
                let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    callback(&slow);
                }));
            }
        }

        result
    }
}

fn discriminant_rank(query: &BatchQuery) -> u8 {
    match query {
        BatchQuery::CustomerByIdentifiers(_) => 0,
        BatchQuery::OrderEvents { .. } => 1,
        BatchQuery::CheckoutCorrelation { .. } => 2,
        BatchQuery::Other { .. } => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskgate_core::{ErrorKind, RequestIdentifiers};
    use std::sync::atomic::AtomicUsize;

    fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.add_customer(CustomerRecord {
            id: "c1".into(),
            phone_hash: Some(hash_identifier("3001234567")),
            email_hash: Some(hash_identifier("jane@example.com")),
            risk_tier: "low".into(),
            risk_score: 10.0,
            total_orders: 3,
            failed_deliveries: 0,
        });
        store.add_customer(CustomerRecord {
            id: "c2".into(),
            phone_hash: None,
            email_hash: None,
            risk_tier: "high".into(),
            risk_score: 82.0,
            total_orders: 9,
            failed_deliveries: 6,
        });
        store.link_order("o-77", Some("ORDER-77"), "c2");
        store.add_correlation(CheckoutCorrelation {
            token: "tok-1".into(),
            customer_id: "c1".into(),
            order_id: Some("o-1".into()),
        });
        store
    }

    fn ids(raw: RequestIdentifiers) -> NormalizedIdentifiers {
        raw.normalized()
    }

    #[tokio::test]
    async fn phone_lookup_wins_over_everything() {
        let optimizer = QueryOptimizer::new(seeded_store());
        let customer = optimizer
            .find_customer_by_identifiers(&ids(RequestIdentifiers {
                phone: Some("+92 300 123 4567".into()),
                order_name: Some("ORDER-77".into()),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert_eq!(customer.unwrap().id, "c1");
    }

    #[tokio::test]
    async fn email_lookup_is_case_insensitive() {
        let optimizer = QueryOptimizer::new(seeded_store());
        let customer = optimizer
            .find_customer_by_identifiers(&ids(RequestIdentifiers {
                email: Some("JANE@Example.COM".into()),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert_eq!(customer.unwrap().id, "c1");
    }

    #[tokio::test]
    async fn checkout_token_correlates_to_customer() {
        let optimizer = QueryOptimizer::new(seeded_store());
        let customer = optimizer
            .find_customer_by_identifiers(&ids(RequestIdentifiers {
                checkout_token: Some("TOK-1".into()),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert_eq!(customer.unwrap().id, "c1");
    }

    #[tokio::test]
    async fn order_name_is_the_last_resort() {
        let optimizer = QueryOptimizer::new(seeded_store());
        let customer = optimizer
            .find_customer_by_identifiers(&ids(RequestIdentifiers {
                order_name: Some("ORDER-77".into()),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert_eq!(customer.unwrap().id, "c2");
    }

    #[tokio::test]
    async fn missing_customer_is_none_not_an_error() {
        let optimizer = QueryOptimizer::new(seeded_store());
        let customer = optimizer
            .find_customer_by_identifiers(&ids(RequestIdentifiers {
                phone: Some("9998887770".into()),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert!(customer.is_none());
    }

    #[tokio::test]
    async fn store_failures_surface_typed() {
        let store = seeded_store();
        store.set_failure(Some(RiskError::database("connection refused")));
        let optimizer = QueryOptimizer::new(store);
        let err = optimizer
            .find_customer_by_identifiers(&ids(RequestIdentifiers {
                phone: Some("3001234567".into()),
                ..Default::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Database);
    }

    #[tokio::test]
    async fn batch_preserves_order_and_isolates_failures() {
        let optimizer = QueryOptimizer::new(seeded_store());
        let results = optimizer
            .batch_query(vec![
                BatchItem {
                    query: BatchQuery::Other {
                        query_type: "bogus".into(),
                    },
                    priority: BatchPriority::Low,
                },
                BatchItem {
                    query: BatchQuery::CheckoutCorrelation {
                        token: "tok-1".into(),
                    },
                    priority: BatchPriority::High,
                },
                BatchItem {
                    query: BatchQuery::CustomerByIdentifiers(ids(RequestIdentifiers {
                        phone: Some("3001234567".into()),
                        ..Default::default()
                    })),
                    priority: BatchPriority::Medium,
                },
            ])
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(
            results[0].as_ref().unwrap_err().kind,
            ErrorKind::Validation
        );
        assert!(matches!(
            results[1].as_ref().unwrap(),
            BatchResult::Correlation(Some(_))
        ));
        assert!(matches!(
            results[2].as_ref().unwrap(),
            BatchResult::Customer(Some(_))
        ));
    }

    #[tokio::test]
    async fn slow_queries_fire_callbacks() {
        let store = seeded_store();
        store.set_latency(Some(Duration::from_millis(30)));
        let optimizer = QueryOptimizer::new(store);
        optimizer.set_slow_query_threshold(Duration::from_millis(10));

        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        optimizer.on_slow_query(move |slow| {
            assert_eq!(slow.query_type, QueryType::CustomerByIdentifiers);
            f.fetch_add(1, Ordering::SeqCst);
        });
        // A panicking callback must not break the query or later callbacks.
        optimizer.on_slow_query(|_| panic!("listener bug"));
        let f2 = Arc::clone(&fired);
        optimizer.on_slow_query(move |_| {
            f2.fetch_add(1, Ordering::SeqCst);
        });

        let customer = optimizer
            .find_customer_by_identifiers(&ids(RequestIdentifiers {
                phone: Some("3001234567".into()),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert!(customer.is_some());
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stats_track_queries() {
        let optimizer = QueryOptimizer::new(seeded_store());
        optimizer.health_check().await.unwrap();
        optimizer
            .find_checkout_correlation("tok-1")
            .await
            .unwrap();

        let stats = optimizer.query_stats(None);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.failures, 0);
        assert!(stats.by_type.contains_key("health_check"));
    }
}
