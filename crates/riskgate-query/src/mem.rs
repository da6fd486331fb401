//! In-memory [`DataStore`] used by tests and local development.
//!
//! Besides seeding data, it can inject a fixed latency or a forced failure
//! into every operation, which is how the resilience layers above it are
//! exercised.

use crate::store::{
    CheckoutCorrelation, CustomerRecord, CustomerSelector, DataStore, OrderEvent, OrderEventFilter,
};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use riskgate_core::RiskError;
use std::time::Duration;

#[derive(Debug, Clone)]
struct OrderLink {
    order_id: String,
    order_name: Option<String>,
    customer_id: String,
}

/// Seedable in-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    customers: RwLock<Vec<CustomerRecord>>,
    events: RwLock<Vec<OrderEvent>>,
    correlations: RwLock<Vec<CheckoutCorrelation>>,
    order_links: RwLock<Vec<OrderLink>>,
    forced_failure: RwLock<Option<RiskError>>,
    latency: RwLock<Option<Duration>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_customer(&self, customer: CustomerRecord) {
        self.customers.write().push(customer);
    }

    pub fn add_event(&self, event: OrderEvent) {
        self.events.write().push(event);
    }

    pub fn add_correlation(&self, correlation: CheckoutCorrelation) {
        self.correlations.write().push(correlation);
    }

    /// Associates an order (by id and optional human-facing name) with a
    /// customer for selector lookups.
    pub fn link_order(&self, order_id: &str, order_name: Option<&str>, customer_id: &str) {
        self.order_links.write().push(OrderLink {
            order_id: order_id.to_string(),
            order_name: order_name.map(str::to_string),
            customer_id: customer_id.to_string(),
        });
    }

    /// Makes every subsequent operation fail with a clone of `error`.
    /// Pass `None` to heal the store.
    pub fn set_failure(&self, error: Option<RiskError>) {
        *self.forced_failure.write() = error;
    }

    /// Adds a fixed delay to every operation.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    async fn gate(&self) -> Result<(), RiskError> {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match self.forced_failure.read().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn customer_by_id(&self, id: &str) -> Option<CustomerRecord> {
        self.customers.read().iter().find(|c| c.id == id).cloned()
    }
}

impl DataStore for InMemoryStore {
    fn find_customer_by_phone_hash<'a>(
        &'a self,
        phone_hash: &'a str,
    ) -> BoxFuture<'a, Result<Option<CustomerRecord>, RiskError>> {
        Box::pin(async move {
            self.gate().await?;
            Ok(self
                .customers
                .read()
                .iter()
                .find(|c| c.phone_hash.as_deref() == Some(phone_hash))
                .cloned())
        })
    }

    fn find_customer_by_email_hash<'a>(
        &'a self,
        email_hash: &'a str,
    ) -> BoxFuture<'a, Result<Option<CustomerRecord>, RiskError>> {
        Box::pin(async move {
            self.gate().await?;
            Ok(self
                .customers
                .read()
                .iter()
                .find(|c| c.email_hash.as_deref() == Some(email_hash))
                .cloned())
        })
    }

    fn find_customer_first<'a>(
        &'a self,
        selector: &'a CustomerSelector,
    ) -> BoxFuture<'a, Result<Option<CustomerRecord>, RiskError>> {
        Box::pin(async move {
            self.gate().await?;
            if let Some(id) = &selector.customer_id {
                return Ok(self.customer_by_id(id));
            }
            let links = self.order_links.read();
            let link = links.iter().find(|l| {
                selector
                    .order_id
                    .as_deref()
                    .is_some_and(|id| l.order_id == id)
                    || selector
                        .order_name
                        .as_deref()
                        .is_some_and(|name| l.order_name.as_deref() == Some(name))
            });
            Ok(link.and_then(|l| self.customer_by_id(&l.customer_id)))
        })
    }

    fn find_order_events<'a>(
        &'a self,
        customer_id: &'a str,
        filter: &'a OrderEventFilter,
    ) -> BoxFuture<'a, Result<Vec<OrderEvent>, RiskError>> {
        Box::pin(async move {
            self.gate().await?;
            let mut events: Vec<OrderEvent> = self
                .events
                .read()
                .iter()
                .filter(|e| e.customer_id == customer_id)
                .filter(|e| {
                    filter.event_types.is_empty() || filter.event_types.contains(&e.event_type)
                })
                .cloned()
                .collect();
            events.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
            if let Some(limit) = filter.limit {
                events.truncate(limit);
            }
            Ok(events)
        })
    }

    fn find_checkout_correlation<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, Result<Option<CheckoutCorrelation>, RiskError>> {
        Box::pin(async move {
            self.gate().await?;
            Ok(self
                .correlations
                .read()
                .iter()
                .find(|c| c.token == token)
                .cloned())
        })
    }

    fn health_check(&self) -> BoxFuture<'_, Result<(), RiskError>> {
        Box::pin(async move { self.gate().await })
    }
}
