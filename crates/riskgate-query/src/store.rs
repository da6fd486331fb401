//! The logical surface of the relational store, kept opaque behind a trait.
//!
//! Implementations translate these operations to whatever backend actually
//! holds customer data; store failures surface as
//! [`ErrorKind::Database`](riskgate_core::ErrorKind::Database) errors.

use futures::future::BoxFuture;
use riskgate_core::RiskError;
use serde::{Deserialize, Serialize};

/// A customer row as the optimizer sees it. Identifier columns hold hashes,
/// never raw values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub id: String,
    pub phone_hash: Option<String>,
    pub email_hash: Option<String>,
    pub risk_tier: String,
    pub risk_score: f64,
    pub total_orders: u64,
    pub failed_deliveries: u64,
}

/// A single order event attached to a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub id: String,
    pub customer_id: String,
    pub order_id: String,
    pub event_type: String,
    pub created_at_ms: u64,
}

/// Correlation row linking a checkout token to a customer and order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutCorrelation {
    pub token: String,
    pub customer_id: String,
    pub order_id: Option<String>,
}

/// Filters for order-event listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderEventFilter {
    /// Maximum events to return, newest first. `None` means store default.
    pub limit: Option<usize>,
    /// Restrict to these event types when non-empty.
    pub event_types: Vec<String>,
}

/// Fallback selector for customers when no hashed identifier is available.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerSelector {
    pub customer_id: Option<String>,
    pub order_id: Option<String>,
    pub order_name: Option<String>,
}

impl CustomerSelector {
    pub fn is_empty(&self) -> bool {
        self.customer_id.is_none() && self.order_id.is_none() && self.order_name.is_none()
    }
}

/// The store operations the optimizer consumes.
pub trait DataStore: Send + Sync {
    /// Unique-index lookup by phone hash.
    fn find_customer_by_phone_hash<'a>(
        &'a self,
        phone_hash: &'a str,
    ) -> BoxFuture<'a, Result<Option<CustomerRecord>, RiskError>>;

    /// Unique-index lookup by email hash.
    fn find_customer_by_email_hash<'a>(
        &'a self,
        email_hash: &'a str,
    ) -> BoxFuture<'a, Result<Option<CustomerRecord>, RiskError>>;

    /// First customer matching the selector.
    fn find_customer_first<'a>(
        &'a self,
        selector: &'a CustomerSelector,
    ) -> BoxFuture<'a, Result<Option<CustomerRecord>, RiskError>>;

    /// Order events for a customer, newest first.
    fn find_order_events<'a>(
        &'a self,
        customer_id: &'a str,
        filter: &'a OrderEventFilter,
    ) -> BoxFuture<'a, Result<Vec<OrderEvent>, RiskError>>;

    /// Correlation row for a checkout token.
    fn find_checkout_correlation<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, Result<Option<CheckoutCorrelation>, RiskError>>;

    /// Cheap liveness probe.
    fn health_check(&self) -> BoxFuture<'_, Result<(), RiskError>>;
}
