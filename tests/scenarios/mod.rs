mod breaker_lifecycle;
mod cache_pressure;
mod dashboard_view;
mod dedup_collapse;
mod error_cascade;
mod slow_calls;
mod validation;

use riskgate::AssessmentRequest;
use riskgate_core::{hash_identifier, RequestIdentifiers};
use riskgate_query::{CustomerRecord, InMemoryStore};
use std::sync::Arc;

/// A store with one known low-risk customer reachable by phone.
pub fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store.add_customer(CustomerRecord {
        id: "c1".into(),
        phone_hash: Some(hash_identifier("3001234567")),
        email_hash: Some(hash_identifier("jane@example.com")),
        risk_tier: "low".into(),
        risk_score: 12.0,
        total_orders: 4,
        failed_deliveries: 0,
    });
    store
}

pub fn phone_request(phone: &str) -> AssessmentRequest {
    AssessmentRequest {
        request_id: String::new(),
        identifiers: RequestIdentifiers {
            phone: Some(phone.to_string()),
            ..Default::default()
        },
    }
}

pub fn phone_and_order(phone: &str, order_name: &str) -> AssessmentRequest {
    AssessmentRequest {
        request_id: String::new(),
        identifiers: RequestIdentifiers {
            phone: Some(phone.to_string()),
            order_name: Some(order_name.to_string()),
            ..Default::default()
        },
    }
}
