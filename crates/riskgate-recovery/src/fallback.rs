//! Pluggable fallback-data generation.
//!
//! Every payload is tagged `metadata.source = "fallback"` with a numeric
//! confidence, so downstream consumers can always tell synthesized data from
//! the primary path. Payloads never echo raw identifiers, only their
//! presence.

use riskgate_core::RequestIdentifiers;
use serde_json::{json, Value};

/// Source of synthesized data when the primary path cannot produce any.
pub trait FallbackProvider: Send + Sync {
    /// Profile for a customer the system has never seen.
    fn new_customer_profile(&self) -> Value;

    /// Generic profile derived from which identifiers were present.
    fn customer_fallback(&self, identifiers: &RequestIdentifiers) -> Value;

    /// Placeholder order payload.
    fn order_fallback(&self, order_id: &str) -> Value;

    /// Conservative default risk assessment.
    fn default_risk_assessment(&self) -> Value;
}

/// The stock provider: fixed, conservative payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticFallbackProvider;

fn tag(mut payload: Value, confidence: f64) -> Value {
    if let Some(map) = payload.as_object_mut() {
        map.insert(
            "metadata".to_string(),
            json!({ "source": "fallback", "confidence": confidence }),
        );
    }
    payload
}

impl FallbackProvider for StaticFallbackProvider {
    fn new_customer_profile(&self) -> Value {
        tag(
            json!({
                "riskTier": "new",
                "riskScore": 0.0,
                "totalOrders": 0,
                "failedDeliveries": 0,
                "isNewCustomer": true,
            }),
            0.4,
        )
    }

    fn customer_fallback(&self, identifiers: &RequestIdentifiers) -> Value {
        tag(
            json!({
                "riskTier": "new",
                "riskScore": 0.0,
                "identifiersProvided": {
                    "phone": identifiers.phone.is_some(),
                    "email": identifiers.email.is_some(),
                    "orderId": identifiers.order_id.is_some(),
                    "checkoutToken": identifiers.checkout_token.is_some(),
                    "orderName": identifiers.order_name.is_some(),
                },
            }),
            0.4,
        )
    }

    fn order_fallback(&self, order_id: &str) -> Value {
        tag(
            json!({
                "orderId": order_id,
                "events": [],
                "riskSignals": [],
            }),
            0.4,
        )
    }

    fn default_risk_assessment(&self) -> Value {
        tag(
            json!({
                "riskTier": "new",
                "riskScore": 0.0,
                "recommendation": "proceed_with_verification",
            }),
            0.4,
        )
    }
}
