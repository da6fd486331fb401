//! Persistent database failures cascade through recovery: cached data when
//! the breaker is already open, synthesized data otherwise.

use riskgate_query::DataStore;
use super::{phone_request, seeded_store};
use riskgate::PipelineBuilder;
use riskgate_breaker::CircuitState;
use riskgate_core::{RequestIdentifiers, RiskError};
use riskgate_recovery::{
    CacheProbe, RecoveryContext, RecoveryStrategyManager, RetryManager, RetryPolicy,
    StaticFallbackProvider,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn empty_cache_falls_back_to_generated_profile() {
    let store = seeded_store();
    store.set_failure(Some(RiskError::database("connection refused")));
    let pipeline = PipelineBuilder::new(Arc::clone(&store) as Arc<dyn DataStore>)
        .retry_policy(RetryPolicy {
            max_retries: 0,
            ..Default::default()
        })
        .build();

    let response = pipeline.handle(phone_request("3001234567")).await;
    assert!(response.success);
    assert!(response.fallback);
    assert!(response.recovery_used);
    assert_eq!(response.source, "fallback_generator");
    assert_eq!(response.confidence, 0.4);
    assert_eq!(response.data.unwrap()["riskTier"], "new");

    pipeline.shutdown().await;
}

#[tokio::test]
async fn open_breaker_with_cached_assessment_serves_it() {
    let store = seeded_store();
    let pipeline = PipelineBuilder::new(Arc::clone(&store) as Arc<dyn DataStore>)
        .retry_policy(RetryPolicy {
            max_retries: 0,
            ..Default::default()
        })
        .build();

    // Prime the cache through the primary path.
    let primed = pipeline.handle(phone_request("03001234567")).await;
    assert_eq!(primed.source, "primary");

    // Store goes down and the operator (or thresholds) open the circuit.
    store.set_failure(Some(RiskError::database("connection refused")));
    pipeline
        .breaker()
        .force_state(CircuitState::Open, "store outage")
        .await;

    let response = pipeline.handle(phone_request("+92 300 123 4567")).await;
    assert!(response.success);
    assert!(response.fallback);
    assert!(response.recovery_used);
    assert_eq!(response.source, "cache");
    assert_eq!(response.confidence, 0.8);
    assert_eq!(response.data.unwrap()["customerId"], "c1");

    pipeline.shutdown().await;
}

/// The retry-manager-level contract from the same scenario: a retry chain
/// that exhausts on database errors recovers from a cache probe with
/// `recovery_used = true`.
#[tokio::test]
async fn retry_exhaustion_recovers_from_cache_probe() {
    struct OneKeyProbe;
    impl CacheProbe for OneKeyProbe {
        fn probe(&self, key: &str) -> Option<Value> {
            (key == "fp-1").then(|| json!({"riskTier": "low", "cached": true}))
        }
    }

    let retry = RetryManager::new(
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(5),
            jitter: false,
            ..Default::default()
        },
        Arc::new(RecoveryStrategyManager::with_defaults(
            Some(Arc::new(OneKeyProbe)),
            Arc::new(StaticFallbackProvider),
        )),
    );

    let ctx = RecoveryContext {
        request_id: "req-1".into(),
        cache_key: "fp-1".into(),
        identifiers: RequestIdentifiers::default(),
    };
    let outcome = retry
        .execute_with_retry(&ctx, None, || async {
            Err::<Value, _>(RiskError::database("still down"))
        })
        .await;

    assert!(outcome.success);
    assert!(outcome.recovery_used);
    assert!(!outcome.fallback_used);
    assert_eq!(outcome.attempts.len(), 3);
    assert_eq!(outcome.data.unwrap()["cached"], true);
}
