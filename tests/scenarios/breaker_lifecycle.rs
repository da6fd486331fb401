//! The breaker trips on persistent store failures, serves degraded data
//! while OPEN, and recovers through HALF_OPEN once the store heals.

use riskgate_query::DataStore;
use super::{phone_request, seeded_store};
use riskgate::PipelineBuilder;
use riskgate_breaker::{BreakerConfig, CircuitState};
use riskgate_core::RiskError;
use riskgate_recovery::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn trips_after_three_failures_and_recovers() {
    let store = seeded_store();
    let pipeline = PipelineBuilder::new(Arc::clone(&store) as Arc<dyn DataStore>)
        .breaker(
            BreakerConfig::builder()
                .failure_threshold(3)
                .recovery_timeout(Duration::from_millis(500))
                .half_open_max_calls(3)
                .success_threshold(2)
                .name("store-breaker")
                .build(),
        )
        .retry_policy(RetryPolicy {
            max_retries: 0,
            ..Default::default()
        })
        .build();

    store.set_failure(Some(RiskError::database("connection refused")));

    // Three failing calls trip the circuit; each still produces a degraded
    // response for the caller.
    for i in 0..3 {
        let response = pipeline
            .handle(phone_request(&format!("30012345{i:02}")))
            .await;
        assert!(response.fallback, "call {i} should be degraded");
    }
    assert_eq!(pipeline.breaker().state().await, CircuitState::Open);

    // While OPEN the store is never touched.
    let queries_before = pipeline.optimizer().query_stats(None).total;
    let rejected = pipeline.handle(phone_request("3001234599")).await;
    assert!(rejected.fallback);
    assert_eq!(pipeline.optimizer().query_stats(None).total, queries_before);

    tokio::time::sleep(Duration::from_millis(600)).await;
    store.set_failure(None);

    // First probe succeeds and moves the circuit to HALF_OPEN.
    let probe = pipeline.handle(phone_request("03001234567")).await;
    assert!(probe.success);
    assert_eq!(probe.source, "primary");
    assert_eq!(pipeline.breaker().state().await, CircuitState::HalfOpen);

    // Second success closes it.
    let probe = pipeline.handle(phone_request("3001234501")).await;
    assert!(probe.success);
    assert_eq!(pipeline.breaker().state().await, CircuitState::Closed);

    assert_eq!(pipeline.breaker().metrics().await.trips, 1);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn two_failures_do_not_trip() {
    let store = seeded_store();
    let pipeline = PipelineBuilder::new(Arc::clone(&store) as Arc<dyn DataStore>)
        .breaker(
            BreakerConfig::builder()
                .failure_threshold(3)
                .name("store-breaker")
                .build(),
        )
        .retry_policy(RetryPolicy {
            max_retries: 0,
            ..Default::default()
        })
        .build();

    store.set_failure(Some(RiskError::database("connection refused")));
    for i in 0..2 {
        let _ = pipeline
            .handle(phone_request(&format!("30012345{i:02}")))
            .await;
    }
    assert_eq!(pipeline.breaker().state().await, CircuitState::Closed);
    pipeline.shutdown().await;
}
