//! A healthy-but-slow store trips the breaker via the slow-call rate.

use riskgate_query::DataStore;
use super::seeded_store;
use super::phone_request;
use riskgate::PipelineBuilder;
use riskgate_breaker::{BreakerConfig, CircuitState};
use riskgate_recovery::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn slow_store_opens_the_circuit() {
    let store = seeded_store();
    store.set_latency(Some(Duration::from_millis(100)));
    let pipeline = PipelineBuilder::new(Arc::clone(&store) as Arc<dyn DataStore>)
        .breaker(
            BreakerConfig::builder()
                .failure_threshold(100)
                .failure_rate_threshold(1.1)
                .min_samples(10)
                .slow_call_threshold(Duration::from_millis(50))
                .slow_call_rate_threshold(0.8)
                .name("store-breaker")
                .build(),
        )
        .retry_policy(RetryPolicy {
            max_retries: 0,
            ..Default::default()
        })
        .build();

    // Ten distinct customers so every call misses the cache and feels the
    // store latency. All succeed; all are slow.
    for i in 0..10 {
        let response = pipeline
            .handle(phone_request(&format!("30012345{i:02}")))
            .await;
        assert!(response.success, "call {i} should succeed");
    }

    let metrics = pipeline.breaker().metrics().await;
    assert_eq!(metrics.state, CircuitState::Open);
    assert!(metrics.window_slow_calls >= 8, "slow calls: {}", metrics.window_slow_calls);
    assert_eq!(metrics.trips, 1);

    pipeline.shutdown().await;
}
