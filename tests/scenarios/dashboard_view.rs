//! The dashboard aggregates metrics and logs from real pipeline traffic.

use riskgate_query::DataStore;
use super::{phone_request, seeded_store};
use riskgate::PipelineBuilder;
use riskgate_breaker::CircuitState;
use riskgate_observe::SystemStatus;
use std::sync::Arc;

#[tokio::test]
async fn healthy_traffic_reads_healthy() {
    let pipeline = PipelineBuilder::new(seeded_store() as Arc<dyn DataStore>).build();
    for _ in 0..5 {
        let response = pipeline.handle(phone_request("03001234567")).await;
        assert!(response.success);
    }

    let snapshot = pipeline.dashboard().snapshot();
    assert_eq!(snapshot.status, SystemStatus::Healthy);
    assert_eq!(snapshot.endpoints.len(), 1);
    assert_eq!(snapshot.endpoints[0].endpoint, "/api/assess");
    assert_eq!(snapshot.endpoints[0].total_requests, 5);
    assert!(snapshot.active_alerts.is_empty());

    let csv = pipeline.dashboard().export_csv();
    assert!(csv.starts_with(
        "timestamp,endpoint,totalRequests,successfulRequests,failedRequests,averageResponseTime,errorRatePct,cacheHitRatePct"
    ));
    assert!(csv.contains("/api/assess"));

    pipeline.shutdown().await;
}

#[tokio::test]
async fn open_breaker_shows_up_in_endpoint_trip_counters() {
    let pipeline = PipelineBuilder::new(seeded_store() as Arc<dyn DataStore>).build();
    pipeline
        .breaker()
        .force_state(CircuitState::Open, "drill")
        .await;

    let response = pipeline.handle(phone_request("3001234500")).await;
    assert!(response.fallback);

    let stats = pipeline
        .metrics()
        .endpoint_stats("/api/assess")
        .expect("endpoint recorded");
    assert_eq!(stats.circuit_breaker_trips, 1);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn json_export_carries_the_full_snapshot() {
    let pipeline = PipelineBuilder::new(seeded_store() as Arc<dyn DataStore>).build();
    let _ = pipeline.handle(phone_request("03001234567")).await;

    let exported = pipeline.dashboard().export_json();
    assert!(exported.get("status").is_some());
    assert!(exported.get("endpoints").is_some());
    assert!(exported.get("healthScore").is_some() || exported.get("health_score").is_some());

    pipeline.shutdown().await;
}
