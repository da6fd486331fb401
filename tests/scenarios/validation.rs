//! Invalid input short-circuits before any resilience machinery runs.

use riskgate_query::DataStore;
use super::seeded_store;
use riskgate::{AssessmentRequest, PipelineBuilder};
use riskgate_core::RequestIdentifiers;
use std::sync::Arc;

#[tokio::test]
async fn bad_phone_yields_a_minimal_response_without_touching_the_store() {
    let store = seeded_store();
    let pipeline = PipelineBuilder::new(Arc::clone(&store) as Arc<dyn DataStore>).build();

    let response = pipeline
        .handle(AssessmentRequest {
            request_id: "req-bad".into(),
            identifiers: RequestIdentifiers {
                phone: Some("abc".into()),
                ..Default::default()
            },
        })
        .await;

    assert!(!response.success);
    assert_eq!(response.source, "minimal_response");
    assert_eq!(response.confidence, 0.0);
    assert!(response.data.is_none());
    assert!(response.message.is_some());

    // No store query, no dedup slot, nothing cached.
    assert_eq!(pipeline.optimizer().query_stats(None).total, 0);
    assert_eq!(pipeline.dedup().stats().cached_timestamps, 0);
    assert_eq!(pipeline.cache().stats().entries, 0);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn empty_identifiers_are_rejected() {
    let pipeline = PipelineBuilder::new(seeded_store() as Arc<dyn DataStore>).build();
    let response = pipeline.handle(AssessmentRequest::default()).await;
    assert!(!response.success);
    assert_eq!(response.source, "minimal_response");
    pipeline.shutdown().await;
}

#[tokio::test]
async fn responses_never_leak_identifiers() {
    let pipeline = PipelineBuilder::new(seeded_store() as Arc<dyn DataStore>).build();
    let response = pipeline
        .handle(AssessmentRequest {
            request_id: "req-leak".into(),
            identifiers: RequestIdentifiers {
                phone: Some("0300 123 4567".into()),
                email: Some("jane.doe@example.com".into()),
                ..Default::default()
            },
        })
        .await;

    let serialized = serde_json::to_string(&response).unwrap();
    assert!(!serialized.contains("3001234567"));
    assert!(!serialized.contains("jane.doe"));
    pipeline.shutdown().await;
}
