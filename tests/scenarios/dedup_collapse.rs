//! Ten concurrent requests whose identifiers normalize to the same
//! fingerprint must collapse into one store lookup.

use riskgate_query::DataStore;
use super::{phone_and_order, seeded_store};
use riskgate::PipelineBuilder;
use riskgate_recovery::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn identical_requests_share_one_lookup() {
    let store = seeded_store();
    store.set_latency(Some(Duration::from_millis(100)));
    let pipeline = PipelineBuilder::new(Arc::clone(&store) as Arc<dyn DataStore>)
        .retry_policy(RetryPolicy {
            max_retries: 0,
            ..Default::default()
        })
        .build();

    // Formatting variants of the same phone, all anchoring to the same last
    // ten digits.
    let phones = [
        "+92 300 123 4567",
        "03001234567",
        "92-300-123-4567",
        "+92 (300) 123 4567",
        "3001234567",
        "0092 300 1234567",
        "+92 3001234567",
        "92 300 123 4567",
        "(0300) 123-4567",
        "0300 123 4567",
    ];

    let mut handles = Vec::new();
    for phone in phones {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            pipeline.handle(phone_and_order(phone, "ORDER-1")).await
        }));
    }

    let mut responses = Vec::new();
    for handle in handles {
        responses.push(handle.await.unwrap());
    }

    let first = &responses[0];
    for response in &responses {
        assert!(response.success);
        assert_eq!(response.data, first.data);
        assert_eq!(response.data.as_ref().unwrap()["customerId"], "c1");
    }

    // One leader ran the lookup; everyone else attached to it.
    assert_eq!(pipeline.optimizer().query_stats(None).total, 1);
    let stats = pipeline.dedup().stats();
    assert_eq!(stats.pending_requests, 0);
    assert_eq!(stats.cached_timestamps, 1);
    assert_eq!(stats.leaders, 1);
    assert_eq!(stats.coalesced, 9);

    pipeline.shutdown().await;
}
