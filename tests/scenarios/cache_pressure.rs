//! LRU behavior of the assessment cache under entry-count pressure.

use riskgate_cache::{CacheConfig, IntelligentCache};
use serde_json::{json, Value};
use std::time::Duration;

#[tokio::test]
async fn recently_read_entries_survive_pressure() {
    let cache: IntelligentCache<Value> = IntelligentCache::new(
        CacheConfig::builder()
            .max_size(10)
            .default_ttl(Duration::from_secs(60))
            .name("assessment-cache")
            .build(),
    );

    for i in 1..=10 {
        cache
            .set(format!("k{i}"), &json!({ "n": i }), None)
            .unwrap();
    }
    // Reading k1 promotes it; k2 becomes the eviction victim.
    assert!(cache.get("k1").is_some());
    cache.set("k11", &json!({ "n": 11 }), None).unwrap();

    let stats = cache.stats();
    assert_eq!(stats.entries, 10);
    assert_eq!(stats.evictions, 1);
    assert!(cache.get("k1").is_some());
    assert!(cache.get("k2").is_none());
    assert!(cache.get("k11").is_some());

    cache.destroy();
}

#[tokio::test]
async fn memory_ceiling_holds_after_every_insert() {
    let cache: IntelligentCache<Value> = IntelligentCache::new(
        CacheConfig::builder()
            .max_size(1000)
            .max_memory(4096)
            .compression_enabled(false)
            .name("assessment-cache")
            .build(),
    );

    let blob: String = "x".repeat(400);
    for i in 0..50 {
        cache
            .set(format!("k{i}"), &json!({ "blob": blob }), None)
            .unwrap();
        let stats = cache.stats();
        assert!(stats.memory_usage <= 4096, "ceiling broken at insert {i}");
        assert!(stats.entries <= 1000);
    }
    assert!(cache.stats().evictions > 0);

    cache.destroy();
}
