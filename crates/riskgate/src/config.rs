//! Pipeline assembly.
//!
//! Every subsystem is constructed here, explicitly, before the first request
//! is served; nothing in the request path creates components lazily.

use crate::pipeline::{AssessmentPipeline, PipelineParts};
use riskgate_breaker::{BreakerConfig, CircuitBreaker};
use riskgate_cache::{CacheConfig, IntelligentCache};
use riskgate_dedup::{DedupConfig, RequestDeduplicator};
use riskgate_observe::{LogAnalyzer, LogBuffer, MonitoringDashboard, PerformanceMetrics};
use riskgate_query::{DataStore, QueryOptimizer};
use riskgate_recovery::{
    CacheProbe, DegradationHandler, FallbackProvider, RecoveryStrategyManager, RetryManager,
    RetryPolicy, StaticFallbackProvider,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Lets recovery and degradation read the response cache.
struct CacheProbeAdapter(Arc<IntelligentCache<Value>>);

impl CacheProbe for CacheProbeAdapter {
    fn probe(&self, key: &str) -> Option<Value> {
        self.0.get(key)
    }
}

/// Builds an [`AssessmentPipeline`] over a data store.
///
/// Unset subsystem configs fall back to their crate defaults with pipeline
/// instance names.
pub struct PipelineBuilder {
    store: Arc<dyn DataStore>,
    cache_config: Option<CacheConfig>,
    breaker_config: Option<BreakerConfig>,
    dedup_config: Option<DedupConfig>,
    retry_policy: RetryPolicy,
    fallback_provider: Option<Arc<dyn FallbackProvider>>,
    log_capacity: usize,
    endpoint: String,
    sample_interval: Option<Duration>,
}

impl PipelineBuilder {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            cache_config: None,
            breaker_config: None,
            dedup_config: None,
            retry_policy: RetryPolicy::default(),
            fallback_provider: None,
            log_capacity: 2000,
            endpoint: String::from("/api/assess"),
            sample_interval: None,
        }
    }

    /// Cache configuration. Default: crate defaults, named
    /// `assessment-cache`.
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache_config = Some(config);
        self
    }

    /// Breaker configuration. Default: crate defaults, named
    /// `store-breaker`.
    pub fn breaker(mut self, config: BreakerConfig) -> Self {
        self.breaker_config = Some(config);
        self
    }

    /// Deduplicator configuration. Default: crate defaults, named
    /// `assessment-dedup`.
    pub fn dedup(mut self, config: DedupConfig) -> Self {
        self.dedup_config = Some(config);
        self
    }

    /// Default retry policy for the load path.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Custom fallback-data provider. Default:
    /// [`StaticFallbackProvider`].
    pub fn fallback_provider(mut self, provider: Arc<dyn FallbackProvider>) -> Self {
        self.fallback_provider = Some(provider);
        self
    }

    /// Log ring capacity. Default: 2000 records.
    pub fn log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    /// Endpoint label used in metrics. Default: `/api/assess`.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Enables the periodic performance sampler.
    pub fn sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = Some(interval);
        self
    }

    /// Assembles the pipeline and starts its background tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Arc<AssessmentPipeline> {
        let logs = Arc::new(LogBuffer::new(self.log_capacity));
        let metrics = Arc::new(PerformanceMetrics::new());
        let cache = Arc::new(IntelligentCache::new(self.cache_config.unwrap_or_else(
            || CacheConfig::builder().name("assessment-cache").build(),
        )));
        let dedup = Arc::new(RequestDeduplicator::new(self.dedup_config.unwrap_or_else(
            || DedupConfig::builder().name("assessment-dedup").build(),
        )));
        let breaker = Arc::new(CircuitBreaker::new(self.breaker_config.unwrap_or_else(
            || BreakerConfig::builder().name("store-breaker").build(),
        )));
        let optimizer = Arc::new(QueryOptimizer::new(self.store));

        let provider = self
            .fallback_provider
            .unwrap_or_else(|| Arc::new(StaticFallbackProvider));
        let probe: Arc<dyn CacheProbe> = Arc::new(CacheProbeAdapter(Arc::clone(&cache)));
        let recovery = Arc::new(RecoveryStrategyManager::with_defaults(
            Some(Arc::clone(&probe)),
            Arc::clone(&provider),
        ));
        // The in-breaker retry stage carries no recovery strategies; the
        // pipeline applies `recovery` after the breaker has classified the
        // primary outcome.
        let retry = Arc::new(
            RetryManager::new(self.retry_policy, Arc::new(RecoveryStrategyManager::new()))
                .with_name("assessment-retry"),
        );
        let degradation = Arc::new(
            DegradationHandler::new(Some(probe), provider).with_name("assessment-degradation"),
        );
        let dashboard = Arc::new(MonitoringDashboard::new(
            Arc::clone(&metrics),
            LogAnalyzer::new(Arc::clone(&logs)),
        ));

        if let Some(interval) = self.sample_interval {
            let cache_for_sampler = Arc::clone(&cache);
            let dedup_for_sampler = Arc::clone(&dedup);
            Arc::clone(&metrics).start_snapshotter(interval, move || {
                (
                    cache_for_sampler.stats().memory_usage as u64,
                    dedup_for_sampler.pending_count(),
                )
            });
        }

        Arc::new(AssessmentPipeline::from_parts(PipelineParts {
            optimizer,
            cache,
            dedup,
            breaker,
            retry,
            recovery,
            degradation,
            logs,
            metrics,
            dashboard,
            endpoint: self.endpoint,
        }))
    }
}
