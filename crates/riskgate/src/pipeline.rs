//! The assessment pipeline: validation, deduplication, breaker-guarded
//! retried loads, and degradation, with metrics and logs at every stage.

use riskgate_breaker::CircuitBreaker;
use riskgate_cache::IntelligentCache;
use riskgate_core::{ErrorKind, RequestIdentifiers, RiskError};
use riskgate_dedup::RequestDeduplicator;
use riskgate_observe::{LogBuffer, MonitoringDashboard, PerformanceMetrics};
use riskgate_query::{CustomerRecord, QueryOptimizer};
use riskgate_recovery::{
    DegradationHandler, RecoveryAction, RecoveryContext, RecoveryStrategyManager, RetryManager,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// An inbound assessment request.
#[derive(Debug, Clone, Default)]
pub struct AssessmentRequest {
    /// Correlation id; generated when empty.
    pub request_id: String,
    /// Customer identifiers in whatever shape the loader received them.
    pub identifiers: RequestIdentifiers,
}

/// The pipeline's always-well-formed response.
///
/// Exactly one of three shapes: a primary success, a flagged fallback with a
/// confidence score, or a minimal failure with a user-safe message. Nothing
/// here ever carries store details, file paths, or stack traces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResponse {
    pub request_id: String,
    pub success: bool,
    pub data: Option<Value>,
    pub fallback: bool,
    /// `primary`, `cache`, `fallback_generator`, `minimal_response`, or
    /// `emergency_fallback`.
    pub source: String,
    pub confidence: f64,
    /// Whether a recovery strategy produced the data.
    pub recovery_used: bool,
    /// User-safe explanation, present only on failures.
    pub message: Option<String>,
    /// The error class behind a fallback or failure; feeds metrics, never
    /// the wire.
    #[serde(skip)]
    pub error_kind: Option<ErrorKind>,
}

pub(crate) struct PipelineParts {
    pub optimizer: Arc<QueryOptimizer>,
    pub cache: Arc<IntelligentCache<Value>>,
    pub dedup: Arc<RequestDeduplicator<PipelineResponse>>,
    pub breaker: Arc<CircuitBreaker>,
    pub retry: Arc<RetryManager>,
    pub recovery: Arc<RecoveryStrategyManager>,
    pub degradation: Arc<DegradationHandler>,
    pub logs: Arc<LogBuffer>,
    pub metrics: Arc<PerformanceMetrics>,
    pub dashboard: Arc<MonitoringDashboard>,
    pub endpoint: String,
}

/// The resilient request-serving core, one instance per process.
///
/// Construct with [`PipelineBuilder`](crate::PipelineBuilder); tear down
/// with [`shutdown`](Self::shutdown).
pub struct AssessmentPipeline {
    optimizer: Arc<QueryOptimizer>,
    cache: Arc<IntelligentCache<Value>>,
    dedup: Arc<RequestDeduplicator<PipelineResponse>>,
    breaker: Arc<CircuitBreaker>,
    retry: Arc<RetryManager>,
    recovery: Arc<RecoveryStrategyManager>,
    degradation: Arc<DegradationHandler>,
    logs: Arc<LogBuffer>,
    metrics: Arc<PerformanceMetrics>,
    dashboard: Arc<MonitoringDashboard>,
    endpoint: String,
    next_request_id: AtomicU64,
}

impl AssessmentPipeline {
    pub(crate) fn from_parts(parts: PipelineParts) -> Self {
        Self {
            optimizer: parts.optimizer,
            cache: parts.cache,
            dedup: parts.dedup,
            breaker: parts.breaker,
            retry: parts.retry,
            recovery: parts.recovery,
            degradation: parts.degradation,
            logs: parts.logs,
            metrics: parts.metrics,
            dashboard: parts.dashboard,
            endpoint: parts.endpoint,
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Serves one assessment request end to end. Never errors: failures come
    /// back as fallback or minimal responses.
    pub async fn handle(&self, request: AssessmentRequest) -> PipelineResponse {
        let started = Instant::now();
        let request_id = if request.request_id.is_empty() {
            format!("req-{}", self.next_request_id.fetch_add(1, Ordering::Relaxed))
        } else {
            request.request_id.clone()
        };

        let normalized = match request.identifiers.validate() {
            Ok(normalized) => normalized,
            Err(err) => {
                self.logs.warn(
                    "pipeline",
                    Some(&request_id),
                    &format!("request rejected: {}", err.message),
                );
                let response = self.degraded(&request_id, &err, &request.identifiers, "");
                self.finish(&request_id, started, &response, Some(err.kind), false);
                return response;
            }
        };
        let fingerprint = request.identifiers.fingerprint();
        let had_cached = self.cache.entry_info(&fingerprint).is_some();

        let work = {
            let optimizer = Arc::clone(&self.optimizer);
            let cache = Arc::clone(&self.cache);
            let breaker = Arc::clone(&self.breaker);
            let retry = Arc::clone(&self.retry);
            let recovery = Arc::clone(&self.recovery);
            let degradation = Arc::clone(&self.degradation);
            let identifiers = request.identifiers.clone();
            let fingerprint = fingerprint.clone();
            let request_id = request_id.clone();

            async move {
                let ctx = RecoveryContext {
                    request_id: request_id.clone(),
                    cache_key: fingerprint.clone(),
                    identifiers: identifiers.clone(),
                };

                let optimizer_ref = &*optimizer;
                let cache_ref = &*cache;
                let normalized_ref = &normalized;
                let key = fingerprint.clone();
                let ctx_ref = &ctx;
                let retry_ref = &*retry;

                // The breaker sees only the primary path: the retry stage
                // runs without recovery so a synthesized fallback can never
                // mask a failing store from the trip counters. Recovery gets
                // its shot below, where it also catches open-circuit
                // rejections (that is when the cache probe pays off).
                let guarded = breaker
                    .execute_labeled("assessment", async move {
                        let outcome = retry_ref
                            .execute_with_retry(ctx_ref, None, move || {
                                let key = key.clone();
                                async move {
                                    cache_ref
                                        .get_or_load(&key, None, async {
                                            let customer = optimizer_ref
                                                .find_customer_by_identifiers(normalized_ref)
                                                .await?;
                                            Ok(assessment_payload(customer))
                                        })
                                        .await
                                }
                            })
                            .await;
                        if outcome.success {
                            Ok(outcome.data.unwrap_or(Value::Null))
                        } else {
                            Err(outcome
                                .error
                                .unwrap_or_else(|| RiskError::internal("retry chain lost its error")))
                        }
                    })
                    .await;

                let response = match guarded {
                    Ok(data) => PipelineResponse {
                        request_id: request_id.clone(),
                        success: true,
                        data: Some(data),
                        fallback: false,
                        source: "primary".to_string(),
                        confidence: 1.0,
                        recovery_used: false,
                        message: None,
                        error_kind: None,
                    },
                    Err(breaker_err) => {
                        let mut err: RiskError = breaker_err.into();
                        match recovery.attempt(&err, &ctx).await {
                            Some(RecoveryAction::Recovered {
                                data,
                                fallback_used,
                                source,
                            }) => PipelineResponse {
                                request_id: request_id.clone(),
                                success: true,
                                data: Some(data),
                                fallback: true,
                                source: source.to_string(),
                                confidence: if fallback_used { 0.4 } else { 0.8 },
                                recovery_used: true,
                                message: None,
                                error_kind: Some(err.kind),
                            },
                            Some(RecoveryAction::RetryAfter { delay }) => {
                                err.retry_after = Some(delay);
                                let degraded = degradation.handle(&err, &ctx);
                                degraded_to_response(&request_id, &err, degraded)
                            }
                            None => {
                                let degraded = degradation.handle(&err, &ctx);
                                degraded_to_response(&request_id, &err, degraded)
                            }
                        }
                    }
                };
                Ok(response)
            }
        };

        let response = match self.dedup.register(fingerprint.clone(), work).await {
            Ok(mut response) => {
                // Attached callers share the leader's response body but keep
                // their own correlation id.
                response.request_id = request_id.clone();
                response
            }
            Err(err) => {
                self.logs.error(
                    "pipeline",
                    Some(&request_id),
                    &format!("deduplicated request was abandoned: {}", err.message),
                );
                let degraded = self
                    .degradation
                    .handle(&RiskError::internal(err.message.clone()), &RecoveryContext {
                        request_id: request_id.clone(),
                        cache_key: fingerprint.clone(),
                        identifiers: request.identifiers.clone(),
                    });
                degraded_to_response(&request_id, &err, degraded)
            }
        };

        let cache_hit = response.success && (response.source == "cache" || had_cached);
        self.finish(&request_id, started, &response, response.error_kind, cache_hit);
        response
    }

    fn degraded(
        &self,
        request_id: &str,
        err: &RiskError,
        identifiers: &RequestIdentifiers,
        cache_key: &str,
    ) -> PipelineResponse {
        let degraded = self.degradation.handle(
            err,
            &RecoveryContext {
                request_id: request_id.to_string(),
                cache_key: cache_key.to_string(),
                identifiers: identifiers.clone(),
            },
        );
        degraded_to_response(request_id, err, degraded)
    }

    fn finish(
        &self,
        request_id: &str,
        started: Instant,
        response: &PipelineResponse,
        error_kind: Option<ErrorKind>,
        cache_hit: bool,
    ) {
        let duration = started.elapsed();
        let status = status_code(response, error_kind);
        self.metrics
            .record_api_call(&self.endpoint, duration, status, cache_hit, error_kind);
        self.logs.info(
            "pipeline",
            Some(request_id),
            &format!(
                "assessment finished: source={} success={} in {}ms",
                response.source,
                response.success,
                duration.as_millis()
            ),
        );
    }

    /// True when the store answers its health probe and the breaker is
    /// passing traffic.
    pub async fn health(&self) -> bool {
        self.breaker.is_healthy().await && self.optimizer.health_check().await.is_ok()
    }

    /// The query optimizer (for stats and slow-query hooks).
    pub fn optimizer(&self) -> &Arc<QueryOptimizer> {
        &self.optimizer
    }

    /// The response cache.
    pub fn cache(&self) -> &Arc<IntelligentCache<Value>> {
        &self.cache
    }

    /// The deduplicator.
    pub fn dedup(&self) -> &Arc<RequestDeduplicator<PipelineResponse>> {
        &self.dedup
    }

    /// The circuit breaker.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// The log ring.
    pub fn logs(&self) -> &Arc<LogBuffer> {
        &self.logs
    }

    /// The performance metrics collector.
    pub fn metrics(&self) -> &Arc<PerformanceMetrics> {
        &self.metrics
    }

    /// The monitoring dashboard.
    pub fn dashboard(&self) -> &Arc<MonitoringDashboard> {
        &self.dashboard
    }

    /// Stops every background task and flushes breaker persistence.
    pub async fn shutdown(&self) {
        self.dedup.destroy();
        self.cache.destroy();
        self.metrics.destroy();
        self.breaker.destroy().await;
        self.logs.info("pipeline", None, "pipeline shut down");
    }
}

/// Primary-path payload for a looked-up (or brand new) customer.
fn assessment_payload(customer: Option<CustomerRecord>) -> Value {
    match customer {
        Some(c) => json!({
            "customerId": c.id,
            "riskTier": c.risk_tier,
            "riskScore": c.risk_score,
            "totalOrders": c.total_orders,
            "failedDeliveries": c.failed_deliveries,
            "isNewCustomer": false,
        }),
        None => json!({
            "riskTier": "new",
            "riskScore": 0.0,
            "totalOrders": 0,
            "failedDeliveries": 0,
            "isNewCustomer": true,
        }),
    }
}

fn degraded_to_response(
    request_id: &str,
    err: &RiskError,
    degraded: riskgate_recovery::DegradedResponse,
) -> PipelineResponse {
    let message = if degraded.success {
        None
    } else if err.kind == ErrorKind::Validation {
        Some(err.message.clone())
    } else {
        Some("service temporarily unavailable, please retry".to_string())
    };
    PipelineResponse {
        request_id: request_id.to_string(),
        success: degraded.success,
        data: degraded.data,
        fallback: degraded.fallback,
        source: degraded.source.as_str().to_string(),
        confidence: degraded.confidence,
        recovery_used: false,
        message,
        error_kind: Some(err.kind),
    }
}

fn status_code(response: &PipelineResponse, error_kind: Option<ErrorKind>) -> u16 {
    if response.success {
        return 200;
    }
    match error_kind {
        Some(ErrorKind::Validation) => 400,
        Some(ErrorKind::Authentication) => 401,
        Some(ErrorKind::Authorization) => 403,
        Some(ErrorKind::NotFound) => 404,
        Some(ErrorKind::CircuitBreaker) => 503,
        Some(ErrorKind::Timeout) => 504,
        _ => 500,
    }
}
