//! Last line of defense: choose cached data, synthesized data, or a minimal
//! response. This handler never returns an error.

use crate::events::RecoveryEvent;
use crate::fallback::FallbackProvider;
use crate::strategies::CacheProbe;
use crate::RecoveryContext;
use riskgate_core::{ErrorKind, EventListeners, RiskError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Where a degraded response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradationSource {
    Cache,
    FallbackGenerator,
    MinimalResponse,
    EmergencyFallback,
}

impl DegradationSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DegradationSource::Cache => "cache",
            DegradationSource::FallbackGenerator => "fallback_generator",
            DegradationSource::MinimalResponse => "minimal_response",
            DegradationSource::EmergencyFallback => "emergency_fallback",
        }
    }
}

/// A degraded response. `success = false` only for minimal and emergency
/// responses; cached and synthesized data count as degraded successes.
#[derive(Debug, Clone, PartialEq)]
pub struct DegradedResponse {
    pub success: bool,
    pub data: Option<Value>,
    pub fallback: bool,
    pub source: DegradationSource,
    pub confidence: f64,
    pub metadata: BTreeMap<String, String>,
}

/// Chooses the degradation path for a failed request.
pub struct DegradationHandler {
    cache: Option<Arc<dyn CacheProbe>>,
    provider: Arc<dyn FallbackProvider>,
    event_listeners: EventListeners<RecoveryEvent>,
    name: String,
}

impl DegradationHandler {
    pub fn new(cache: Option<Arc<dyn CacheProbe>>, provider: Arc<dyn FallbackProvider>) -> Self {
        Self {
            cache,
            provider,
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Instance name for observability.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers an event listener.
    pub fn add_listener<L>(&mut self, listener: L)
    where
        L: riskgate_core::EventListener<RecoveryEvent> + 'static,
    {
        self.event_listeners.add(listener);
    }

    /// Maps the error to a degraded response. Any internal failure collapses
    /// into the emergency fallback; this function cannot fail.
    pub fn handle(&self, error: &RiskError, ctx: &RecoveryContext) -> DegradedResponse {
        let response = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.select(error, ctx)
        }))
        .unwrap_or_else(|_| {
            tracing::error!(
                degradation = %self.name,
                error_code = error.code,
                "degradation handler panicked, serving emergency fallback"
            );
            self.emergency(error, ctx)
        });

        self.event_listeners.emit(&RecoveryEvent::Degraded {
            component: self.name.clone(),
            timestamp: Instant::now(),
            source: response.source.as_str(),
        });
        response
    }

    fn select(&self, error: &RiskError, ctx: &RecoveryContext) -> DegradedResponse {
        match error.kind {
            ErrorKind::CircuitBreaker | ErrorKind::Database => {
                if let Some(cache) = &self.cache {
                    if let Some(data) = cache.probe(&ctx.cache_key) {
                        return self.build(true, Some(data), DegradationSource::Cache, 0.8, error, ctx);
                    }
                }
                let data = self.provider.customer_fallback(&ctx.identifiers);
                self.build(
                    true,
                    Some(data),
                    DegradationSource::FallbackGenerator,
                    0.4,
                    error,
                    ctx,
                )
            }
            ErrorKind::Timeout | ErrorKind::Network | ErrorKind::RateLimit => {
                let data = self.provider.default_risk_assessment();
                self.build(
                    true,
                    Some(data),
                    DegradationSource::FallbackGenerator,
                    0.4,
                    error,
                    ctx,
                )
            }
            ErrorKind::Validation
            | ErrorKind::Authentication
            | ErrorKind::Authorization
            | ErrorKind::NotFound => self.build(
                false,
                None,
                DegradationSource::MinimalResponse,
                0.0,
                error,
                ctx,
            ),
            ErrorKind::Internal => self.emergency(error, ctx),
        }
    }

    fn emergency(&self, error: &RiskError, ctx: &RecoveryContext) -> DegradedResponse {
        self.build(
            false,
            None,
            DegradationSource::EmergencyFallback,
            0.0,
            error,
            ctx,
        )
    }

    fn build(
        &self,
        success: bool,
        data: Option<Value>,
        source: DegradationSource,
        confidence: f64,
        error: &RiskError,
        ctx: &RecoveryContext,
    ) -> DegradedResponse {
        let mut metadata = BTreeMap::new();
        metadata.insert("errorType".to_string(), error.code.to_string());
        metadata.insert("source".to_string(), source.as_str().to_string());
        if !ctx.request_id.is_empty() {
            metadata.insert("requestId".to_string(), ctx.request_id.clone());
        }
        DegradedResponse {
            success,
            data,
            fallback: true,
            source,
            confidence,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::StaticFallbackProvider;
    use serde_json::json;

    struct MapProbe(Value);

    impl CacheProbe for MapProbe {
        fn probe(&self, key: &str) -> Option<Value> {
            (key == "hit").then(|| self.0.clone())
        }
    }

    fn ctx(cache_key: &str) -> RecoveryContext {
        RecoveryContext {
            request_id: "req-1".into(),
            cache_key: cache_key.to_string(),
            ..Default::default()
        }
    }

    fn handler(with_cache: bool) -> DegradationHandler {
        let cache: Option<Arc<dyn CacheProbe>> = with_cache
            .then(|| Arc::new(MapProbe(json!({"riskTier": "low"}))) as Arc<dyn CacheProbe>);
        DegradationHandler::new(cache, Arc::new(StaticFallbackProvider))
    }

    #[test]
    fn database_error_with_cache_hit() {
        let response = handler(true).handle(&RiskError::database("down"), &ctx("hit"));
        assert!(response.success);
        assert!(response.fallback);
        assert_eq!(response.source, DegradationSource::Cache);
        assert_eq!(response.confidence, 0.8);
    }

    #[test]
    fn database_error_without_cache_uses_generator() {
        let response = handler(true).handle(&RiskError::database("down"), &ctx("miss"));
        assert!(response.success);
        assert_eq!(response.source, DegradationSource::FallbackGenerator);
        assert_eq!(response.confidence, 0.4);
        assert_eq!(response.data.unwrap()["riskTier"], "new");
    }

    #[test]
    fn timeout_goes_straight_to_generator() {
        let response = handler(true).handle(&RiskError::timeout("deadline"), &ctx("hit"));
        assert_eq!(response.source, DegradationSource::FallbackGenerator);
        assert_eq!(response.confidence, 0.4);
    }

    #[test]
    fn validation_error_is_minimal() {
        let response = handler(true).handle(&RiskError::validation("bad phone"), &ctx("hit"));
        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(response.source, DegradationSource::MinimalResponse);
        assert_eq!(response.confidence, 0.0);
    }

    #[test]
    fn internal_errors_get_the_emergency_fallback() {
        let response = handler(false).handle(&RiskError::internal("bug"), &ctx("any"));
        assert!(!response.success);
        assert_eq!(response.source, DegradationSource::EmergencyFallback);
        assert_eq!(response.confidence, 0.0);
    }

    #[test]
    fn panicking_provider_never_escapes() {
        struct Panicky;
        impl FallbackProvider for Panicky {
            fn new_customer_profile(&self) -> Value {
                panic!("provider bug")
            }
            fn customer_fallback(&self, _: &riskgate_core::RequestIdentifiers) -> Value {
                panic!("provider bug")
            }
            fn order_fallback(&self, _: &str) -> Value {
                panic!("provider bug")
            }
            fn default_risk_assessment(&self) -> Value {
                panic!("provider bug")
            }
        }

        let handler = DegradationHandler::new(None, Arc::new(Panicky));
        let response = handler.handle(&RiskError::database("down"), &ctx("any"));
        assert!(!response.success);
        assert_eq!(response.source, DegradationSource::EmergencyFallback);
    }

    #[test]
    fn metadata_carries_error_type_and_request_id() {
        let response = handler(false).handle(&RiskError::network("unreachable"), &ctx("k"));
        assert_eq!(response.metadata["errorType"], "NETWORK_ERROR");
        assert_eq!(response.metadata["requestId"], "req-1");
    }
}
