//! Recovery strategies tried after retries exhaust.
//!
//! The manager walks its registry in order; the first strategy whose
//! predicate matches the error and that produces an action wins. A strategy
//! that itself errors is skipped, never fatal.

use crate::fallback::FallbackProvider;
use crate::RecoveryContext;
use futures::future::BoxFuture;
use riskgate_core::{ErrorKind, RiskError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// A read-only view into the response cache, for cache-first recovery.
pub trait CacheProbe: Send + Sync {
    /// Returns the cached payload for `key` when present and live.
    fn probe(&self, key: &str) -> Option<Value>;
}

/// What a strategy decided.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// A usable payload was produced; the request can succeed degraded.
    Recovered {
        data: Value,
        /// True when the payload was synthesized rather than cached.
        fallback_used: bool,
        source: &'static str,
    },
    /// No payload, but the caller should retry after this delay.
    RetryAfter { delay: Duration },
}

/// A single recovery strategy.
pub trait RecoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy applies to the error.
    fn handles(&self, error: &RiskError) -> bool;

    /// Attempts recovery. `Ok(None)` means the strategy passes; an `Err`
    /// skips to the next strategy.
    fn recover<'a>(
        &'a self,
        error: &'a RiskError,
        ctx: &'a RecoveryContext,
    ) -> BoxFuture<'a, Result<Option<RecoveryAction>, RiskError>>;
}

/// Ordered strategy registry.
pub struct RecoveryStrategyManager {
    strategies: Vec<Arc<dyn RecoveryStrategy>>,
}

impl RecoveryStrategyManager {
    /// An empty registry. Usually [`with_defaults`](Self::with_defaults) is
    /// what you want.
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Registry with the four built-in strategies, in precedence order.
    pub fn with_defaults(
        cache: Option<Arc<dyn CacheProbe>>,
        provider: Arc<dyn FallbackProvider>,
    ) -> Self {
        let mut manager = Self::new();
        manager.register(DatabaseErrorRecovery {
            cache: cache.clone(),
            provider: Arc::clone(&provider),
        });
        manager.register(CircuitBreakerErrorRecovery {
            cache,
            provider,
        });
        manager.register(TimeoutErrorRecovery);
        manager.register(NetworkErrorRecovery);
        manager
    }

    /// Appends a strategy to the registry.
    pub fn register<S: RecoveryStrategy + 'static>(&mut self, strategy: S) {
        self.strategies.push(Arc::new(strategy));
    }

    /// Runs the first matching strategy that produces an action.
    pub async fn attempt(
        &self,
        error: &RiskError,
        ctx: &RecoveryContext,
    ) -> Option<RecoveryAction> {
        for strategy in &self.strategies {
            if !strategy.handles(error) {
                continue;
            }
            match strategy.recover(error, ctx).await {
                Ok(Some(action)) => {
                    tracing::debug!(
                        strategy = strategy.name(),
                        error_code = error.code,
                        "recovery strategy produced an action"
                    );
                    return Some(action);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        strategy = strategy.name(),
                        error = %err,
                        "recovery strategy failed, trying next"
                    );
                }
            }
        }
        None
    }

    /// Number of registered strategies.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl Default for RecoveryStrategyManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Database outages: serve the cached assessment when one exists, otherwise
/// a new-customer profile.
pub struct DatabaseErrorRecovery {
    pub cache: Option<Arc<dyn CacheProbe>>,
    pub provider: Arc<dyn FallbackProvider>,
}

impl RecoveryStrategy for DatabaseErrorRecovery {
    fn name(&self) -> &'static str {
        "database_error_recovery"
    }

    fn handles(&self, error: &RiskError) -> bool {
        error.kind == ErrorKind::Database
    }

    fn recover<'a>(
        &'a self,
        _error: &'a RiskError,
        ctx: &'a RecoveryContext,
    ) -> BoxFuture<'a, Result<Option<RecoveryAction>, RiskError>> {
        Box::pin(async move {
            if let Some(cache) = &self.cache {
                if let Some(data) = cache.probe(&ctx.cache_key) {
                    return Ok(Some(RecoveryAction::Recovered {
                        data,
                        fallback_used: false,
                        source: "cache",
                    }));
                }
            }
            Ok(Some(RecoveryAction::Recovered {
                data: self.provider.new_customer_profile(),
                fallback_used: true,
                source: "fallback_generator",
            }))
        })
    }
}

/// Open circuit: never retry locally; cached data first, synthesized
/// otherwise. The breaker's own `retry_after` rides along on the error.
pub struct CircuitBreakerErrorRecovery {
    pub cache: Option<Arc<dyn CacheProbe>>,
    pub provider: Arc<dyn FallbackProvider>,
}

impl RecoveryStrategy for CircuitBreakerErrorRecovery {
    fn name(&self) -> &'static str {
        "circuit_breaker_error_recovery"
    }

    fn handles(&self, error: &RiskError) -> bool {
        error.kind == ErrorKind::CircuitBreaker
    }

    fn recover<'a>(
        &'a self,
        _error: &'a RiskError,
        ctx: &'a RecoveryContext,
    ) -> BoxFuture<'a, Result<Option<RecoveryAction>, RiskError>> {
        Box::pin(async move {
            if let Some(cache) = &self.cache {
                if let Some(data) = cache.probe(&ctx.cache_key) {
                    return Ok(Some(RecoveryAction::Recovered {
                        data,
                        fallback_used: false,
                        source: "cache",
                    }));
                }
            }
            Ok(Some(RecoveryAction::Recovered {
                data: self.provider.customer_fallback(&ctx.identifiers),
                fallback_used: true,
                source: "fallback_generator",
            }))
        })
    }
}

/// Timeouts: no synthesized data, just a retry recommendation.
pub struct TimeoutErrorRecovery;

impl RecoveryStrategy for TimeoutErrorRecovery {
    fn name(&self) -> &'static str {
        "timeout_error_recovery"
    }

    fn handles(&self, error: &RiskError) -> bool {
        error.kind == ErrorKind::Timeout
    }

    fn recover<'a>(
        &'a self,
        error: &'a RiskError,
        _ctx: &'a RecoveryContext,
    ) -> BoxFuture<'a, Result<Option<RecoveryAction>, RiskError>> {
        Box::pin(async move {
            Ok(Some(RecoveryAction::RetryAfter {
                delay: error.retry_after.unwrap_or(Duration::from_secs(1)),
            }))
        })
    }
}

/// Network failures: no synthesized data, just a retry recommendation.
pub struct NetworkErrorRecovery;

impl RecoveryStrategy for NetworkErrorRecovery {
    fn name(&self) -> &'static str {
        "network_error_recovery"
    }

    fn handles(&self, error: &RiskError) -> bool {
        error.kind == ErrorKind::Network
    }

    fn recover<'a>(
        &'a self,
        error: &'a RiskError,
        _ctx: &'a RecoveryContext,
    ) -> BoxFuture<'a, Result<Option<RecoveryAction>, RiskError>> {
        Box::pin(async move {
            Ok(Some(RecoveryAction::RetryAfter {
                delay: error.retry_after.unwrap_or(Duration::from_secs(2)),
            }))
        })
    }
}
