//! Retry, recovery, and graceful degradation for the riskgate pipeline.
//!
//! Three cooperating layers turn transient failures into degraded-but-useful
//! responses:
//!
//! 1. [`RetryManager`] re-attempts retryable errors under a policy
//!    (exponential backoff, ±10% jitter, an overall time budget).
//! 2. [`RecoveryStrategyManager`] gets one shot when retries exhaust: probe
//!    the cache, synthesize fallback data, or recommend a later retry.
//! 3. [`DegradationHandler`] is the catch-all that always produces a
//!    well-formed response, down to an emergency fallback when everything
//!    else (including itself) misbehaves.
//!
//! # Example
//!
//! ```
//! use riskgate_recovery::{
//!     RecoveryContext, RecoveryStrategyManager, RetryManager, RetryPolicy,
//!     StaticFallbackProvider,
//! };
//! use riskgate_core::RiskError;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let recovery = Arc::new(RecoveryStrategyManager::with_defaults(
//!     None,
//!     Arc::new(StaticFallbackProvider),
//! ));
//! let retry = RetryManager::new(RetryPolicy::default(), recovery);
//!
//! let outcome = retry
//!     .execute_with_retry(&RecoveryContext::default(), None, || async {
//!         Err::<serde_json::Value, _>(RiskError::database("store down"))
//!     })
//!     .await;
//!
//! // The database strategy synthesized a new-customer profile.
//! assert!(outcome.success);
//! assert!(outcome.recovery_used);
//! # }
//! ```

mod degradation;
mod events;
mod fallback;
mod retry;
mod strategies;

pub use degradation::{DegradationHandler, DegradationSource, DegradedResponse};
pub use events::RecoveryEvent;
pub use fallback::{FallbackProvider, StaticFallbackProvider};
pub use retry::{AttemptRecord, RetryManager, RetryOutcome, RetryPolicy};
pub use strategies::{
    CacheProbe, CircuitBreakerErrorRecovery, DatabaseErrorRecovery, NetworkErrorRecovery,
    RecoveryAction, RecoveryStrategy, RecoveryStrategyManager, TimeoutErrorRecovery,
};

use riskgate_core::RequestIdentifiers;

/// Request context threaded through retry, recovery, and degradation.
#[derive(Debug, Clone, Default)]
pub struct RecoveryContext {
    /// Correlation id for logs and metadata.
    pub request_id: String,
    /// The request fingerprint; recovery probes the cache with it.
    pub cache_key: String,
    /// Raw identifiers, for fallback synthesis. Never serialized verbatim.
    pub identifiers: RequestIdentifiers,
}
