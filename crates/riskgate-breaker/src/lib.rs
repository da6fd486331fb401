//! Enhanced circuit breaker for the riskgate pipeline.
//!
//! The breaker guards the data-store path with three independent trip
//! conditions: a raw in-window failure count, an in-window failure rate, and
//! an in-window slow-call rate. Once OPEN it rejects calls with a typed
//! [`BreakerError::Open`] carrying the time until the next probe; after the
//! recovery timeout the first call transitions the circuit to HALF_OPEN and a
//! bounded number of probes decide between closing and re-opening.
//!
//! Every call runs under the configured request timeout; a timeout counts as
//! a failure and as its own outcome category.
//!
//! # Example
//!
//! ```
//! use riskgate_breaker::{BreakerConfig, CircuitBreaker, CircuitState};
//! use riskgate_core::RiskError;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let breaker = CircuitBreaker::new(
//!     BreakerConfig::builder()
//!         .failure_threshold(3)
//!         .recovery_timeout(Duration::from_millis(500))
//!         .name("store")
//!         .build(),
//! );
//!
//! let result = breaker
//!     .execute(async { Ok::<_, RiskError>("customer profile") })
//!     .await;
//! assert!(result.is_ok());
//! assert_eq!(breaker.state().await, CircuitState::Closed);
//! # }
//! ```

mod circuit;
mod config;
mod error;
mod events;
#[cfg(feature = "persistence")]
mod persistence;

pub use circuit::{BreakerMetrics, CallOutcome, CallTotals, CircuitState, StateTransition};
pub use config::{BreakerConfig, BreakerConfigBuilder, BreakerConfigPatch};
pub use error::BreakerError;
pub use events::BreakerEvent;

use crate::circuit::{Acquire, Circuit};
use riskgate_core::RiskError;
use std::future::Future;
use std::sync::atomic::AtomicU8;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[cfg(feature = "metrics")]
use metrics::{counter, histogram};

/// Circuit breaker guarding an unreliable dependency.
pub struct CircuitBreaker {
    circuit: Arc<Mutex<Circuit>>,
    state_atomic: Arc<AtomicU8>,
    config: parking_lot::RwLock<Arc<BreakerConfig>>,
}

impl CircuitBreaker {
    /// Creates a breaker. With the `persistence` feature enabled and a
    /// persistence path configured, previously-saved state is restored;
    /// anything undecodable or version-mismatched starts CLOSED.
    pub fn new(config: BreakerConfig) -> Self {
        let state_atomic = Arc::new(AtomicU8::new(CircuitState::Closed as u8));
        let circuit = Circuit::new(Arc::clone(&state_atomic));

        #[cfg(feature = "persistence")]
        let circuit = {
            let mut circuit = circuit;
            if let Some(path) = &config.persistence_path {
                if let Some(restored) = persistence::load(path, config.config_version) {
                    tracing::info!(
                        breaker = %config.name,
                        state = restored.state.as_str(),
                        "restored persisted breaker state"
                    );
                    circuit.restore(
                        restored.state,
                        restored.opened_ago,
                        restored.trips,
                        restored.totals,
                        Instant::now(),
                    );
                }
            }
            circuit
        };

        Self {
            circuit: Arc::new(Mutex::new(circuit)),
            state_atomic,
            config: parking_lot::RwLock::new(Arc::new(config)),
        }
    }

    /// Runs `work` under the breaker with the configured request timeout.
    pub async fn execute<T, F>(&self, work: F) -> Result<T, BreakerError>
    where
        F: Future<Output = Result<T, RiskError>>,
    {
        self.execute_labeled("call", work).await
    }

    /// Like [`execute`](Self::execute), with a label for tracing and metrics.
    pub async fn execute_labeled<T, F>(&self, label: &str, work: F) -> Result<T, BreakerError>
    where
        F: Future<Output = Result<T, RiskError>>,
    {
        let config = self.current_config();

        let acquire = {
            let mut circuit = self.circuit.lock().await;
            circuit.try_acquire(&config, Instant::now())
        };
        if let Acquire::Rejected { retry_after } = acquire {
            tracing::debug!(breaker = %config.name, label, "call rejected, circuit open");
            return Err(BreakerError::Open { retry_after });
        }

        let start = Instant::now();
        let outcome = tokio::time::timeout(config.request_timeout, work).await;
        let duration = start.elapsed();

        #[cfg(feature = "metrics")]
        histogram!("breaker_call_duration_seconds", "breaker" => config.name.clone(), "label" => label.to_string())
            .record(duration.as_secs_f64());

        match outcome {
            Ok(Ok(value)) => {
                let mut circuit = self.circuit.lock().await;
                circuit.record_success(&config, duration, Instant::now());
                #[cfg(feature = "metrics")]
                counter!("breaker_calls_total", "breaker" => config.name.clone(), "outcome" => "success")
                    .increment(1);
                Ok(value)
            }
            Ok(Err(err)) => {
                let mut circuit = self.circuit.lock().await;
                circuit.record_failure(&config, duration, false, Instant::now());
                #[cfg(feature = "metrics")]
                counter!("breaker_calls_total", "breaker" => config.name.clone(), "outcome" => "failure")
                    .increment(1);
                Err(BreakerError::Inner(err))
            }
            Err(_elapsed) => {
                let mut circuit = self.circuit.lock().await;
                circuit.record_failure(&config, duration, true, Instant::now());
                #[cfg(feature = "metrics")]
                counter!("breaker_calls_total", "breaker" => config.name.clone(), "outcome" => "timeout")
                    .increment(1);
                Err(BreakerError::Timeout {
                    timeout: config.request_timeout,
                })
            }
        }
    }

    /// Current state.
    pub async fn state(&self) -> CircuitState {
        self.circuit.lock().await.state()
    }

    /// Current state without async context, from an atomic mirror.
    pub fn state_sync(&self) -> CircuitState {
        CircuitState::from_u8(self.state_atomic.load(std::sync::atomic::Ordering::Acquire))
    }

    /// True when the breaker is passing traffic; in HALF_OPEN, true only once
    /// a probe has succeeded since entering the state.
    pub async fn is_healthy(&self) -> bool {
        self.circuit.lock().await.is_healthy()
    }

    /// Point-in-time metrics snapshot.
    pub async fn metrics(&self) -> BreakerMetrics {
        let config = self.current_config();
        self.circuit.lock().await.metrics(&config, Instant::now())
    }

    /// Operator override; never increments the trip counter.
    pub async fn force_state(&self, state: CircuitState, reason: &str) {
        let config = self.current_config();
        self.circuit
            .lock()
            .await
            .force_state(state, &config, reason, Instant::now());
    }

    /// Returns to CLOSED and clears the rolling window.
    pub async fn reset(&self) {
        let config = self.current_config();
        self.circuit.lock().await.reset(&config, Instant::now());
    }

    /// Time until the breaker would permit another call, when it currently
    /// would not.
    pub async fn time_until_next_attempt(&self) -> Option<Duration> {
        let config = self.current_config();
        self.circuit
            .lock()
            .await
            .time_until_next_attempt(&config, Instant::now())
    }

    /// Applies a partial configuration update over the current snapshot.
    pub fn update_config(&self, patch: &BreakerConfigPatch) {
        let mut config = self.config.write();
        *config = Arc::new(config.merge(patch));
    }

    /// Flushes persisted state (when enabled). Call on graceful shutdown.
    pub async fn destroy(&self) {
        #[cfg(feature = "persistence")]
        {
            let config = self.current_config();
            if let Some(path) = &config.persistence_path {
                let (state, opened_ago, trips, totals) =
                    self.circuit.lock().await.snapshot(Instant::now());
                if let Err(err) =
                    persistence::save(path, config.config_version, state, opened_ago, trips, totals)
                {
                    tracing::warn!(breaker = %config.name, error = %err, "failed to persist breaker state");
                }
            }
        }
    }

    fn current_config(&self) -> Arc<BreakerConfig> {
        Arc::clone(&self.config.read())
    }
}
