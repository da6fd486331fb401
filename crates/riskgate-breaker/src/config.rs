//! Configuration for the circuit breaker, including partial runtime updates.

use crate::circuit::CircuitState;
use crate::events::BreakerEvent;
use riskgate_core::{EventListeners, FnListener};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for [`CircuitBreaker`](crate::CircuitBreaker).
#[derive(Clone)]
pub struct BreakerConfig {
    pub(crate) failure_threshold: usize,
    pub(crate) failure_rate_threshold: f64,
    pub(crate) min_samples: usize,
    pub(crate) recovery_timeout: Duration,
    pub(crate) half_open_max_calls: usize,
    pub(crate) success_threshold: usize,
    pub(crate) monitoring_window: Duration,
    pub(crate) request_timeout: Duration,
    pub(crate) slow_call_threshold: Option<Duration>,
    pub(crate) slow_call_rate_threshold: f64,
    pub(crate) metrics_retention: Duration,
    pub(crate) persistence_path: Option<PathBuf>,
    pub(crate) config_version: u32,
    pub(crate) event_listeners: EventListeners<BreakerEvent>,
    pub(crate) name: String,
}

impl BreakerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::new()
    }

    /// Returns a copy with the patch's set fields merged over this snapshot.
    /// Listeners, name, and persistence settings are never patched.
    pub fn merge(&self, patch: &BreakerConfigPatch) -> Self {
        let mut next = self.clone();
        if let Some(v) = patch.failure_threshold {
            next.failure_threshold = v;
        }
        if let Some(v) = patch.failure_rate_threshold {
            next.failure_rate_threshold = v;
        }
        if let Some(v) = patch.min_samples {
            next.min_samples = v;
        }
        if let Some(v) = patch.recovery_timeout {
            next.recovery_timeout = v;
        }
        if let Some(v) = patch.half_open_max_calls {
            next.half_open_max_calls = v;
        }
        if let Some(v) = patch.success_threshold {
            next.success_threshold = v;
        }
        if let Some(v) = patch.monitoring_window {
            next.monitoring_window = v;
        }
        if let Some(v) = patch.request_timeout {
            next.request_timeout = v;
        }
        if let Some(v) = patch.slow_call_threshold {
            next.slow_call_threshold = Some(v);
        }
        if let Some(v) = patch.slow_call_rate_threshold {
            next.slow_call_rate_threshold = v;
        }
        if let Some(v) = patch.metrics_retention {
            next.metrics_retention = v;
        }
        next
    }
}

/// A partial configuration update. Unset fields keep their previous values.
#[derive(Debug, Clone, Default)]
pub struct BreakerConfigPatch {
    pub failure_threshold: Option<usize>,
    pub failure_rate_threshold: Option<f64>,
    pub min_samples: Option<usize>,
    pub recovery_timeout: Option<Duration>,
    pub half_open_max_calls: Option<usize>,
    pub success_threshold: Option<usize>,
    pub monitoring_window: Option<Duration>,
    pub request_timeout: Option<Duration>,
    pub slow_call_threshold: Option<Duration>,
    pub slow_call_rate_threshold: Option<f64>,
    pub metrics_retention: Option<Duration>,
}

/// Builder for [`BreakerConfig`].
pub struct BreakerConfigBuilder {
    failure_threshold: usize,
    failure_rate_threshold: f64,
    min_samples: usize,
    recovery_timeout: Duration,
    half_open_max_calls: usize,
    success_threshold: usize,
    monitoring_window: Duration,
    request_timeout: Duration,
    slow_call_threshold: Option<Duration>,
    slow_call_rate_threshold: f64,
    metrics_retention: Duration,
    persistence_path: Option<PathBuf>,
    config_version: u32,
    event_listeners: EventListeners<BreakerEvent>,
    name: String,
}

impl BreakerConfigBuilder {
    /// Creates a builder with default values.
    pub fn new() -> Self {
        Self {
            failure_threshold: 5,
            failure_rate_threshold: 0.5,
            min_samples: 10,
            recovery_timeout: Duration::from_secs(30),
            half_open_max_calls: 3,
            success_threshold: 2,
            monitoring_window: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
            slow_call_threshold: None,
            slow_call_rate_threshold: 1.0,
            metrics_retention: Duration::from_secs(300),
            persistence_path: None,
            config_version: 1,
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Raw in-window failure count at which the circuit opens.
    ///
    /// Default: 5
    pub fn failure_threshold(mut self, count: usize) -> Self {
        self.failure_threshold = count;
        self
    }

    /// Fractional in-window failure rate at which the circuit opens, once at
    /// least `min_samples` calls have been observed.
    ///
    /// Default: 0.5
    pub fn failure_rate_threshold(mut self, rate: f64) -> Self {
        self.failure_rate_threshold = rate;
        self
    }

    /// Minimum in-window calls before rate thresholds are evaluated.
    ///
    /// Default: 10
    pub fn min_samples(mut self, count: usize) -> Self {
        self.min_samples = count;
        self
    }

    /// How long the circuit stays OPEN before permitting a probe.
    ///
    /// Default: 30 seconds
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Maximum probe calls permitted while HALF_OPEN.
    ///
    /// Default: 3
    pub fn half_open_max_calls(mut self, count: usize) -> Self {
        self.half_open_max_calls = count;
        self
    }

    /// Probe successes required to close the circuit from HALF_OPEN.
    ///
    /// Default: 2
    pub fn success_threshold(mut self, count: usize) -> Self {
        self.success_threshold = count;
        self
    }

    /// Rolling window over which rates and counts are computed.
    ///
    /// Default: 60 seconds
    pub fn monitoring_window(mut self, window: Duration) -> Self {
        self.monitoring_window = window;
        self
    }

    /// Per-call timeout enforced around the wrapped work.
    ///
    /// Default: 10 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Duration at which a completed call counts as slow. Slow-call tripping
    /// is disabled until this is set.
    ///
    /// Default: unset
    pub fn slow_call_threshold(mut self, threshold: Duration) -> Self {
        self.slow_call_threshold = Some(threshold);
        self
    }

    /// Fractional in-window slow-call rate at which the circuit opens.
    ///
    /// Default: 1.0
    pub fn slow_call_rate_threshold(mut self, rate: f64) -> Self {
        self.slow_call_rate_threshold = rate;
        self
    }

    /// Hard retention cap on call records, independent of the monitoring
    /// window.
    ///
    /// Default: 5 minutes
    pub fn metrics_retention(mut self, retention: Duration) -> Self {
        self.metrics_retention = retention;
        self
    }

    /// Enables state persistence to the given file. State is written on
    /// `destroy()` and loaded at construction.
    ///
    /// Default: disabled
    pub fn persistence_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.persistence_path = Some(path.into());
        self
    }

    /// Version stamp written into persisted state; a mismatch at load time
    /// discards the file and starts CLOSED.
    ///
    /// Default: 1
    pub fn config_version(mut self, version: u32) -> Self {
        self.config_version = version;
        self
    }

    /// Human-readable instance name for observability.
    ///
    /// Default: `<unnamed>`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register a callback for state transitions.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &BreakerEvent| {
                if let BreakerEvent::StateTransition { from, to, .. } = event {
                    f(*from, *to);
                }
            }));
        self
    }

    /// Register a callback for rejected calls.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &BreakerEvent| {
                if matches!(event, BreakerEvent::CallRejected { .. }) {
                    f();
                }
            }));
        self
    }

    /// Register a callback for slow calls.
    pub fn on_slow_call<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &BreakerEvent| {
                if let BreakerEvent::SlowCallDetected { duration, .. } = event {
                    f(*duration);
                }
            }));
        self
    }

    /// Builds the configuration.
    ///
    /// # Panics
    ///
    /// Panics if `success_threshold` exceeds `half_open_max_calls` (the
    /// circuit could never close) or a rate threshold is negative.
    pub fn build(self) -> BreakerConfig {
        assert!(
            self.success_threshold <= self.half_open_max_calls,
            "success_threshold must not exceed half_open_max_calls"
        );
        assert!(
            self.failure_rate_threshold >= 0.0,
            "failure_rate_threshold must not be negative"
        );
        assert!(
            self.slow_call_rate_threshold >= 0.0,
            "slow_call_rate_threshold must not be negative"
        );
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            failure_rate_threshold: self.failure_rate_threshold,
            min_samples: self.min_samples,
            recovery_timeout: self.recovery_timeout,
            half_open_max_calls: self.half_open_max_calls,
            success_threshold: self.success_threshold,
            monitoring_window: self.monitoring_window,
            request_timeout: self.request_timeout,
            slow_call_threshold: self.slow_call_threshold,
            slow_call_rate_threshold: self.slow_call_rate_threshold,
            metrics_retention: self.metrics_retention,
            persistence_path: self.persistence_path,
            config_version: self.config_version,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

impl Default for BreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config = BreakerConfig::builder().build();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.recovery_timeout, Duration::from_secs(30));
        assert!(config.slow_call_threshold.is_none());
    }

    #[test]
    fn merge_overlays_only_set_fields() {
        let config = BreakerConfig::builder().failure_threshold(5).build();
        let patch = BreakerConfigPatch {
            failure_threshold: Some(9),
            recovery_timeout: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        let merged = config.merge(&patch);
        assert_eq!(merged.failure_threshold, 9);
        assert_eq!(merged.recovery_timeout, Duration::from_secs(1));
        assert_eq!(merged.failure_rate_threshold, config.failure_rate_threshold);
    }

    #[test]
    #[should_panic(expected = "success_threshold")]
    fn unreachable_success_threshold_rejected() {
        let _ = BreakerConfig::builder()
            .half_open_max_calls(1)
            .success_threshold(5)
            .build();
    }
}
