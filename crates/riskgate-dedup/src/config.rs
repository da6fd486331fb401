//! Configuration for the request deduplicator.

use crate::events::DedupEvent;
use riskgate_core::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration for [`RequestDeduplicator`](crate::RequestDeduplicator).
pub struct DedupConfig {
    pub(crate) ttl: Duration,
    pub(crate) sweep_interval: Duration,
    pub(crate) event_listeners: EventListeners<DedupEvent>,
    pub(crate) name: String,
}

impl DedupConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> DedupConfigBuilder {
        DedupConfigBuilder::new()
    }
}

/// Builder for [`DedupConfig`].
pub struct DedupConfigBuilder {
    ttl: Duration,
    sweep_interval: Duration,
    event_listeners: EventListeners<DedupEvent>,
    name: String,
}

impl DedupConfigBuilder {
    /// Creates a builder with default values.
    pub fn new() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// How long an in-flight slot or a completion timestamp is retained.
    ///
    /// Independent of any cache TTL.
    ///
    /// Default: 5 minutes
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Cadence of the background sweeper.
    ///
    /// Default: 60 seconds
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Human-readable instance name for observability.
    ///
    /// Default: `<unnamed>`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register a callback for every request that attaches to an existing
    /// in-flight computation.
    pub fn on_coalesced<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &DedupEvent| {
                if let DedupEvent::WaiterAttached { key, .. } = event {
                    f(key);
                }
            }));
        self
    }

    /// Register a callback for every settled computation.
    pub fn on_settled<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, bool) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &DedupEvent| {
                if let DedupEvent::Settled { key, success, .. } = event {
                    f(key, *success);
                }
            }));
        self
    }

    /// Builds the configuration.
    ///
    /// # Panics
    ///
    /// Panics if `ttl` or `sweep_interval` is zero.
    pub fn build(self) -> DedupConfig {
        assert!(!self.ttl.is_zero(), "dedup ttl must be greater than zero");
        assert!(
            !self.sweep_interval.is_zero(),
            "dedup sweep_interval must be greater than zero"
        );
        DedupConfig {
            ttl: self.ttl,
            sweep_interval: self.sweep_interval,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

impl Default for DedupConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
