//! Configuration for the intelligent cache.

use crate::events::CacheEvent;
use riskgate_core::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration for [`IntelligentCache`](crate::IntelligentCache).
pub struct CacheConfig {
    pub(crate) default_ttl: Duration,
    pub(crate) max_size: usize,
    pub(crate) max_memory: usize,
    pub(crate) refresh_threshold: f64,
    pub(crate) compression_enabled: bool,
    pub(crate) compression_threshold: usize,
    pub(crate) cleanup_interval: Duration,
    pub(crate) event_listeners: EventListeners<CacheEvent>,
    pub(crate) name: String,
}

impl CacheConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::new()
    }
}

/// Builder for [`CacheConfig`].
pub struct CacheConfigBuilder {
    default_ttl: Duration,
    max_size: usize,
    max_memory: usize,
    refresh_threshold: f64,
    compression_enabled: bool,
    compression_threshold: usize,
    cleanup_interval: Duration,
    event_listeners: EventListeners<CacheEvent>,
    name: String,
}

impl CacheConfigBuilder {
    /// Creates a builder with default values.
    pub fn new() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            max_size: 1000,
            max_memory: 50 * 1024 * 1024,
            refresh_threshold: 0.8,
            compression_enabled: true,
            compression_threshold: 1024,
            cleanup_interval: Duration::from_secs(60),
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Default entry lifetime when `set` is called without an explicit TTL.
    ///
    /// Default: 5 minutes
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Hard upper bound on the number of entries.
    ///
    /// Default: 1000
    pub fn max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Hard upper bound on stored payload bytes.
    ///
    /// Default: 50 MiB
    pub fn max_memory(mut self, bytes: usize) -> Self {
        self.max_memory = bytes;
        self
    }

    /// Staleness ratio at which a read schedules a background refresh, as a
    /// fraction of the entry's TTL. Must be in `[0, 1)`.
    ///
    /// Default: 0.8
    pub fn refresh_threshold(mut self, ratio: f64) -> Self {
        self.refresh_threshold = ratio;
        self
    }

    /// Enables or disables payload compression.
    ///
    /// Default: enabled
    pub fn compression_enabled(mut self, enabled: bool) -> Self {
        self.compression_enabled = enabled;
        self
    }

    /// Serialized size at which compression activates.
    ///
    /// Default: 1024 bytes
    pub fn compression_threshold(mut self, bytes: usize) -> Self {
        self.compression_threshold = bytes;
        self
    }

    /// Cadence of the expired-entry sweeper.
    ///
    /// Default: 60 seconds
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Human-readable instance name for observability.
    ///
    /// Default: `<unnamed>`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register a callback for cache hits.
    pub fn on_hit<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CacheEvent| {
                if matches!(event, CacheEvent::Hit { .. }) {
                    f();
                }
            }));
        self
    }

    /// Register a callback for cache misses.
    pub fn on_miss<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CacheEvent| {
                if matches!(event, CacheEvent::Miss { .. }) {
                    f();
                }
            }));
        self
    }

    /// Register a callback for pressure evictions.
    pub fn on_eviction<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CacheEvent| {
                if matches!(event, CacheEvent::Evicted { .. }) {
                    f();
                }
            }));
        self
    }

    /// Builds the configuration.
    ///
    /// # Panics
    ///
    /// Panics if `default_ttl` is zero, `max_size` is zero, or
    /// `refresh_threshold` is outside `[0, 1)`.
    pub fn build(self) -> CacheConfig {
        assert!(
            !self.default_ttl.is_zero(),
            "cache default_ttl must be greater than zero"
        );
        assert!(self.max_size > 0, "cache max_size must be greater than zero");
        assert!(
            (0.0..1.0).contains(&self.refresh_threshold),
            "cache refresh_threshold must be in [0, 1)"
        );
        CacheConfig {
            default_ttl: self.default_ttl,
            max_size: self.max_size,
            max_memory: self.max_memory,
            refresh_threshold: self.refresh_threshold,
            compression_enabled: self.compression_enabled,
            compression_threshold: self.compression_threshold,
            cleanup_interval: self.cleanup_interval,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

impl Default for CacheConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config = CacheConfig::builder().build();
        assert_eq!(config.default_ttl, Duration::from_secs(300));
        assert_eq!(config.max_size, 1000);
        assert!(config.compression_enabled);
    }

    #[test]
    #[should_panic(expected = "refresh_threshold")]
    fn refresh_threshold_must_be_a_ratio() {
        let _ = CacheConfig::builder().refresh_threshold(1.5).build();
    }

    #[test]
    #[should_panic(expected = "default_ttl")]
    fn zero_ttl_rejected() {
        let _ = CacheConfig::builder().default_ttl(Duration::ZERO).build();
    }
}
