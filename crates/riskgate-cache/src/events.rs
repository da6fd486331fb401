use riskgate_core::PipelineEvent;
use std::time::Instant;

/// Events emitted by the intelligent cache.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// A read was served from the cache.
    Hit {
        component: String,
        timestamp: Instant,
        key: String,
    },
    /// A read found nothing usable.
    Miss {
        component: String,
        timestamp: Instant,
        key: String,
    },
    /// An entry was removed because its TTL elapsed.
    Expired {
        component: String,
        timestamp: Instant,
        key: String,
    },
    /// A live entry was removed under size or memory pressure.
    Evicted {
        component: String,
        timestamp: Instant,
        key: String,
    },
    /// A background refresh was scheduled for an aging entry.
    RefreshScheduled {
        component: String,
        timestamp: Instant,
        key: String,
    },
    /// A background refresh failed; the existing entry was left intact.
    RefreshFailed {
        component: String,
        timestamp: Instant,
        key: String,
    },
}

impl PipelineEvent for CacheEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::Hit { .. } => "Hit",
            CacheEvent::Miss { .. } => "Miss",
            CacheEvent::Expired { .. } => "Expired",
            CacheEvent::Evicted { .. } => "Evicted",
            CacheEvent::RefreshScheduled { .. } => "RefreshScheduled",
            CacheEvent::RefreshFailed { .. } => "RefreshFailed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CacheEvent::Hit { timestamp, .. }
            | CacheEvent::Miss { timestamp, .. }
            | CacheEvent::Expired { timestamp, .. }
            | CacheEvent::Evicted { timestamp, .. }
            | CacheEvent::RefreshScheduled { timestamp, .. }
            | CacheEvent::RefreshFailed { timestamp, .. } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        match self {
            CacheEvent::Hit { component, .. }
            | CacheEvent::Miss { component, .. }
            | CacheEvent::Expired { component, .. }
            | CacheEvent::Evicted { component, .. }
            | CacheEvent::RefreshScheduled { component, .. }
            | CacheEvent::RefreshFailed { component, .. } => component,
        }
    }
}
