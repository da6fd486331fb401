use riskgate_core::PipelineEvent;
use std::time::Instant;

/// Events emitted by the request deduplicator.
#[derive(Debug, Clone)]
pub enum DedupEvent {
    /// A request found no in-flight computation and became the leader.
    LeaderStarted {
        component: String,
        timestamp: Instant,
        key: String,
    },
    /// A request attached to an existing in-flight computation.
    WaiterAttached {
        component: String,
        timestamp: Instant,
        key: String,
    },
    /// The in-flight computation settled and its slot was released.
    Settled {
        component: String,
        timestamp: Instant,
        key: String,
        success: bool,
    },
    /// The background sweeper removed stale slots or timestamps.
    Swept {
        component: String,
        timestamp: Instant,
        expired_pending: usize,
        expired_timestamps: usize,
    },
}

impl PipelineEvent for DedupEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DedupEvent::LeaderStarted { .. } => "LeaderStarted",
            DedupEvent::WaiterAttached { .. } => "WaiterAttached",
            DedupEvent::Settled { .. } => "Settled",
            DedupEvent::Swept { .. } => "Swept",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            DedupEvent::LeaderStarted { timestamp, .. }
            | DedupEvent::WaiterAttached { timestamp, .. }
            | DedupEvent::Settled { timestamp, .. }
            | DedupEvent::Swept { timestamp, .. } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        match self {
            DedupEvent::LeaderStarted { component, .. }
            | DedupEvent::WaiterAttached { component, .. }
            | DedupEvent::Settled { component, .. }
            | DedupEvent::Swept { component, .. } => component,
        }
    }
}
