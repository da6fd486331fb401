use riskgate_core::PipelineEvent;
use std::time::{Duration, Instant};

/// Events emitted by the retry manager and degradation handler.
#[derive(Debug, Clone)]
pub enum RecoveryEvent {
    /// A retry is about to happen after the given backoff.
    Retrying {
        component: String,
        timestamp: Instant,
        attempt: usize,
        delay: Duration,
    },
    /// The chain succeeded after `attempts` attempts.
    Succeeded {
        component: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// Retries ran out without a success.
    Exhausted {
        component: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// The error was not retryable under the active policy.
    NotRetryable {
        component: String,
        timestamp: Instant,
    },
    /// A recovery strategy produced usable data.
    Recovered {
        component: String,
        timestamp: Instant,
        source: &'static str,
        fallback_used: bool,
    },
    /// The degradation handler served a degraded response.
    Degraded {
        component: String,
        timestamp: Instant,
        source: &'static str,
    },
}

impl PipelineEvent for RecoveryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RecoveryEvent::Retrying { .. } => "Retrying",
            RecoveryEvent::Succeeded { .. } => "Succeeded",
            RecoveryEvent::Exhausted { .. } => "Exhausted",
            RecoveryEvent::NotRetryable { .. } => "NotRetryable",
            RecoveryEvent::Recovered { .. } => "Recovered",
            RecoveryEvent::Degraded { .. } => "Degraded",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RecoveryEvent::Retrying { timestamp, .. }
            | RecoveryEvent::Succeeded { timestamp, .. }
            | RecoveryEvent::Exhausted { timestamp, .. }
            | RecoveryEvent::NotRetryable { timestamp, .. }
            | RecoveryEvent::Recovered { timestamp, .. }
            | RecoveryEvent::Degraded { timestamp, .. } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        match self {
            RecoveryEvent::Retrying { component, .. }
            | RecoveryEvent::Succeeded { component, .. }
            | RecoveryEvent::Exhausted { component, .. }
            | RecoveryEvent::NotRetryable { component, .. }
            | RecoveryEvent::Recovered { component, .. }
            | RecoveryEvent::Degraded { component, .. } => component,
        }
    }
}
