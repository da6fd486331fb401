use crate::circuit::CircuitState;
use riskgate_core::PipelineEvent;
use std::time::{Duration, Instant};

/// Events emitted by the circuit breaker.
#[derive(Debug, Clone)]
pub enum BreakerEvent {
    /// The circuit moved between states.
    StateTransition {
        component: String,
        timestamp: Instant,
        from: CircuitState,
        to: CircuitState,
        reason: String,
    },
    /// A call was allowed through.
    CallPermitted {
        component: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// A call was rejected because the circuit forbids execution.
    CallRejected {
        component: String,
        timestamp: Instant,
        retry_after: Duration,
    },
    /// A successful outcome was recorded.
    SuccessRecorded {
        component: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// A failed outcome was recorded.
    FailureRecorded {
        component: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// A call ran past the per-call timeout.
    TimeoutRecorded {
        component: String,
        timestamp: Instant,
        after: Duration,
    },
    /// A completed call exceeded the slow-call threshold.
    SlowCallDetected {
        component: String,
        timestamp: Instant,
        duration: Duration,
        state: CircuitState,
    },
}

impl PipelineEvent for BreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BreakerEvent::StateTransition { .. } => "StateTransition",
            BreakerEvent::CallPermitted { .. } => "CallPermitted",
            BreakerEvent::CallRejected { .. } => "CallRejected",
            BreakerEvent::SuccessRecorded { .. } => "SuccessRecorded",
            BreakerEvent::FailureRecorded { .. } => "FailureRecorded",
            BreakerEvent::TimeoutRecorded { .. } => "TimeoutRecorded",
            BreakerEvent::SlowCallDetected { .. } => "SlowCallDetected",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            BreakerEvent::StateTransition { timestamp, .. }
            | BreakerEvent::CallPermitted { timestamp, .. }
            | BreakerEvent::CallRejected { timestamp, .. }
            | BreakerEvent::SuccessRecorded { timestamp, .. }
            | BreakerEvent::FailureRecorded { timestamp, .. }
            | BreakerEvent::TimeoutRecorded { timestamp, .. }
            | BreakerEvent::SlowCallDetected { timestamp, .. } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        match self {
            BreakerEvent::StateTransition { component, .. }
            | BreakerEvent::CallPermitted { component, .. }
            | BreakerEvent::CallRejected { component, .. }
            | BreakerEvent::SuccessRecorded { component, .. }
            | BreakerEvent::FailureRecorded { component, .. }
            | BreakerEvent::TimeoutRecorded { component, .. }
            | BreakerEvent::SlowCallDetected { component, .. } => component,
        }
    }
}
