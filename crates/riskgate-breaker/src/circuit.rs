//! The breaker state machine: pure bookkeeping, no I/O, driven under the
//! owner's lock.

use crate::config::BreakerConfig;
use crate::events::BreakerEvent;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Normal operation, calls pass through.
    Closed = 0,
    /// Tripped; calls are rejected until the recovery timeout elapses.
    Open = 1,
    /// Probing recovery with a bounded number of calls.
    HalfOpen = 2,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

/// How a recorded call finished. Slowness is tracked separately: a slow call
/// still succeeds, it just counts against the slow-call rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
    Timeout,
}

#[derive(Debug, Clone)]
struct CallRecord {
    at: Instant,
    outcome: CallOutcome,
    duration: Duration,
    slow: bool,
}

/// One entry in the bounded state-transition log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: CircuitState,
    pub to: CircuitState,
    pub reason: String,
    /// Elapsed time since the transition happened.
    pub age: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TransitionRecord {
    at: Instant,
    from: CircuitState,
    to: CircuitState,
    reason: String,
}

/// Lifetime call totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallTotals {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub slow: u64,
}

/// Point-in-time breaker metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerMetrics {
    pub state: CircuitState,
    pub totals: CallTotals,
    /// Calls inside the monitoring window.
    pub window_calls: usize,
    /// Failures (including timeouts) inside the monitoring window.
    pub window_failures: usize,
    /// Slow calls inside the monitoring window.
    pub window_slow_calls: usize,
    /// In-window failure rate, 0 when idle.
    pub failure_rate: f64,
    /// In-window success rate, 0 when idle.
    pub success_rate: f64,
    /// In-window slow-call rate, 0 when idle.
    pub slow_call_rate: f64,
    /// Average response time over the window.
    pub avg_response_time: Duration,
    /// 95th percentile response time over the window.
    pub p95_response_time: Duration,
    /// 99th percentile response time over the window.
    pub p99_response_time: Duration,
    /// Time since the most recent success, if any.
    pub last_success_age: Option<Duration>,
    /// Time since the most recent failure, if any.
    pub last_failure_age: Option<Duration>,
    /// Threshold-caused transitions into OPEN.
    pub trips: u64,
    /// Recent transitions, oldest first.
    pub transitions: Vec<StateTransition>,
    pub half_open_calls: usize,
    pub half_open_successes: usize,
    pub time_since_state_change: Duration,
}

/// Outcome of asking the circuit for permission to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Acquire {
    Permitted,
    Rejected { retry_after: Duration },
}

const TRANSITION_LOG_CAPACITY: usize = 100;

pub(crate) struct Circuit {
    state: CircuitState,
    state_atomic: Arc<AtomicU8>,
    last_state_change: Instant,
    opened_at: Option<Instant>,
    half_open_calls: usize,
    half_open_successes: usize,
    half_open_success_seen: bool,
    records: VecDeque<CallRecord>,
    transitions: VecDeque<TransitionRecord>,
    totals: CallTotals,
    last_success_at: Option<Instant>,
    last_failure_at: Option<Instant>,
    trips: u64,
}

impl Circuit {
    pub(crate) fn new(state_atomic: Arc<AtomicU8>) -> Self {
        Self {
            state: CircuitState::Closed,
            state_atomic,
            last_state_change: Instant::now(),
            opened_at: None,
            half_open_calls: 0,
            half_open_successes: 0,
            half_open_success_seen: false,
            records: VecDeque::new(),
            transitions: VecDeque::new(),
            totals: CallTotals::default(),
            last_success_at: None,
            last_failure_at: None,
            trips: 0,
        }
    }

    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    pub(crate) fn trips(&self) -> u64 {
        self.trips
    }

    /// Healthy means the circuit is passing traffic and, in HALF_OPEN, has
    /// seen at least one probe succeed since entering the state.
    pub(crate) fn is_healthy(&self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => self.half_open_success_seen,
        }
    }

    /// Asks for permission to execute a call, applying the lazy OPEN to
    /// HALF_OPEN transition.
    pub(crate) fn try_acquire(&mut self, config: &BreakerConfig, now: Instant) -> Acquire {
        self.trim(config, now);
        match self.state {
            CircuitState::Closed => {
                self.emit_permitted(config, now);
                Acquire::Permitted
            }
            CircuitState::Open => {
                let elapsed = now.duration_since(self.last_state_change);
                if elapsed >= config.recovery_timeout {
                    self.transition_to(
                        CircuitState::HalfOpen,
                        config,
                        "recovery timeout elapsed",
                        false,
                        now,
                    );
                    self.half_open_calls = 1;
                    self.emit_permitted(config, now);
                    Acquire::Permitted
                } else {
                    let retry_after = config.recovery_timeout - elapsed;
                    self.emit_rejected(config, now, retry_after);
                    Acquire::Rejected { retry_after }
                }
            }
            CircuitState::HalfOpen => {
                if self.half_open_calls < config.half_open_max_calls {
                    self.half_open_calls += 1;
                    self.emit_permitted(config, now);
                    Acquire::Permitted
                } else {
                    let elapsed = now.duration_since(self.last_state_change);
                    if elapsed >= config.recovery_timeout {
                        // Probe budget exhausted without a verdict; start a
                        // fresh probe round.
                        self.half_open_calls = 1;
                        self.half_open_successes = 0;
                        self.half_open_success_seen = false;
                        self.emit_permitted(config, now);
                        Acquire::Permitted
                    } else {
                        let retry_after = config.recovery_timeout - elapsed;
                        self.emit_rejected(config, now, retry_after);
                        Acquire::Rejected { retry_after }
                    }
                }
            }
        }
    }

    pub(crate) fn record_success(&mut self, config: &BreakerConfig, duration: Duration, now: Instant) {
        let slow = self.push_record(config, CallOutcome::Success, duration, now);
        self.totals.successful += 1;
        self.last_success_at = Some(now);

        config.event_listeners.emit(&BreakerEvent::SuccessRecorded {
            component: config.name.clone(),
            timestamp: now,
            state: self.state,
        });
        if slow {
            self.emit_slow(config, duration, now);
        }

        match self.state {
            CircuitState::HalfOpen => {
                self.half_open_successes += 1;
                self.half_open_success_seen = true;
                if self.half_open_successes >= config.success_threshold {
                    self.transition_to(
                        CircuitState::Closed,
                        config,
                        "success threshold reached",
                        false,
                        now,
                    );
                } else if slow {
                    // A slow probe still counts against the slow-call rate.
                    self.evaluate(config, now);
                }
            }
            _ => self.evaluate(config, now),
        }
    }

    pub(crate) fn record_failure(
        &mut self,
        config: &BreakerConfig,
        duration: Duration,
        timed_out: bool,
        now: Instant,
    ) {
        let outcome = if timed_out {
            CallOutcome::Timeout
        } else {
            CallOutcome::Failure
        };
        let slow = self.push_record(config, outcome, duration, now);
        self.totals.failed += 1;
        if timed_out {
            self.totals.timeouts += 1;
            config.event_listeners.emit(&BreakerEvent::TimeoutRecorded {
                component: config.name.clone(),
                timestamp: now,
                after: duration,
            });
        }
        self.last_failure_at = Some(now);

        config.event_listeners.emit(&BreakerEvent::FailureRecorded {
            component: config.name.clone(),
            timestamp: now,
            state: self.state,
        });
        if slow {
            self.emit_slow(config, duration, now);
        }

        match self.state {
            CircuitState::HalfOpen => {
                self.transition_to(
                    CircuitState::Open,
                    config,
                    if timed_out {
                        "timeout during half-open probe"
                    } else {
                        "failure during half-open probe"
                    },
                    true,
                    now,
                );
            }
            _ => self.evaluate(config, now),
        }
    }

    /// Operator override. Never counts as a trip.
    pub(crate) fn force_state(
        &mut self,
        state: CircuitState,
        config: &BreakerConfig,
        reason: &str,
        now: Instant,
    ) {
        self.transition_to(state, config, reason, false, now);
    }

    /// Returns to CLOSED and clears the rolling window and half-open
    /// bookkeeping. Lifetime totals and the trip counter survive.
    pub(crate) fn reset(&mut self, config: &BreakerConfig, now: Instant) {
        self.transition_to(CircuitState::Closed, config, "manual reset", false, now);
        self.records.clear();
    }

    pub(crate) fn time_until_next_attempt(
        &self,
        config: &BreakerConfig,
        now: Instant,
    ) -> Option<Duration> {
        match self.state {
            CircuitState::Open => {
                let elapsed = now.duration_since(self.last_state_change);
                Some(config.recovery_timeout.saturating_sub(elapsed))
            }
            CircuitState::HalfOpen if self.half_open_calls >= config.half_open_max_calls => {
                let elapsed = now.duration_since(self.last_state_change);
                Some(config.recovery_timeout.saturating_sub(elapsed))
            }
            _ => None,
        }
    }

    pub(crate) fn metrics(&mut self, config: &BreakerConfig, now: Instant) -> BreakerMetrics {
        self.trim(config, now);
        let window_calls = self.records.len();
        let window_failures = self
            .records
            .iter()
            .filter(|r| r.outcome != CallOutcome::Success)
            .count();
        let window_slow_calls = self.records.iter().filter(|r| r.slow).count();

        let mut durations: Vec<Duration> = self.records.iter().map(|r| r.duration).collect();
        durations.sort_unstable();
        let avg = if durations.is_empty() {
            Duration::ZERO
        } else {
            durations.iter().sum::<Duration>() / durations.len() as u32
        };

        let rate = |count: usize| {
            if window_calls > 0 {
                count as f64 / window_calls as f64
            } else {
                0.0
            }
        };

        BreakerMetrics {
            state: self.state,
            totals: self.totals,
            window_calls,
            window_failures,
            window_slow_calls,
            failure_rate: rate(window_failures),
            success_rate: rate(window_calls - window_failures),
            slow_call_rate: rate(window_slow_calls),
            avg_response_time: avg,
            p95_response_time: percentile(&durations, 0.95),
            p99_response_time: percentile(&durations, 0.99),
            last_success_age: self.last_success_at.map(|at| now.duration_since(at)),
            last_failure_age: self.last_failure_at.map(|at| now.duration_since(at)),
            trips: self.trips,
            transitions: self
                .transitions
                .iter()
                .map(|t| StateTransition {
                    from: t.from,
                    to: t.to,
                    reason: t.reason.clone(),
                    age: now.duration_since(t.at),
                })
                .collect(),
            half_open_calls: self.half_open_calls,
            half_open_successes: self.half_open_successes,
            time_since_state_change: now.duration_since(self.last_state_change),
        }
    }

    /// Restores state from a persisted snapshot.
    #[cfg(feature = "persistence")]
    pub(crate) fn restore(
        &mut self,
        state: CircuitState,
        opened_ago: Option<Duration>,
        trips: u64,
        totals: CallTotals,
        now: Instant,
    ) {
        self.state = state;
        self.state_atomic.store(state as u8, Ordering::Release);
        self.trips = trips;
        self.totals = totals;
        if state == CircuitState::Open {
            let opened = now - opened_ago.unwrap_or_default();
            self.opened_at = Some(opened);
            self.last_state_change = opened;
        }
    }

    #[cfg(feature = "persistence")]
    pub(crate) fn snapshot(&self, now: Instant) -> (CircuitState, Option<Duration>, u64, CallTotals) {
        (
            self.state,
            self.opened_at.map(|at| now.duration_since(at)),
            self.trips,
            self.totals,
        )
    }

    /// Records a call and reports whether it was slow.
    fn push_record(
        &mut self,
        config: &BreakerConfig,
        outcome: CallOutcome,
        duration: Duration,
        now: Instant,
    ) -> bool {
        self.trim(config, now);
        let slow = config
            .slow_call_threshold
            .is_some_and(|threshold| duration >= threshold);
        self.records.push_back(CallRecord {
            at: now,
            outcome,
            duration,
            slow,
        });
        self.totals.total += 1;
        if slow {
            self.totals.slow += 1;
        }
        slow
    }

    /// Drops records outside the monitoring window, and hard-drops anything
    /// past the retention period regardless of window size.
    fn trim(&mut self, config: &BreakerConfig, now: Instant) {
        let horizon = config.monitoring_window.min(config.metrics_retention);
        while let Some(front) = self.records.front() {
            if now.duration_since(front.at) > horizon {
                self.records.pop_front();
            } else {
                break;
            }
        }
    }

    fn evaluate(&mut self, config: &BreakerConfig, now: Instant) {
        if self.state == CircuitState::Open {
            return;
        }
        let total = self.records.len();
        let failures = self
            .records
            .iter()
            .filter(|r| r.outcome != CallOutcome::Success)
            .count();
        let slow = self.records.iter().filter(|r| r.slow).count();

        // The three trip conditions are independent; the first one satisfied
        // wins and they all feed the same trip counter.
        if failures >= config.failure_threshold {
            self.transition_to(
                CircuitState::Open,
                config,
                "failure count threshold reached",
                true,
                now,
            );
            return;
        }
        if total >= config.min_samples {
            let failure_rate = failures as f64 / total as f64;
            if failure_rate >= config.failure_rate_threshold {
                self.transition_to(
                    CircuitState::Open,
                    config,
                    "failure rate threshold reached",
                    true,
                    now,
                );
                return;
            }
            if config.slow_call_threshold.is_some() {
                let slow_rate = slow as f64 / total as f64;
                if slow_rate >= config.slow_call_rate_threshold {
                    self.transition_to(
                        CircuitState::Open,
                        config,
                        "slow call rate threshold reached",
                        true,
                        now,
                    );
                }
            }
        }
    }

    fn transition_to(
        &mut self,
        state: CircuitState,
        config: &BreakerConfig,
        reason: &str,
        genuine_trip: bool,
        now: Instant,
    ) {
        if self.state == state {
            return;
        }
        let from = self.state;

        if state == CircuitState::Open {
            self.opened_at = Some(now);
            if genuine_trip {
                self.trips += 1;
            }
        } else {
            self.opened_at = None;
        }
        if state == CircuitState::HalfOpen || state == CircuitState::Closed {
            self.half_open_calls = 0;
            self.half_open_successes = 0;
            self.half_open_success_seen = false;
        }
        if state == CircuitState::Closed {
            // Recovery starts from a clean window.
            self.records.clear();
        }

        self.state = state;
        self.state_atomic.store(state as u8, Ordering::Release);
        self.last_state_change = now;

        self.transitions.push_back(TransitionRecord {
            at: now,
            from,
            to: state,
            reason: reason.to_string(),
        });
        while self.transitions.len() > TRANSITION_LOG_CAPACITY {
            self.transitions.pop_front();
        }

        tracing::info!(
            breaker = %config.name,
            from = from.as_str(),
            to = state.as_str(),
            reason,
            "circuit state transition"
        );

        #[cfg(feature = "metrics")]
        {
            metrics::counter!(
                "breaker_transitions_total",
                "breaker" => config.name.clone(),
                "from" => from.as_str(),
                "to" => state.as_str()
            )
            .increment(1);
            metrics::gauge!("breaker_state", "breaker" => config.name.clone())
                .set(state as u8 as f64);
        }

        config.event_listeners.emit(&BreakerEvent::StateTransition {
            component: config.name.clone(),
            timestamp: now,
            from,
            to: state,
            reason: reason.to_string(),
        });
    }

    fn emit_permitted(&self, config: &BreakerConfig, now: Instant) {
        config.event_listeners.emit(&BreakerEvent::CallPermitted {
            component: config.name.clone(),
            timestamp: now,
            state: self.state,
        });
    }

    fn emit_rejected(&self, config: &BreakerConfig, now: Instant, retry_after: Duration) {
        #[cfg(feature = "metrics")]
        metrics::counter!("breaker_calls_total", "breaker" => config.name.clone(), "outcome" => "rejected")
            .increment(1);
        config.event_listeners.emit(&BreakerEvent::CallRejected {
            component: config.name.clone(),
            timestamp: now,
            retry_after,
        });
    }

    fn emit_slow(&self, config: &BreakerConfig, duration: Duration, now: Instant) {
        #[cfg(feature = "metrics")]
        metrics::counter!("breaker_slow_calls_total", "breaker" => config.name.clone())
            .increment(1);
        config.event_listeners.emit(&BreakerEvent::SlowCallDetected {
            component: config.name.clone(),
            timestamp: now,
            duration,
            state: self.state,
        });
    }
}

fn percentile(sorted: &[Duration], q: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (sorted.len() as f64 * q).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
