//! Policy-driven retry with exponential backoff, jitter, an overall time
//! budget, and recovery hand-off on exhaustion.

use crate::events::RecoveryEvent;
use crate::strategies::{RecoveryAction, RecoveryStrategyManager};
use crate::RecoveryContext;
use rand::Rng;
use riskgate_core::{ErrorKind, EventListeners, RiskError};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Retry policy for one call chain.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first; `0` means exactly one attempt.
    pub max_retries: usize,
    /// First backoff delay.
    pub base_delay: Duration,
    /// Ceiling on any single backoff delay.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub backoff_multiplier: f64,
    /// Apply ±10% jitter to each delay.
    pub jitter: bool,
    /// Overall budget for the whole chain including backoff sleeps.
    pub timeout: Duration,
    /// Error kinds worth retrying.
    pub retryable_kinds: Vec<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
            timeout: Duration::from_secs(30),
            retryable_kinds: vec![
                ErrorKind::Timeout,
                ErrorKind::Database,
                ErrorKind::RateLimit,
                ErrorKind::Network,
            ],
        }
    }
}

impl RetryPolicy {
    /// Whether the policy retries this error.
    pub fn is_retryable(&self, error: &RiskError) -> bool {
        error.retryable && self.retryable_kinds.contains(&error.kind)
    }

    /// Backoff before retry number `attempt` (1-based: the delay after the
    /// first failed attempt is `attempt = 1`).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exp = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let raw = self.base_delay.as_secs_f64() * exp;
        let capped = raw.min(self.max_delay.as_secs_f64());
        let jittered = if self.jitter {
            capped * rand::rng().random_range(0.9..=1.1)
        } else {
            capped
        };
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// One attempt in a retry chain.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: usize,
    /// Backoff slept before this attempt (zero for the first).
    pub delay: Duration,
    /// How long the attempt itself took.
    pub duration: Duration,
    /// The normalized error, absent on success.
    pub error: Option<RiskError>,
}

/// The result of a retry chain, recovery included.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<RiskError>,
    pub attempts: Vec<AttemptRecord>,
    pub recovery_used: bool,
    pub fallback_used: bool,
}

/// Drives retries and hands exhausted chains to the recovery manager.
pub struct RetryManager {
    default_policy: RetryPolicy,
    recovery: Arc<RecoveryStrategyManager>,
    event_listeners: EventListeners<RecoveryEvent>,
    name: String,
}

impl RetryManager {
    pub fn new(default_policy: RetryPolicy, recovery: Arc<RecoveryStrategyManager>) -> Self {
        Self {
            default_policy,
            recovery,
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Instance name for observability.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers an event listener.
    pub fn add_listener<L>(&mut self, listener: L)
    where
        L: riskgate_core::EventListener<RecoveryEvent> + 'static,
    {
        self.event_listeners.add(listener);
    }

    /// Runs `work` under the policy (the manager's default when `None`).
    ///
    /// `work` is a factory invoked once per attempt. Every attempt is
    /// recorded; when retries exhaust or the error is not retryable, the
    /// recovery registry gets one shot at producing degraded data before the
    /// failure is returned.
    pub async fn execute_with_retry<F, Fut>(
        &self,
        ctx: &RecoveryContext,
        policy: Option<&RetryPolicy>,
        mut work: F,
    ) -> RetryOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Value, RiskError>>,
    {
        let policy = policy.unwrap_or(&self.default_policy);
        let started = Instant::now();
        let mut attempts = Vec::new();
        let mut attempt = 1usize;
        let mut slept = Duration::ZERO;

        let final_error = loop {
            let attempt_start = Instant::now();
            let result = work().await;
            let duration = attempt_start.elapsed();

            match result {
                Ok(data) => {
                    attempts.push(AttemptRecord {
                        attempt,
                        delay: slept,
                        duration,
                        error: None,
                    });
                    self.event_listeners.emit(&RecoveryEvent::Succeeded {
                        component: self.name.clone(),
                        timestamp: Instant::now(),
                        attempts: attempt,
                    });
                    return RetryOutcome {
                        success: true,
                        data: Some(data),
                        error: None,
                        attempts,
                        recovery_used: false,
                        fallback_used: false,
                    };
                }
                Err(error) => {
                    attempts.push(AttemptRecord {
                        attempt,
                        delay: slept,
                        duration,
                        error: Some(error.clone()),
                    });

                    if !policy.is_retryable(&error) {
                        self.event_listeners.emit(&RecoveryEvent::NotRetryable {
                            component: self.name.clone(),
                            timestamp: Instant::now(),
                        });
                        break error;
                    }
                    if attempt >= policy.max_retries + 1 {
                        self.event_listeners.emit(&RecoveryEvent::Exhausted {
                            component: self.name.clone(),
                            timestamp: Instant::now(),
                            attempts: attempt,
                        });
                        break error;
                    }

                    let delay = policy.delay_for(attempt);
                    if started.elapsed() + delay >= policy.timeout {
                        tracing::debug!(
                            retry = %self.name,
                            attempt,
                            "retry budget exhausted before next attempt"
                        );
                        break error;
                    }

                    self.event_listeners.emit(&RecoveryEvent::Retrying {
                        component: self.name.clone(),
                        timestamp: Instant::now(),
                        attempt,
                        delay,
                    });
                    tokio::time::sleep(delay).await;
                    slept = delay;
                    attempt += 1;
                }
            }
        };

        match self.recovery.attempt(&final_error, ctx).await {
            Some(RecoveryAction::Recovered {
                data,
                fallback_used,
                source,
            }) => {
                self.event_listeners.emit(&RecoveryEvent::Recovered {
                    component: self.name.clone(),
                    timestamp: Instant::now(),
                    source,
                    fallback_used,
                });
                RetryOutcome {
                    success: true,
                    data: Some(data),
                    error: None,
                    attempts,
                    recovery_used: true,
                    fallback_used,
                }
            }
            Some(RecoveryAction::RetryAfter { delay }) => {
                let mut error = final_error;
                error.retry_after = Some(delay);
                RetryOutcome {
                    success: false,
                    data: None,
                    error: Some(error),
                    attempts,
                    recovery_used: false,
                    fallback_used: false,
                }
            }
            None => RetryOutcome {
                success: false,
                data: None,
                error: Some(final_error),
                attempts,
                recovery_used: false,
                fallback_used: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::StaticFallbackProvider;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager() -> RetryManager {
        RetryManager::new(
            RetryPolicy {
                base_delay: Duration::from_millis(5),
                jitter: false,
                ..Default::default()
            },
            Arc::new(RecoveryStrategyManager::with_defaults(
                None,
                Arc::new(StaticFallbackProvider),
            )),
        )
    }

    fn quick_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(5),
            jitter: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn first_attempt_success_does_not_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);

        let outcome = manager()
            .execute_with_retry(&RecoveryContext::default(), None, move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"ok": true}))
                }
            })
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!outcome.recovery_used);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);

        let outcome = manager()
            .execute_with_retry(&RecoveryContext::default(), Some(&quick_policy(3)), move || {
                let c = Arc::clone(&c);
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(RiskError::network("flaky"))
                    } else {
                        Ok(json!({"ok": true}))
                    }
                }
            })
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.attempts.len(), 3);
        assert!(outcome.attempts[0].error.is_some());
        assert!(outcome.attempts[2].error.is_none());
        // Later attempts record the backoff actually slept before them.
        assert!(outcome.attempts[1].delay >= Duration::from_millis(5));
    }

    #[tokio::test]
    async fn zero_max_retries_means_one_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);

        let outcome = manager()
            .execute_with_retry(&RecoveryContext::default(), Some(&quick_policy(0)), move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<Value, _>(RiskError::database("down"))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.attempts.len(), 1);
        // Exhaustion on a database error still recovers with fallback data.
        assert!(outcome.success);
        assert!(outcome.recovery_used);
        assert!(outcome.fallback_used);
    }

    #[tokio::test]
    async fn validation_errors_are_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);

        let outcome = manager()
            .execute_with_retry(&RecoveryContext::default(), Some(&quick_policy(5)), move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<Value, _>(RiskError::validation("bad phone"))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_ref().unwrap().code, "VALIDATION_ERROR");
        assert!(!outcome.recovery_used);
    }

    #[tokio::test]
    async fn attempt_count_is_bounded_by_policy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);

        let outcome = manager()
            .execute_with_retry(&RecoveryContext::default(), Some(&quick_policy(2)), move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<Value, _>(RiskError::network("unreachable"))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(outcome.attempts.len() <= 2 + 1);
        // Network recovery yields a retry recommendation, not data.
        assert!(!outcome.success);
        assert_eq!(
            outcome.error.unwrap().retry_after,
            Some(Duration::from_secs(2))
        );
    }

    #[tokio::test]
    async fn overall_timeout_cuts_the_chain() {
        let policy = RetryPolicy {
            max_retries: 50,
            base_delay: Duration::from_millis(40),
            jitter: false,
            timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);

        let started = Instant::now();
        let outcome = manager()
            .execute_with_retry(&RecoveryContext::default(), Some(&policy), move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<Value, _>(RiskError::network("unreachable"))
                }
            })
            .await;

        assert!(!outcome.success);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(calls.load(Ordering::SeqCst) < 51);
    }

    #[tokio::test]
    async fn delay_schedule_is_exponential_and_capped() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            backoff_multiplier: 2.0,
            jitter: false,
            ..Default::default()
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn jitter_stays_within_ten_percent() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            jitter: true,
            ..Default::default()
        };
        for _ in 0..50 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(90), "delay {delay:?}");
            assert!(delay <= Duration::from_millis(110), "delay {delay:?}");
        }
    }

    #[tokio::test]
    async fn attempts_are_visible_to_listeners() {
        let seen: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);

        let mut manager = manager();
        manager.add_listener(riskgate_core::FnListener::new(
            move |event: &RecoveryEvent| {
                s.lock().push(event_name(event));
            },
        ));

        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let _ = manager
            .execute_with_retry(&RecoveryContext::default(), Some(&quick_policy(1)), move || {
                let c = Arc::clone(&c);
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(RiskError::network("flaky"))
                    } else {
                        Ok(json!({}))
                    }
                }
            })
            .await;

        assert_eq!(&*seen.lock(), &["Retrying", "Succeeded"]);
    }

    fn event_name(event: &RecoveryEvent) -> &'static str {
        match event {
            RecoveryEvent::Retrying { .. } => "Retrying",
            RecoveryEvent::Succeeded { .. } => "Succeeded",
            RecoveryEvent::Exhausted { .. } => "Exhausted",
            RecoveryEvent::NotRetryable { .. } => "NotRetryable",
            RecoveryEvent::Recovered { .. } => "Recovered",
            RecoveryEvent::Degraded { .. } => "Degraded",
        }
    }
}
