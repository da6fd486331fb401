use riskgate_core::RiskError;
use std::time::Duration;

/// Result variants surfaced by [`CircuitBreaker::execute`](crate::CircuitBreaker::execute).
///
/// Open-circuit rejection and per-call timeout are distinct variants so call
/// sites branch rather than string-match; [`From<BreakerError> for
/// RiskError`](RiskError) maps them into the pipeline taxonomy at the
/// boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BreakerError {
    /// The circuit forbids execution right now.
    #[error("circuit breaker is open, retry in {retry_after:?}")]
    Open {
        /// Time until the breaker will consider another probe.
        retry_after: Duration,
    },

    /// The call exceeded the breaker's per-call timeout.
    #[error("call exceeded the {timeout:?} request timeout")]
    Timeout {
        /// The enforced timeout.
        timeout: Duration,
    },

    /// The wrapped work itself failed.
    #[error(transparent)]
    Inner(RiskError),
}

impl BreakerError {
    /// True for the open-circuit rejection variant.
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// Extracts the inner error, if the work itself failed.
    pub fn into_inner(self) -> Option<RiskError> {
        match self {
            BreakerError::Inner(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BreakerError> for RiskError {
    fn from(err: BreakerError) -> Self {
        match err {
            BreakerError::Open { retry_after } => {
                RiskError::circuit_open("circuit breaker is open", retry_after)
            }
            BreakerError::Timeout { timeout } => RiskError::timeout(format!(
                "call exceeded the {}ms request timeout",
                timeout.as_millis()
            )),
            BreakerError::Inner(inner) => inner,
        }
    }
}
