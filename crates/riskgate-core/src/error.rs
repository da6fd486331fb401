//! The pipeline-wide error taxonomy.
//!
//! Every failure that crosses a subsystem boundary is a [`RiskError`]. The
//! retry manager, recovery strategies, and degradation handler all branch on
//! [`ErrorKind`] rather than downcasting, and serialization is redacted so an
//! error body can never leak customer identifiers.

use crate::redact::{is_sensitive_key, redact};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;

/// Classification of every error the pipeline can produce or observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or unusable request input. Never retried.
    Validation,
    /// The caller could not be authenticated. Never retried.
    Authentication,
    /// The caller is authenticated but not allowed. Never retried.
    Authorization,
    /// The requested entity does not exist. Never retried.
    NotFound,
    /// An operation exceeded its time budget.
    Timeout,
    /// The data store failed or was unreachable.
    Database,
    /// The circuit breaker rejected the call; carries the breaker's
    /// suggested wait.
    CircuitBreaker,
    /// An upstream rate limit was hit; carries the server-suggested wait.
    RateLimit,
    /// A transport-level failure between this process and a dependency.
    Network,
    /// Anything that could not be classified.
    Internal,
}

impl ErrorKind {
    /// Stable wire code for this kind.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Authentication => "AUTHENTICATION_ERROR",
            ErrorKind::Authorization => "AUTHORIZATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND_ERROR",
            ErrorKind::Timeout => "TIMEOUT_ERROR",
            ErrorKind::Database => "DATABASE_ERROR",
            ErrorKind::CircuitBreaker => "CIRCUIT_BREAKER_ERROR",
            ErrorKind::RateLimit => "RATE_LIMIT_ERROR",
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Internal => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Whether this kind is retryable by default.
    pub fn retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::Database | ErrorKind::RateLimit | ErrorKind::Network
        )
    }

    /// Default wait before a retry makes sense, for kinds that have one.
    pub fn default_retry_after(self) -> Option<Duration> {
        match self {
            ErrorKind::Timeout => Some(Duration::from_secs(1)),
            ErrorKind::Database => Some(Duration::from_secs(5)),
            ErrorKind::Network => Some(Duration::from_secs(2)),
            _ => None,
        }
    }
}

/// A classified pipeline error.
///
/// Construct through the per-kind helpers ([`RiskError::validation`],
/// [`RiskError::database`], ...) so the code, retryability, and default retry
/// delay stay consistent with the kind.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct RiskError {
    /// Classification; everything downstream branches on this.
    pub kind: ErrorKind,
    /// Stable wire code, derived from the kind.
    pub code: &'static str,
    /// Human-readable description. Redacted on serialization, not here.
    pub message: String,
    /// Whether a retry of the same operation can succeed.
    pub retryable: bool,
    /// Suggested wait before retrying, when known.
    pub retry_after: Option<Duration>,
    /// Free-form context. Sensitive keys and values are redacted on
    /// serialization.
    pub context: BTreeMap<String, String>,
}

impl RiskError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.code(),
            message: message.into(),
            retryable: kind.retryable(),
            retry_after: kind.default_retry_after(),
            context: BTreeMap::new(),
        }
    }

    /// A request failed input validation.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// The caller could not be authenticated.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    /// The caller is not permitted to perform the operation.
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, message)
    }

    /// The requested entity does not exist.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// An operation exceeded its time budget.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// The data store failed.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    /// The circuit breaker rejected the call. `retry_after` comes from the
    /// breaker's recovery timer.
    pub fn circuit_open(message: impl Into<String>, retry_after: Duration) -> Self {
        let mut err = Self::new(ErrorKind::CircuitBreaker, message);
        err.retry_after = Some(retry_after);
        err
    }

    /// An upstream rate limit was hit.
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        let mut err = Self::new(ErrorKind::RateLimit, message);
        err.retry_after = retry_after;
        err
    }

    /// A transport-level failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// An unclassified internal failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Attaches a context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Overrides the retryable flag (for policy-level decisions).
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Normalizes an arbitrary boxed error into the taxonomy.
    ///
    /// A boxed [`RiskError`] passes through unchanged. Anything else becomes
    /// [`ErrorKind::Internal`] with the original rendering preserved under
    /// `context["originalError"]`; an empty rendering falls back to
    /// `"Unknown error occurred"`.
    pub fn normalize(err: Box<dyn std::error::Error + Send + Sync>) -> RiskError {
        match err.downcast::<RiskError>() {
            Ok(risk) => *risk,
            Err(other) => Self::normalize_display(&*other),
        }
    }

    /// Normalizes any displayable value into the taxonomy.
    pub fn normalize_display(value: &dyn std::fmt::Display) -> RiskError {
        let original = value.to_string();
        let message = if original.trim().is_empty() {
            "Unknown error occurred".to_string()
        } else {
            original.clone()
        };
        RiskError::internal(message).with_context("originalError", original)
    }
}

impl Serialize for RiskError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RiskError", 6)?;
        state.serialize_field("type", self.code)?;
        state.serialize_field("code", self.code)?;
        state.serialize_field("message", &redact(&self.message))?;
        state.serialize_field("retryable", &self.retryable)?;
        state.serialize_field(
            "retryAfterMs",
            &self.retry_after.map(|d| d.as_millis() as u64),
        )?;
        let context: BTreeMap<&str, String> = self
            .context
            .iter()
            .map(|(k, v)| {
                let value = if is_sensitive_key(k) {
                    "[REDACTED]".to_string()
                } else {
                    redact(v)
                };
                (k.as_str(), value)
            })
            .collect();
        state.serialize_field("context", &context)?;
        state.end()
    }
}
