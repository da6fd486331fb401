//! Core infrastructure shared by every riskgate subsystem.
//!
//! This crate carries the three things the request-serving pipeline cannot
//! function without:
//!
//! - **Error taxonomy** ([`RiskError`], [`ErrorKind`]): every failure in the
//!   pipeline is normalized into a single classified error type that knows
//!   whether it is retryable, how long to wait before retrying, and how to
//!   serialize itself without leaking sensitive request data.
//! - **Event system** ([`EventListeners`], [`FnListener`]): subsystems emit
//!   typed events (cache hits, breaker transitions, retry attempts) to
//!   registered listeners. A panicking listener never takes down the caller.
//! - **Request fingerprint** ([`RequestIdentifiers`]): the deterministic
//!   SHA-256 key derived from normalized customer identifiers, used for both
//!   deduplication and caching.
//!
//! # Example
//!
//! ```
//! use riskgate_core::{RequestIdentifiers, RiskError, ErrorKind};
//!
//! let ids = RequestIdentifiers {
//!     phone: Some("+92 300 123 4567".into()),
//!     order_name: Some("ORDER-1".into()),
//!     ..Default::default()
//! };
//! let key = ids.fingerprint();
//! assert_eq!(key.len(), 64);
//!
//! let err = RiskError::database("connection refused");
//! assert_eq!(err.kind, ErrorKind::Database);
//! assert!(err.retryable);
//! ```

mod error;
mod events;
mod fingerprint;
mod redact;

pub use error::{ErrorKind, RiskError};
pub use events::{BoxedEventListener, EventListener, EventListeners, FnListener, PipelineEvent};
pub use fingerprint::{hash_identifier, short_hash, NormalizedIdentifiers, RequestIdentifiers};
pub use redact::{is_sensitive_key, redact};
