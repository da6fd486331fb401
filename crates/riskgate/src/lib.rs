//! riskgate: the resilient request-serving core of a customer
//! risk-assessment data service.
//!
//! The pipeline sits between HTTP loaders and the relational store and wires
//! five subsystems around every request:
//!
//! 1. validation and fingerprinting ([`riskgate_core`])
//! 2. request deduplication ([`riskgate_dedup`])
//! 3. a circuit breaker around the load path ([`riskgate_breaker`])
//! 4. retries with recovery inside the breaker ([`riskgate_recovery`])
//! 5. a TTL/LRU/memory-bounded cache in front of the query optimizer
//!    ([`riskgate_cache`], [`riskgate_query`])
//!
//! with structured logs, performance metrics, log analysis, and a monitoring
//! dashboard from [`riskgate_observe`] at every stage. Responses are always
//! well-formed: a primary payload, a flagged fallback with a confidence
//! score, or a minimal failure with a user-safe message.
//!
//! # Example
//!
//! ```
//! use riskgate::{AssessmentRequest, PipelineBuilder};
//! use riskgate_core::RequestIdentifiers;
//! use riskgate_query::InMemoryStore;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let pipeline = PipelineBuilder::new(Arc::new(InMemoryStore::new())).build();
//!
//! let response = pipeline
//!     .handle(AssessmentRequest {
//!         request_id: "req-1".into(),
//!         identifiers: RequestIdentifiers {
//!             phone: Some("+92 300 123 4567".into()),
//!             ..Default::default()
//!         },
//!     })
//!     .await;
//!
//! // Unknown customer: a primary-path new-customer assessment.
//! assert!(response.success);
//! assert_eq!(response.source, "primary");
//! # pipeline.shutdown().await;
//! # }
//! ```

mod config;
mod pipeline;
mod service;

pub use config::PipelineBuilder;
pub use pipeline::{AssessmentPipeline, AssessmentRequest, PipelineResponse};
pub use service::PipelineService;

pub use riskgate_breaker;
pub use riskgate_cache;
pub use riskgate_core;
pub use riskgate_dedup;
pub use riskgate_observe;
pub use riskgate_query;
pub use riskgate_recovery;
