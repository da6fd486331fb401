//! Observability for the riskgate pipeline.
//!
//! Four pieces that work off each other, all process-local:
//!
//! - [`LogBuffer`]: a bounded, queryable ring of redacted log records,
//!   mirrored to the active `tracing` subscriber.
//! - [`PerformanceMetrics`]: per-endpoint rolling windows with percentile
//!   queries and periodic [`PerformanceSample`] snapshots.
//! - [`LogAnalyzer`]: error clustering over the ring, a 0-100 health score,
//!   anomaly flags, and rule-based recommendations.
//! - [`MonitoringDashboard`]: the aggregate snapshot with status derivation,
//!   alert lifecycle, and JSON/CSV export.
//!
//! These are constructed explicitly and handed to the pipeline; nothing here
//! is a global, and nothing is lazily created on a request path.
//!
//! # Example
//!
//! ```
//! use riskgate_observe::{LogAnalyzer, LogBuffer, MonitoringDashboard, PerformanceMetrics};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let buffer = Arc::new(LogBuffer::new(1000));
//! let metrics = Arc::new(PerformanceMetrics::new());
//! let dashboard = MonitoringDashboard::new(
//!     Arc::clone(&metrics),
//!     LogAnalyzer::new(Arc::clone(&buffer)),
//! );
//!
//! metrics.record_api_call("/api/assess", Duration::from_millis(42), 200, false, None);
//! buffer.info("pipeline", Some("req-1"), "assessment served");
//!
//! let snapshot = dashboard.snapshot();
//! assert_eq!(snapshot.endpoints.len(), 1);
//! ```

mod analyzer;
mod dashboard;
mod logger;
mod metrics;

pub use analyzer::{ErrorCluster, LogAnalysis, LogAnalyzer};
pub use dashboard::{
    AlertRecord, AlertSeverity, AlertType, DashboardSnapshot, MonitoringDashboard, SystemStatus,
};
pub use logger::{LogBuffer, LogLevel, LogQuery, LogRecord};
pub use metrics::{EndpointStats, PerformanceMetrics, PerformanceSample};
