//! Aggregated monitoring view: status derivation, alert lifecycle, and
//! JSON/CSV export.

use crate::analyzer::{ErrorCluster, LogAnalysis, LogAnalyzer};
use crate::metrics::{EndpointStats, PerformanceMetrics, PerformanceSample};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Alert taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertType {
    Performance,
    Error,
    System,
}

impl AlertType {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::Performance => "performance",
            AlertType::Error => "error",
            AlertType::System => "system",
        }
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// A raised alert and its lifecycle flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    pub id: u64,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    /// How many times this alert has re-fired while unresolved.
    pub count: u64,
    pub acknowledged: bool,
    pub resolved: bool,
    pub context: BTreeMap<String, String>,
}

/// Overall system status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SystemStatus {
    Healthy,
    Warning,
    Critical,
}

impl SystemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SystemStatus::Healthy => "healthy",
            SystemStatus::Warning => "warning",
            SystemStatus::Critical => "critical",
        }
    }
}

/// Everything the dashboard knows, at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub generated_at_ms: u64,
    pub status: SystemStatus,
    pub health_score: u8,
    pub error_rate: f64,
    pub avg_response_ms: f64,
    pub endpoints: Vec<EndpointStats>,
    pub recent_samples: Vec<PerformanceSample>,
    pub top_errors: Vec<ErrorCluster>,
    pub anomalies: Vec<String>,
    pub recommendations: Vec<String>,
    pub active_alerts: Vec<AlertRecord>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Aggregates metrics and log analysis, derives status, and owns alerts.
pub struct MonitoringDashboard {
    metrics: Arc<PerformanceMetrics>,
    analyzer: LogAnalyzer,
    alerts: Mutex<Vec<AlertRecord>>,
    next_alert_id: AtomicU64,
}

impl MonitoringDashboard {
    pub fn new(metrics: Arc<PerformanceMetrics>, analyzer: LogAnalyzer) -> Self {
        Self {
            metrics,
            analyzer,
            alerts: Mutex::new(Vec::new()),
            next_alert_id: AtomicU64::new(1),
        }
    }

    /// Builds the aggregate snapshot, evaluating alert rules on the way.
    pub fn snapshot(&self) -> DashboardSnapshot {
        let analysis = self.analyzer.analyze();
        let endpoints = self.metrics.all_stats();

        let total: u64 = endpoints.iter().map(|e| e.total_requests).sum();
        let failed: u64 = endpoints.iter().map(|e| e.failed_requests).sum();
        let error_rate = if total > 0 {
            failed as f64 / total as f64
        } else {
            0.0
        };
        let avg_response_ms = if total > 0 {
            endpoints
                .iter()
                .map(|e| e.avg_response_ms * e.total_requests as f64)
                .sum::<f64>()
                / total as f64
        } else {
            0.0
        };

        let status = derive_status(analysis.health_score, error_rate, avg_response_ms);
        self.evaluate_alerts(status, &analysis, error_rate, avg_response_ms);

        DashboardSnapshot {
            generated_at_ms: now_ms(),
            status,
            health_score: analysis.health_score,
            error_rate,
            avg_response_ms,
            endpoints,
            recent_samples: self.metrics.recent_samples(12),
            top_errors: analysis.clusters.into_iter().take(10).collect(),
            anomalies: analysis.anomalies,
            recommendations: analysis.recommendations,
            active_alerts: self.active_alerts(),
        }
    }

    /// Raises an alert, or re-fires a matching unresolved one.
    pub fn raise_alert(
        &self,
        alert_type: AlertType,
        severity: AlertSeverity,
        message: impl Into<String>,
        context: BTreeMap<String, String>,
    ) -> u64 {
        let message = message.into();
        let now = now_ms();
        let mut alerts = self.alerts.lock();
        if let Some(existing) = alerts
            .iter_mut()
            .find(|a| !a.resolved && a.alert_type == alert_type && a.message == message)
        {
            existing.count += 1;
            existing.last_seen_ms = now;
            existing.severity = existing.severity.max(severity);
            return existing.id;
        }
        let id = self.next_alert_id.fetch_add(1, Ordering::Relaxed);
        alerts.push(AlertRecord {
            id,
            alert_type,
            severity,
            message,
            first_seen_ms: now,
            last_seen_ms: now,
            count: 1,
            acknowledged: false,
            resolved: false,
            context,
        });
        id
    }

    /// Marks an alert acknowledged. Returns false for unknown ids.
    pub fn acknowledge(&self, id: u64) -> bool {
        let mut alerts = self.alerts.lock();
        match alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.acknowledged = true;
                true
            }
            None => false,
        }
    }

    /// Marks an alert resolved. Returns false for unknown ids.
    pub fn resolve(&self, id: u64) -> bool {
        let mut alerts = self.alerts.lock();
        match alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.resolved = true;
                true
            }
            None => false,
        }
    }

    /// Unresolved alerts, most severe first.
    pub fn active_alerts(&self) -> Vec<AlertRecord> {
        let mut active: Vec<AlertRecord> = self
            .alerts
            .lock()
            .iter()
            .filter(|a| !a.resolved)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.id.cmp(&b.id)));
        active
    }

    /// Clears all alerts (resolved and not).
    pub fn reset(&self) {
        self.alerts.lock().clear();
    }

    /// The snapshot as a JSON value.
    pub fn export_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or_else(|_| serde_json::json!({}))
    }

    /// Per-endpoint stats as CSV.
    pub fn export_csv(&self) -> String {
        let snapshot = self.snapshot();
        let mut csv = String::from(
            "timestamp,endpoint,totalRequests,successfulRequests,failedRequests,averageResponseTime,errorRatePct,cacheHitRatePct\n",
        );
        for endpoint in &snapshot.endpoints {
            csv.push_str(&format!(
                "{},{},{},{},{},{:.1},{:.2},{:.2}\n",
                snapshot.generated_at_ms,
                endpoint.endpoint,
                endpoint.total_requests,
                endpoint.successful_requests,
                endpoint.failed_requests,
                endpoint.avg_response_ms,
                endpoint.error_rate * 100.0,
                endpoint.cache_hit_rate * 100.0,
            ));
        }
        csv
    }

    fn evaluate_alerts(
        &self,
        status: SystemStatus,
        analysis: &LogAnalysis,
        error_rate: f64,
        avg_response_ms: f64,
    ) {
        if status == SystemStatus::Critical {
            let mut context = BTreeMap::new();
            context.insert("healthScore".into(), analysis.health_score.to_string());
            context.insert("errorRate".into(), format!("{error_rate:.3}"));
            self.raise_alert(
                AlertType::System,
                AlertSeverity::Critical,
                "system status is critical",
                context,
            );
        }
        if error_rate >= 0.05 {
            self.raise_alert(
                AlertType::Error,
                if error_rate >= 0.10 {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::Warning
                },
                "request error rate above threshold",
                BTreeMap::new(),
            );
        }
        if avg_response_ms >= 1000.0 {
            self.raise_alert(
                AlertType::Performance,
                AlertSeverity::Warning,
                "average response time above 1s",
                BTreeMap::new(),
            );
        }
    }
}

fn derive_status(health_score: u8, error_rate: f64, avg_response_ms: f64) -> SystemStatus {
    if health_score < 50 || error_rate >= 0.10 {
        SystemStatus::Critical
    } else if health_score < 80 || error_rate >= 0.05 || avg_response_ms >= 1000.0 {
        SystemStatus::Warning
    } else {
        SystemStatus::Healthy
    }
}
