//! Scans the log ring for error clusters and produces a health score with
//! actionable recommendations.

use crate::logger::{LogBuffer, LogLevel, LogRecord};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A group of log records sharing one stable error signature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorCluster {
    /// Signature with volatile parts (digits, hex runs) collapsed.
    pub signature: String,
    pub count: usize,
    pub level: LogLevel,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    /// One representative (already redacted) message.
    pub sample_message: String,
}

/// The analyzer's verdict over the current ring contents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogAnalysis {
    /// 0 (unusable) to 100 (clean).
    pub health_score: u8,
    pub total_records: usize,
    pub error_count: usize,
    pub warn_count: usize,
    pub error_rate: f64,
    /// Clusters sorted by descending count.
    pub clusters: Vec<ErrorCluster>,
    pub anomalies: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Clusters recent logs and scores system health.
pub struct LogAnalyzer {
    buffer: Arc<LogBuffer>,
}

impl LogAnalyzer {
    pub fn new(buffer: Arc<LogBuffer>) -> Self {
        Self { buffer }
    }

    /// Analyzes everything currently retained in the ring.
    pub fn analyze(&self) -> LogAnalysis {
        let records = self.buffer.all();
        let total = records.len();
        let error_count = records
            .iter()
            .filter(|r| r.level == LogLevel::Error)
            .count();
        let warn_count = records.iter().filter(|r| r.level == LogLevel::Warn).count();
        let error_rate = if total > 0 {
            error_count as f64 / total as f64
        } else {
            0.0
        };
        let warn_rate = if total > 0 {
            warn_count as f64 / total as f64
        } else {
            0.0
        };

        let clusters = cluster(&records);
        let anomalies = find_anomalies(&records, &clusters, error_count);
        let recommendations = recommend(&clusters, error_rate);

        let big_clusters = clusters.iter().filter(|c| c.count >= 10).count();
        let penalty = (error_rate * 200.0).min(60.0)
            + (warn_rate * 50.0).min(20.0)
            + (big_clusters as f64 * 5.0).min(20.0);
        let health_score = (100.0 - penalty).clamp(0.0, 100.0).round() as u8;

        LogAnalysis {
            health_score,
            total_records: total,
            error_count,
            warn_count,
            error_rate,
            clusters,
            anomalies,
            recommendations,
        }
    }
}

/// Collapses volatile fragments so repeated occurrences of one failure mode
/// share a signature: digit runs become `#`, long hex runs become `~`.
fn signature_of(record: &LogRecord) -> String {
    let mut collapsed = String::with_capacity(record.message.len());
    let mut chars = record.message.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            while chars.peek().is_some_and(|n| n.is_ascii_digit()) {
                chars.next();
            }
            collapsed.push('#');
        } else {
            collapsed.push(c);
        }
    }
    // Hex identifiers (fingerprints, ids) of 16+ chars become a placeholder.
    let collapsed: String = collapsed
        .split_whitespace()
        .map(|word| {
            if word.len() >= 16 && word.chars().all(|c| c.is_ascii_hexdigit()) {
                "~"
            } else {
                word
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    let truncated: String = collapsed.chars().take(80).collect();
    format!("{}:{}:{}", record.level.as_str(), record.component, truncated)
}

fn cluster(records: &[LogRecord]) -> Vec<ErrorCluster> {
    let mut clusters: BTreeMap<String, ErrorCluster> = BTreeMap::new();
    for record in records
        .iter()
        .filter(|r| r.level >= LogLevel::Warn)
    {
        let signature = signature_of(record);
        clusters
            .entry(signature.clone())
            .and_modify(|c| {
                c.count += 1;
                c.last_seen_ms = record.epoch_ms;
            })
            .or_insert_with(|| ErrorCluster {
                signature,
                count: 1,
                level: record.level,
                first_seen_ms: record.epoch_ms,
                last_seen_ms: record.epoch_ms,
                sample_message: record.message.clone(),
            });
    }
    let mut sorted: Vec<ErrorCluster> = clusters.into_values().collect();
    sorted.sort_by(|a, b| b.count.cmp(&a.count));
    sorted
}

fn find_anomalies(
    records: &[LogRecord],
    clusters: &[ErrorCluster],
    error_count: usize,
) -> Vec<String> {
    let mut anomalies = Vec::new();
    if records.len() >= 10 {
        let half = records.len() / 2;
        let older_errors = records[..half]
            .iter()
            .filter(|r| r.level == LogLevel::Error)
            .count();
        let recent_errors = records[half..]
            .iter()
            .filter(|r| r.level == LogLevel::Error)
            .count();
        if recent_errors >= 3 && recent_errors > older_errors * 2 {
            anomalies.push(format!(
                "error rate rising: {recent_errors} errors in the recent half vs {older_errors} before"
            ));
        }
    }
    if let Some(dominant) = clusters.first() {
        if error_count >= 5 && dominant.count * 2 > error_count {
            anomalies.push(format!(
                "one signature dominates the errors ({} of {}): {}",
                dominant.count, error_count, dominant.signature
            ));
        }
    }
    anomalies
}

fn recommend(clusters: &[ErrorCluster], error_rate: f64) -> Vec<String> {
    let mut recommendations = Vec::new();
    let has = |needle: &str| clusters.iter().any(|c| c.signature.contains(needle));

    if has("DATABASE_ERROR") || has("database") {
        recommendations
            .push("persistent database errors: check store connectivity and pool sizing".into());
    }
    if has("TIMEOUT_ERROR") || has("timed out") {
        recommendations
            .push("recurring timeouts: review slow queries and downstream latency".into());
    }
    if has("CIRCUIT_BREAKER_ERROR") || has("circuit") {
        recommendations
            .push("circuit breaker activity: inspect the protected dependency's health".into());
    }
    if has("NETWORK_ERROR") {
        recommendations.push("network failures: verify DNS and egress connectivity".into());
    }
    if error_rate >= 0.25 {
        recommendations
            .push("overall error rate is high: consider shedding load or rolling back".into());
    }
    recommendations
}
