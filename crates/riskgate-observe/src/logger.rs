//! Queryable in-memory log ring with write-time redaction.
//!
//! Records are mirrored to the active `tracing` subscriber and retained in a
//! bounded ring for the log analyzer and dashboard. Redaction happens before
//! a record is stored, so nothing downstream can leak what was never kept.

use parking_lot::Mutex;
use riskgate_core::{is_sensitive_key, redact};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Log severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// One stored log record, already redacted.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub seq: u64,
    pub epoch_ms: u64,
    pub level: LogLevel,
    pub component: String,
    pub request_id: Option<String>,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

/// Filter for [`LogBuffer::query`].
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    /// Keep records at or above this level.
    pub min_level: Option<LogLevel>,
    /// Keep records whose message contains this substring.
    pub contains: Option<String>,
    /// Keep records correlated to this request id.
    pub request_id: Option<String>,
    /// Cap on returned records, newest last.
    pub limit: Option<usize>,
}

/// Bounded, concurrently writable ring of recent log records.
pub struct LogBuffer {
    records: Mutex<VecDeque<LogRecord>>,
    capacity: usize,
    seq: AtomicU64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl LogBuffer {
    /// Creates a ring holding the last `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity: capacity.max(1),
            seq: AtomicU64::new(0),
        }
    }

    /// Appends a record, redacting the message and field values first.
    pub fn log(
        &self,
        level: LogLevel,
        component: &str,
        request_id: Option<&str>,
        message: &str,
        fields: BTreeMap<String, String>,
    ) {
        let message = redact(message);
        let fields: BTreeMap<String, String> = fields
            .into_iter()
            .map(|(k, v)| {
                let value = if is_sensitive_key(&k) {
                    "[REDACTED]".to_string()
                } else {
                    redact(&v)
                };
                (k, value)
            })
            .collect();

        match level {
            LogLevel::Debug => {
                tracing::debug!(component, request_id, ?fields, "{message}")
            }
            LogLevel::Info => tracing::info!(component, request_id, ?fields, "{message}"),
            LogLevel::Warn => tracing::warn!(component, request_id, ?fields, "{message}"),
            LogLevel::Error => tracing::error!(component, request_id, ?fields, "{message}"),
        }

        let record = LogRecord {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            epoch_ms: now_ms(),
            level,
            component: component.to_string(),
            request_id: request_id.map(str::to_string),
            message,
            fields,
        };

        let mut records = self.records.lock();
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn debug(&self, component: &str, request_id: Option<&str>, message: &str) {
        self.log(LogLevel::Debug, component, request_id, message, BTreeMap::new());
    }

    pub fn info(&self, component: &str, request_id: Option<&str>, message: &str) {
        self.log(LogLevel::Info, component, request_id, message, BTreeMap::new());
    }

    pub fn warn(&self, component: &str, request_id: Option<&str>, message: &str) {
        self.log(LogLevel::Warn, component, request_id, message, BTreeMap::new());
    }

    pub fn error(&self, component: &str, request_id: Option<&str>, message: &str) {
        self.log(LogLevel::Error, component, request_id, message, BTreeMap::new());
    }

    /// The most recent `n` records, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogRecord> {
        let records = self.records.lock();
        let skip = records.len().saturating_sub(n);
        records.iter().skip(skip).cloned().collect()
    }

    /// All retained records, oldest first.
    pub fn all(&self) -> Vec<LogRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Records matching the query, oldest first.
    pub fn query(&self, query: &LogQuery) -> Vec<LogRecord> {
        let records = self.records.lock();
        let mut matched: Vec<LogRecord> = records
            .iter()
            .filter(|r| query.min_level.is_none_or(|min| r.level >= min))
            .filter(|r| {
                query
                    .contains
                    .as_deref()
                    .is_none_or(|needle| r.message.contains(needle))
            })
            .filter(|r| {
                query
                    .request_id
                    .as_deref()
                    .is_none_or(|id| r.request_id.as_deref() == Some(id))
            })
            .cloned()
            .collect();
        if let Some(limit) = query.limit {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        matched
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_drops_oldest_records() {
        let buffer = LogBuffer::new(3);
        for i in 0..5 {
            buffer.info("test", None, &format!("message {i}"));
        }
        let records = buffer.all();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].message, "message 2");
        assert_eq!(records[2].message, "message 4");
    }

    #[test]
    fn messages_are_redacted_at_write_time() {
        let buffer = LogBuffer::new(10);
        buffer.error("lookup", None, "no customer for jane@example.com / 0300 123 4567");
        let record = &buffer.all()[0];
        assert!(!record.message.contains("jane@"));
        assert!(!record.message.contains("4567"));
    }

    #[test]
    fn sensitive_fields_are_suppressed() {
        let buffer = LogBuffer::new(10);
        let mut fields = BTreeMap::new();
        fields.insert("token".to_string(), "abc123".to_string());
        fields.insert("attempt".to_string(), "2".to_string());
        buffer.log(LogLevel::Warn, "auth", None, "refresh failed", fields);

        let record = &buffer.all()[0];
        assert_eq!(record.fields["token"], "[REDACTED]");
        assert_eq!(record.fields["attempt"], "2");
    }

    #[test]
    fn query_filters_by_level_substring_and_request() {
        let buffer = LogBuffer::new(10);
        buffer.info("a", Some("req-1"), "hello");
        buffer.error("a", Some("req-1"), "store exploded");
        buffer.error("a", Some("req-2"), "other failure");

        let errors = buffer.query(&LogQuery {
            min_level: Some(LogLevel::Error),
            ..Default::default()
        });
        assert_eq!(errors.len(), 2);

        let req1 = buffer.query(&LogQuery {
            request_id: Some("req-1".into()),
            ..Default::default()
        });
        assert_eq!(req1.len(), 2);

        let exploded = buffer.query(&LogQuery {
            contains: Some("exploded".into()),
            ..Default::default()
        });
        assert_eq!(exploded.len(), 1);
    }

    #[test]
    fn query_limit_keeps_newest() {
        let buffer = LogBuffer::new(10);
        for i in 0..5 {
            buffer.info("t", None, &format!("m{i}"));
        }
        let limited = buffer.query(&LogQuery {
            limit: Some(2),
            ..Default::default()
        });
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[1].message, "m4");
    }
}
