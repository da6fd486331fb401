//! Plaintext JSON persistence of breaker state across restarts.
//!
//! The file carries counters and timestamps only, never request data. Any
//! read problem (missing file, decode failure, version mismatch) results in
//! a fresh CLOSED start; persistence never surfaces an error to callers.

use crate::circuit::{CallTotals, CircuitState};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub(crate) const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PersistedState {
    pub version: u32,
    pub config_version: u32,
    pub state: String,
    pub opened_ago_ms: Option<u64>,
    pub trips: u64,
    pub counters: PersistedCounters,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PersistedCounters {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub slow: u64,
}

pub(crate) struct Restored {
    pub state: CircuitState,
    pub opened_ago: Option<Duration>,
    pub trips: u64,
    pub totals: CallTotals,
}

pub(crate) fn save(
    path: &Path,
    config_version: u32,
    state: CircuitState,
    opened_ago: Option<Duration>,
    trips: u64,
    totals: CallTotals,
) -> std::io::Result<()> {
    let persisted = PersistedState {
        version: FORMAT_VERSION,
        config_version,
        state: state.as_str().to_string(),
        opened_ago_ms: opened_ago.map(|d| d.as_millis() as u64),
        trips,
        counters: PersistedCounters {
            total: totals.total,
            successful: totals.successful,
            failed: totals.failed,
            timeouts: totals.timeouts,
            slow: totals.slow,
        },
    };
    let json = serde_json::to_vec_pretty(&persisted)?;
    std::fs::write(path, json)
}

/// Loads persisted state. Returns `None` (after a warning) on any mismatch
/// or decode problem.
pub(crate) fn load(path: &Path, expected_config_version: u32) -> Option<Restored> {
    let bytes = std::fs::read(path).ok()?;
    let persisted: PersistedState = match serde_json::from_slice(&bytes) {
        Ok(p) => p,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "discarding undecodable breaker state");
            return None;
        }
    };
    if persisted.version != FORMAT_VERSION || persisted.config_version != expected_config_version {
        tracing::warn!(
            path = %path.display(),
            file_version = persisted.version,
            file_config_version = persisted.config_version,
            "discarding breaker state with mismatched version"
        );
        return None;
    }
    let state = match persisted.state.as_str() {
        "OPEN" => CircuitState::Open,
        "HALF_OPEN" => CircuitState::HalfOpen,
        _ => CircuitState::Closed,
    };
    Some(Restored {
        state,
        opened_ago: persisted.opened_ago_ms.map(Duration::from_millis),
        trips: persisted.trips,
        totals: CallTotals {
            total: persisted.counters.total,
            successful: persisted.counters.successful,
            failed: persisted.counters.failed,
            timeouts: persisted.counters.timeouts,
            slow: persisted.counters.slow,
        },
    })
}
