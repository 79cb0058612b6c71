//! Session counters for the bridge.
//!
//! Counters are plain atomics so the capture thread can bump them without
//! taking any lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Running statistics for one bridge session.
#[derive(Debug)]
pub struct BridgeStats {
    /// Lines written to the host
    records_emitted: AtomicU64,
    /// Decision rounds opened
    decisions_requested: AtomicU64,
    /// Rounds closed by a host response
    host_resolved: AtomicU64,
    /// Rounds closed by the deadline
    timed_out: AtomicU64,
    /// Rounds that ended in suppression
    suppressed: AtomicU64,
    /// Host responses that matched no open round
    dropped_responses: AtomicU64,
    /// Times the OS disabled the event tap
    tap_disables: AtomicU64,
    session_start: DateTime<Utc>,
}

impl BridgeStats {
    pub fn new() -> Self {
        Self {
            records_emitted: AtomicU64::new(0),
            decisions_requested: AtomicU64::new(0),
            host_resolved: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            dropped_responses: AtomicU64::new(0),
            tap_disables: AtomicU64::new(0),
            session_start: Utc::now(),
        }
    }

    pub fn record_emitted(&self) {
        self.records_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decision_requested(&self) {
        self.decisions_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_host_resolved(&self) {
        self.host_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_response(&self) {
        self.dropped_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tap_disabled(&self) {
        self.tap_disables.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            records_emitted: self.records_emitted.load(Ordering::Relaxed),
            decisions_requested: self.decisions_requested.load(Ordering::Relaxed),
            host_resolved: self.host_resolved.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            dropped_responses: self.dropped_responses.load(Ordering::Relaxed),
            tap_disables: self.tap_disables.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Session Statistics:\n\
             - Records emitted: {}\n\
             - Decisions requested: {}\n\
             - Resolved by host: {}\n\
             - Resolved by timeout: {}\n\
             - Suppressed: {}\n\
             - Dropped host responses: {}\n\
             - Tap disables: {}\n\
             - Session duration: {} seconds",
            stats.records_emitted,
            stats.decisions_requested,
            stats.host_resolved,
            stats.timed_out,
            stats.suppressed,
            stats.dropped_responses,
            stats.tap_disables,
            stats.session_duration_secs
        )
    }
}

impl Default for BridgeStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`BridgeStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub records_emitted: u64,
    pub decisions_requested: u64,
    pub host_resolved: u64,
    pub timed_out: u64,
    pub suppressed: u64,
    pub dropped_responses: u64,
    pub tap_disables: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

impl StatsSnapshot {
    /// Rounds closed by either path.
    pub fn resolved(&self) -> u64 {
        self.host_resolved + self.timed_out
    }
}

/// Thread-safe shared statistics.
pub type SharedStats = Arc<BridgeStats>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let stats = BridgeStats::new();
        stats.record_decision_requested();
        stats.record_decision_requested();
        stats.record_host_resolved();
        stats.record_timed_out();
        stats.record_suppressed();

        let snap = stats.snapshot();
        assert_eq!(snap.decisions_requested, 2);
        assert_eq!(snap.resolved(), 2);
        assert_eq!(snap.suppressed, 1);
    }

    #[test]
    fn test_summary_format() {
        let stats = BridgeStats::new();
        let summary = stats.summary();
        assert!(summary.contains("Decisions requested: 0"));
        assert!(summary.contains("Resolved by timeout"));
    }
}
