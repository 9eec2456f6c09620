//! Admission telemetry.
//!
//! Every admission decision (bot or legitimate) is appended to a
//! [`TelemetryStore`]. The store is advisory: recording never fails the
//! decision it records, and the in-memory implementation forgets everything
//! on restart.
//!
//! # Thread safety
//!
//! [`MemoryTelemetryStore`] serializes appends and evictions behind a
//! `tokio::sync::Mutex`; a record is either fully appended or not at all.

use std::collections::{BTreeMap, VecDeque};

use chrono::SecondsFormat;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::{DEFAULT_TELEMETRY_CAPACITY, DEFAULT_TELEMETRY_RECENT};
use crate::outcome::{AdmissionOutcome, RejectionReason};

/// Header row of the delimited export.
pub const EXPORT_HEADER: &str = "Timestamp,Admitted,Reason,Details";

/// Aggregated view over the current log contents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryStats {
    pub total: usize,
    pub rejected_count: usize,
    pub admitted_count: usize,
    /// Percentage of rejected records, rounded to two decimals.
    pub rejection_rate: f64,
    pub breakdown_by_reason: BTreeMap<RejectionReason, usize>,
    /// The most recent records, oldest first.
    pub recent: Vec<AdmissionOutcome>,
}

/// Sink and query surface for admission outcomes.
///
/// Implementations must be safe to share across async tasks.
#[async_trait::async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Append an outcome. Best effort: implementations swallow and log
    /// their own failures.
    async fn record(&self, outcome: AdmissionOutcome);

    /// Aggregate the current contents.
    async fn stats(&self) -> TelemetryStats;

    /// Serialize the full current contents as CSV, header row first.
    async fn export_csv(&self) -> String;

    /// Drop every record.
    async fn reset(&self);
}

/// Bounded FIFO ring of outcomes held in process memory.
pub struct MemoryTelemetryStore {
    log: Mutex<VecDeque<AdmissionOutcome>>,
    capacity: usize,
    recent_limit: usize,
}

impl MemoryTelemetryStore {
    /// Create an empty store. A zero capacity is replaced by the default.
    #[must_use]
    pub fn new(capacity: usize, recent_limit: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_TELEMETRY_CAPACITY
        } else {
            capacity
        };
        Self {
            log: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            recent_limit,
        }
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of records.
    pub async fn len(&self) -> usize {
        self.log.lock().await.len()
    }

    /// Whether the log is empty.
    pub async fn is_empty(&self) -> bool {
        self.log.lock().await.is_empty()
    }
}

impl Default for MemoryTelemetryStore {
    fn default() -> Self {
        Self::new(DEFAULT_TELEMETRY_CAPACITY, DEFAULT_TELEMETRY_RECENT)
    }
}

#[async_trait::async_trait]
impl TelemetryStore for MemoryTelemetryStore {
    async fn record(&self, outcome: AdmissionOutcome) {
        let mut log = self.log.lock().await;
        while log.len() >= self.capacity {
            log.pop_front();
        }
        log.push_back(outcome);
    }

    async fn stats(&self) -> TelemetryStats {
        let log = self.log.lock().await;

        let total = log.len();
        let mut breakdown_by_reason = BTreeMap::new();
        for reason in log.iter().filter_map(AdmissionOutcome::rejection_reason) {
            *breakdown_by_reason.entry(reason).or_insert(0) += 1;
        }
        let rejected_count: usize = breakdown_by_reason.values().sum();
        let admitted_count = total - rejected_count;

        let rejection_rate = if total == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let pct = rejected_count as f64 / total as f64 * 100.0;
            (pct * 100.0).round() / 100.0
        };

        let skip = total.saturating_sub(self.recent_limit);
        let recent = log.iter().skip(skip).cloned().collect();

        TelemetryStats {
            total,
            rejected_count,
            admitted_count,
            rejection_rate,
            breakdown_by_reason,
            recent,
        }
    }

    async fn export_csv(&self) -> String {
        let log = self.log.lock().await;
        let mut out = String::with_capacity(EXPORT_HEADER.len() + log.len() * 96);
        out.push_str(EXPORT_HEADER);
        for outcome in log.iter() {
            out.push('\n');
            out.push_str(&csv_row(outcome));
        }
        out
    }

    async fn reset(&self) {
        self.log.lock().await.clear();
    }
}

impl std::fmt::Debug for MemoryTelemetryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTelemetryStore")
            .field("capacity", &self.capacity)
            .field("recent_limit", &self.recent_limit)
            .finish_non_exhaustive()
    }
}

/// One export row: timestamp, admitted flag, reason or `N/A`, quoted detail.
fn csv_row(outcome: &AdmissionOutcome) -> String {
    let timestamp = outcome
        .recorded_at
        .to_rfc3339_opts(SecondsFormat::Millis, true);
    let admitted = if outcome.admitted() { "TRUE" } else { "FALSE" };
    let reason = outcome
        .rejection_reason()
        .map_or("N/A", RejectionReason::as_str);
    let detail = serde_json::Value::Object(outcome.detail.clone())
        .to_string()
        .replace('"', "\"\"");
    format!("{timestamp},{admitted},{reason},\"{detail}\"")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::{Map, json};

    use super::*;
    use crate::outcome::Decision;

    fn outcome(decision: Decision, marker: usize) -> AdmissionOutcome {
        let mut detail = Map::new();
        detail.insert("marker".to_owned(), json!(marker));
        AdmissionOutcome {
            decision,
            detail,
            recorded_at: Utc::now(),
            email_fingerprint: format!("fp{marker}"),
        }
    }

    fn rejected(reason: RejectionReason, marker: usize) -> AdmissionOutcome {
        outcome(Decision::Rejected(reason), marker)
    }

    #[tokio::test]
    async fn empty_store_stats() {
        let store = MemoryTelemetryStore::default();
        let stats = store.stats().await;
        assert_eq!(stats.total, 0);
        assert_eq!(stats.rejection_rate, 0.0);
        assert!(stats.breakdown_by_reason.is_empty());
        assert!(stats.recent.is_empty());
    }

    #[tokio::test]
    async fn stats_aggregate_by_reason() {
        let store = MemoryTelemetryStore::default();
        store.record(rejected(RejectionReason::TooFast, 1)).await;
        store.record(rejected(RejectionReason::TooFast, 2)).await;
        store.record(rejected(RejectionReason::HoneypotFilled, 3)).await;
        store.record(outcome(Decision::Admitted, 4)).await;
        store.record(outcome(Decision::Admitted, 5)).await;
        store.record(outcome(Decision::Admitted, 6)).await;

        let stats = store.stats().await;
        assert_eq!(stats.total, 6);
        assert_eq!(stats.rejected_count, 3);
        assert_eq!(stats.admitted_count, 3);
        assert_eq!(stats.rejection_rate, 50.0);
        assert_eq!(stats.breakdown_by_reason[&RejectionReason::TooFast], 2);
        assert_eq!(stats.breakdown_by_reason[&RejectionReason::HoneypotFilled], 1);
        assert!(!stats.breakdown_by_reason.contains_key(&RejectionReason::TooSlow));
    }

    #[tokio::test]
    async fn rejection_rate_rounds_to_two_decimals() {
        let store = MemoryTelemetryStore::default();
        store.record(rejected(RejectionReason::TooSlow, 1)).await;
        store.record(outcome(Decision::Admitted, 2)).await;
        store.record(outcome(Decision::Admitted, 3)).await;
        assert_eq!(store.stats().await.rejection_rate, 33.33);
    }

    #[tokio::test]
    async fn stats_are_idempotent() {
        let store = MemoryTelemetryStore::default();
        store.record(rejected(RejectionReason::NoFocusEvent, 1)).await;
        store.record(outcome(Decision::Admitted, 2)).await;
        assert_eq!(store.stats().await, store.stats().await);
    }

    #[tokio::test]
    async fn capacity_evicts_oldest() {
        let store = MemoryTelemetryStore::new(3, 10);
        for i in 0..4 {
            store.record(rejected(RejectionReason::TooFast, i)).await;
        }
        assert_eq!(store.len().await, 3);

        let stats = store.stats().await;
        let markers: Vec<_> = stats
            .recent
            .iter()
            .map(|o| o.detail["marker"].as_u64().unwrap())
            .collect();
        assert_eq!(markers, vec![1, 2, 3]);

        let csv = store.export_csv().await;
        assert!(!csv.contains(r#"""marker"":0"#));
        assert!(csv.contains(r#"""marker"":3"#));
    }

    #[tokio::test]
    async fn recent_is_limited_and_ordered() {
        let store = MemoryTelemetryStore::new(100, 2);
        for i in 0..5 {
            store.record(outcome(Decision::Admitted, i)).await;
        }
        let recent = store.stats().await.recent;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].detail["marker"], 3);
        assert_eq!(recent[1].detail["marker"], 4);
    }

    #[tokio::test]
    async fn export_has_header_and_escaped_rows() {
        let store = MemoryTelemetryStore::default();
        store.record(rejected(RejectionReason::HoneypotFilled, 7)).await;
        store.record(outcome(Decision::Admitted, 8)).await;

        let csv = store.export_csv().await;
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], EXPORT_HEADER);
        assert!(lines[1].contains(",FALSE,HONEYPOT_FILLED,"));
        assert!(lines[1].ends_with(r#","{""marker"":7}""#));
        assert!(lines[2].contains(",TRUE,N/A,"));
    }

    #[tokio::test]
    async fn every_record_exported_exactly_once() {
        let store = MemoryTelemetryStore::new(50, 50);
        for i in 0..20 {
            store.record(outcome(Decision::Admitted, 1000 + i)).await;
        }
        let csv = store.export_csv().await;
        for i in 0..20 {
            let needle = format!(r#"""marker"":{}"#, 1000 + i);
            assert_eq!(csv.matches(&needle).count(), 1, "marker {i}");
        }
    }

    #[tokio::test]
    async fn export_never_contains_fingerprint_or_email() {
        let store = MemoryTelemetryStore::default();
        store.record(rejected(RejectionReason::TooFast, 1)).await;
        assert!(!store.export_csv().await.contains("fp1"));
    }

    #[tokio::test]
    async fn reset_empties_log() {
        let store = MemoryTelemetryStore::default();
        store.record(outcome(Decision::Admitted, 1)).await;
        store.reset().await;
        assert!(store.is_empty().await);
        assert_eq!(store.export_csv().await, EXPORT_HEADER);
    }

    #[tokio::test]
    async fn concurrent_records_are_not_lost() {
        let store = Arc::new(MemoryTelemetryStore::new(10_000, 10));
        let mut handles = Vec::new();
        for task in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for i in 0..100 {
                    store.record(outcome(Decision::Admitted, task * 1000 + i)).await;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.len().await, 800);
    }

    #[tokio::test]
    async fn concurrent_records_respect_capacity() {
        let store = Arc::new(MemoryTelemetryStore::new(25, 10));
        let mut handles = Vec::new();
        for task in 0..4 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    store.record(outcome(Decision::Admitted, task * 100 + i)).await;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.len().await, 25);
    }
}
