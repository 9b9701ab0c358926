//! Reader metrics collection

use crate::audit::{ReadOutcome, ReadStatus};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// In-process counters over read outcomes
///
/// Mirrors each update to the global `metrics` recorder so the same numbers
/// reach the Prometheus exporter.
#[derive(Clone, Default)]
pub struct ReaderMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    reads: AtomicU64,
    bypassed: AtomicU64,
    refused: AtomicU64,
    failed: AtomicU64,
    records_processed: AtomicU64,
    records_returned: AtomicU64,
}

impl ReaderMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one read
    pub fn record_outcome(&self, outcome: &ReadOutcome) {
        let inner = &self.inner;
        inner.reads.fetch_add(1, Ordering::Relaxed);

        match outcome.status {
            ReadStatus::Refused => {
                inner.refused.fetch_add(1, Ordering::Relaxed);
            }
            ReadStatus::Failed => {
                inner.failed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("recordgate_reads_failed_total").increment(1);
            }
            ReadStatus::Completed if outcome.bypassed() => {
                inner.bypassed.fetch_add(1, Ordering::Relaxed);
            }
            ReadStatus::Completed => {
                let processed = outcome.records_processed.max(0) as u64;
                let returned = outcome.records_returned.max(0) as u64;
                inner.records_processed.fetch_add(processed, Ordering::Relaxed);
                inner.records_returned.fetch_add(returned, Ordering::Relaxed);
                metrics::histogram!("recordgate_records_withheld").record(outcome.records_withheld() as f64);
            }
        }
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        MetricsSnapshot {
            reads: inner.reads.load(Ordering::Relaxed),
            bypassed: inner.bypassed.load(Ordering::Relaxed),
            refused: inner.refused.load(Ordering::Relaxed),
            failed: inner.failed.load(Ordering::Relaxed),
            records_processed: inner.records_processed.load(Ordering::Relaxed),
            records_returned: inner.records_returned.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub reads: u64,
    pub bypassed: u64,
    pub refused: u64,
    pub failed: u64,
    pub records_processed: u64,
    pub records_returned: u64,
}

impl MetricsSnapshot {
    /// Share of counted records that rules withheld
    pub fn withheld_rate(&self) -> f64 {
        if self.records_processed == 0 {
            0.0
        } else {
            1.0 - self.records_returned as f64 / self.records_processed as f64
        }
    }

    /// Share of reads refused for lack of capacity
    pub fn refusal_rate(&self) -> f64 {
        if self.reads == 0 {
            0.0
        } else {
            self.refused as f64 / self.reads as f64
        }
    }
}
