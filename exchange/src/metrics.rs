//! Metrics collection for exchange monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Exchange metrics.
#[derive(Default)]
pub struct Metrics {
    /// Jobs created by intake.
    pub jobs_submitted: AtomicU64,
    /// Submissions answered with an existing job.
    pub jobs_deduplicated: AtomicU64,
    /// Jobs that reached `completed`.
    pub jobs_completed: AtomicU64,
    /// Jobs that reached `failed`.
    pub jobs_failed: AtomicU64,
    /// Redeliveries of already terminal jobs.
    pub jobs_skipped: AtomicU64,
    /// Processing attempts rolled back by an error.
    pub jobs_errored: AtomicU64,
    /// Dispatch messages that could not be decoded.
    pub messages_undecodable: AtomicU64,
    /// Best-effort dispatch notifications that failed.
    pub dispatch_failures: AtomicU64,
    /// Operations that exceeded their deadline.
    pub timeouts: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_deduplicated(&self) {
        self.jobs_deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_skipped(&self) {
        self.jobs_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_errored(&self) {
        self.jobs_errored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_undecodable(&self) {
        self.messages_undecodable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dispatch_failed(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            jobs_deduplicated: self.jobs_deduplicated.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_skipped: self.jobs_skipped.load(Ordering::Relaxed),
            jobs_errored: self.jobs_errored.load(Ordering::Relaxed),
            messages_undecodable: self.messages_undecodable.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus text format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let counters = [
            ("jobs_submitted", "Jobs created by intake", snapshot.jobs_submitted),
            ("jobs_deduplicated", "Submissions answered with an existing job", snapshot.jobs_deduplicated),
            ("jobs_completed", "Jobs completed", snapshot.jobs_completed),
            ("jobs_failed", "Jobs failed", snapshot.jobs_failed),
            ("jobs_skipped", "Redelivered terminal jobs skipped", snapshot.jobs_skipped),
            ("jobs_errored", "Processing attempts rolled back", snapshot.jobs_errored),
            ("messages_undecodable", "Undecodable dispatch messages", snapshot.messages_undecodable),
            ("dispatch_failures", "Failed dispatch notifications", snapshot.dispatch_failures),
            ("timeouts", "Operations past their deadline", snapshot.timeouts),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            out.push_str(&format!(
                "# HELP fxledger_{name} {help}\n# TYPE fxledger_{name} counter\nfxledger_{name} {value}\n\n"
            ));
        }
        out
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub jobs_submitted: u64,
    pub jobs_deduplicated: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_skipped: u64,
    pub jobs_errored: u64,
    pub messages_undecodable: u64,
    pub dispatch_failures: u64,
    pub timeouts: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;
