//! Process-wide counters.
//!
//! Incremented at the call site; [`Metrics::flush`] reports them as one
//! `info!` event, typically right before a command exits.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    runs_submitted: AtomicU64,
    status_queries: AtomicU64,
    artifacts_listed: AtomicU64,
    promotions_committed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs_submitted: AtomicU64::new(0),
            status_queries: AtomicU64::new(0),
            artifacts_listed: AtomicU64::new(0),
            promotions_committed: AtomicU64::new(0),
        }
    }

    pub fn inc_runs_submitted(&self) {
        self.runs_submitted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_submitted", "counter incremented");
    }

    pub fn inc_status_queries(&self) {
        self.status_queries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "status_queries", "counter incremented");
    }

    /// Adds `count` artifacts returned by a registry listing.
    pub fn add_artifacts_listed(&self, count: u64) {
        self.artifacts_listed.fetch_add(count, Ordering::Relaxed);
        tracing::trace!(metric = "artifacts_listed", count, "counter incremented");
    }

    pub fn inc_promotions_committed(&self) {
        self.promotions_committed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "promotions_committed", "counter incremented");
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            runs_submitted = self.runs_submitted(),
            status_queries = self.status_queries(),
            artifacts_listed = self.artifacts_listed(),
            promotions_committed = self.promotions_committed(),
        );
    }

    pub fn runs_submitted(&self) -> u64 {
        self.runs_submitted.load(Ordering::Relaxed)
    }

    pub fn status_queries(&self) -> u64 {
        self.status_queries.load(Ordering::Relaxed)
    }

    pub fn artifacts_listed(&self) -> u64 {
        self.artifacts_listed.load(Ordering::Relaxed)
    }

    pub fn promotions_committed(&self) -> u64 {
        self.promotions_committed.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.runs_submitted.store(0, Ordering::Relaxed);
        self.status_queries.store(0, Ordering::Relaxed);
        self.artifacts_listed.store(0, Ordering::Relaxed);
        self.promotions_committed.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_runs_submitted();
        m.inc_runs_submitted();
        m.inc_status_queries();
        m.add_artifacts_listed(5);
        m.add_artifacts_listed(2);
        m.inc_promotions_committed();

        assert_eq!(m.runs_submitted(), 2);
        assert_eq!(m.status_queries(), 1);
        assert_eq!(m.artifacts_listed(), 7);
        assert_eq!(m.promotions_committed(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_runs_submitted();
        m.add_artifacts_listed(3);
        m.reset();
        assert_eq!(m.runs_submitted(), 0);
        assert_eq!(m.artifacts_listed(), 0);
    }
}
