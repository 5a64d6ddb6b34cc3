//! Structured lifecycle events.
//!
//! Every event carries an `event = "<area>.<what>"` field so log pipelines can
//! filter on it regardless of message text.

use tracing::{info, warn};

use crate::domain::{PromotionStatus, RunKind, RunPhase};

pub fn emit_run_submitted(run_id: &str, kind: RunKind, image: &str) {
    info!(event = "run.submitted", run_id = %run_id, kind = %kind, image = %image);
}

pub fn emit_status_resolved(run_id: &str, phase: &RunPhase) {
    info!(event = "run.status_resolved", run_id = %run_id, phase = %phase);
}

pub fn emit_status_failed(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.status_failed", run_id = %run_id, error = %error);
}

pub fn emit_registry_scanned(bucket: &str, prefixes_scanned: usize, artifacts: usize) {
    info!(
        event = "registry.scanned",
        bucket = %bucket,
        prefixes_scanned = prefixes_scanned,
        artifacts = artifacts,
    );
}

pub fn emit_promotion(model_uri: &str, status: PromotionStatus, message: &str) {
    if status == PromotionStatus::Error {
        warn!(event = "promotion.finished", model_uri = %model_uri, status = ?status, message = %message);
    } else {
        info!(event = "promotion.finished", model_uri = %model_uri, status = ?status, message = %message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_emit_without_a_subscriber() {
        emit_status_resolved("eda-run-abcd1234", &RunPhase::Pending);
        emit_promotion("s3://models/run-1", PromotionStatus::Error, "boom");
    }
}
