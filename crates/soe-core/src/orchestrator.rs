//! Job orchestrator: submits batch runs and rebuilds their state on demand.
//!
//! Nothing is cached between calls. Every `status` query re-reads the job from
//! the cluster and derives the phase from what it sees.

use std::collections::BTreeMap;
use std::sync::Arc;

use soe_clients::{
    ClusterApi, Container, Job, JobSpec, JobStatus, ObjectMeta, PodSpec, PodTemplateSpec,
    RUNNER_CONTAINER,
};
use tracing::{debug, instrument, warn};

use crate::config::JobConfig;
use crate::domain::{Result, Run, RunPhase, RunRequest, SoeError};
use crate::metrics::METRICS;
use crate::naming;
use crate::obs;

/// Labels stamped on every job this service creates.
pub const JOB_LABELS: [(&str, &str); 2] = [
    ("app", "integration"),
    ("app.kubernetes.io/managed-by", "integration-api"),
];

/// Submits and inspects runs on the cluster scheduler.
pub struct JobOrchestrator {
    cluster: Arc<dyn ClusterApi>,
    config: JobConfig,
}

impl JobOrchestrator {
    pub fn new(cluster: Arc<dyn ClusterApi>, config: JobConfig) -> Self {
        Self { cluster, config }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Job resource for `request`, named after its kind and `short_id`.
    pub fn build_job(&self, short_id: &str, request: &RunRequest) -> Job {
        let labels: BTreeMap<String, String> = JOB_LABELS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let metadata = ObjectMeta {
            name: naming::job_name(request.kind(), short_id),
            namespace: None,
            labels,
        };
        let spec = JobSpec {
            ttl_seconds_after_finished: Some(self.config.ttl_seconds_after_finished),
            template: PodTemplateSpec {
                spec: PodSpec {
                    restart_policy: "Never".to_string(),
                    containers: vec![Container {
                        name: RUNNER_CONTAINER.to_string(),
                        image: self.config.image.clone(),
                        args: request.container_args(short_id),
                    }],
                },
            },
        };
        Job::new(metadata, spec)
    }

    /// Create the job for `request` and return its run id (the job name).
    ///
    /// Returns as soon as the cluster accepts the job. A rejection is
    /// returned as [`SoeError::Submission`] carrying the cluster's error.
    #[instrument(skip(self, request), fields(kind = %request.kind()))]
    pub async fn submit(&self, request: &RunRequest) -> Result<String> {
        let short_id = naming::generate_run_id();
        let job = self.build_job(&short_id, request);

        self.cluster
            .create_job(&job)
            .await
            .map_err(SoeError::Submission)?;

        METRICS.inc_runs_submitted();
        obs::emit_run_submitted(job.name(), request.kind(), &self.config.image);
        Ok(job.name().to_string())
    }

    /// Current snapshot of `run_id`.
    ///
    /// Never fails: an unknown id yields `NOT_FOUND`, and a cluster fault
    /// yields `ERROR` with the fault message in `logs_tail`.
    #[instrument(skip(self))]
    pub async fn status(&self, run_id: &str) -> Run {
        METRICS.inc_status_queries();
        match self.resolve(run_id).await {
            Ok(run) => {
                obs::emit_status_resolved(run_id, &run.phase);
                run
            }
            Err(err) => {
                obs::emit_status_failed(run_id, &err);
                let message = match &err {
                    SoeError::Query(inner) => inner.to_string(),
                    other => other.to_string(),
                };
                Run::query_error(run_id, naming::kind_of(run_id), message)
            }
        }
    }

    async fn resolve(&self, run_id: &str) -> Result<Run> {
        let candidates = naming::candidate_job_names(run_id);
        if candidates.is_empty() {
            debug!("run id cannot name a job, skipping lookup");
        }
        for (kind, job_name) in candidates {
            let Some(observed) = self.cluster.get_job(&job_name).await? else {
                debug!(job = %job_name, "no such job");
                continue;
            };

            let status = observed.status.as_ref();
            let mut run = Run::not_found(run_id);
            run.kind = Some(kind);
            run.phase = derive_phase(status);
            if let Some(status) = status {
                run.succeeded = status.succeeded.map(non_negative);
                run.failed = status.failed.map(non_negative);
                run.started_at = status.start_time;
                run.completed_at = status.completion_time;
            }
            run.logs_tail = self.tail_logs(&job_name).await;
            return Ok(run);
        }
        Ok(Run::not_found(run_id))
    }

    /// Last lines of the runner container's log, if any can be read.
    async fn tail_logs(&self, job_name: &str) -> Option<String> {
        let pod = match self.cluster.first_pod_for_job(job_name).await {
            Ok(Some(pod)) => pod,
            Ok(None) => return None,
            Err(err) => {
                warn!(job = %job_name, error = %err, "pod lookup failed, omitting logs");
                return None;
            }
        };

        match self
            .cluster
            .read_pod_log(&pod, RUNNER_CONTAINER, self.config.log_tail_lines)
            .await
        {
            Ok(log) => Some(log),
            Err(err) => {
                warn!(job = %job_name, pod = %pod, error = %err, "log read failed, omitting logs");
                None
            }
        }
    }
}

fn non_negative(count: i32) -> u32 {
    count.max(0) as u32
}

/// Phase of a job from its raw status block.
///
/// Counters take precedence over conditions: any failure wins, then any
/// success, then activity. Without counters the first true condition is
/// reported by its upper-cased type. A missing status block is `UNKNOWN`.
pub fn derive_phase(status: Option<&JobStatus>) -> RunPhase {
    let Some(status) = status else {
        return RunPhase::Unknown;
    };

    if status.failed.unwrap_or(0) > 0 {
        return RunPhase::Failed;
    }
    if status.succeeded.unwrap_or(0) > 0 {
        return RunPhase::Succeeded;
    }
    if status.active.unwrap_or(0) > 0 {
        return RunPhase::Running;
    }

    status
        .conditions
        .iter()
        .find(|condition| condition.is_true())
        .map(|condition| {
            condition
                .condition_type
                .to_ascii_uppercase()
                .parse()
                .unwrap_or(RunPhase::Unknown)
        })
        .unwrap_or(RunPhase::Pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use soe_clients::JobCondition;

    fn counters(active: i32, succeeded: i32, failed: i32) -> JobStatus {
        JobStatus {
            active: Some(active),
            succeeded: Some(succeeded),
            failed: Some(failed),
            ..JobStatus::default()
        }
    }

    #[test]
    fn failure_beats_success() {
        assert_eq!(derive_phase(Some(&counters(0, 1, 1))), RunPhase::Failed);
        assert_eq!(derive_phase(Some(&counters(1, 1, 0))), RunPhase::Succeeded);
        assert_eq!(derive_phase(Some(&counters(1, 0, 0))), RunPhase::Running);
    }

    #[test]
    fn empty_status_is_pending_and_missing_is_unknown() {
        assert_eq!(derive_phase(Some(&JobStatus::default())), RunPhase::Pending);
        assert_eq!(derive_phase(None), RunPhase::Unknown);
    }

    #[test]
    fn first_true_condition_is_upper_cased() {
        let status = JobStatus {
            conditions: vec![
                JobCondition::new("Failed", "False"),
                JobCondition::new("Suspended", "True"),
                JobCondition::new("Complete", "True"),
            ],
            ..JobStatus::default()
        };
        assert_eq!(
            derive_phase(Some(&status)),
            RunPhase::Condition("SUSPENDED".to_string())
        );
    }

    #[test]
    fn known_condition_names_map_to_phases() {
        let status = JobStatus {
            conditions: vec![JobCondition::new("Failed", "True")],
            ..JobStatus::default()
        };
        assert_eq!(derive_phase(Some(&status)), RunPhase::Failed);
    }

    #[test]
    fn negative_counters_clamp_to_zero() {
        assert_eq!(non_negative(-3), 0);
        assert_eq!(non_negative(4), 4);
    }
}
