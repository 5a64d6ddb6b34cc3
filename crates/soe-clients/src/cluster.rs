//! Cluster scheduler boundary
//!
//! Wire types mirror the subset of the Kubernetes `batch/v1` Job and `v1` Pod
//! resources this workspace reads and writes. Unknown fields returned by the
//! API server are ignored on decode.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ClientResult;

/// Name of the single container every submitted job runs.
pub const RUNNER_CONTAINER: &str = "runner";

/// Label the job controller stamps on every pod it creates.
pub const JOB_NAME_LABEL: &str = "job-name";

/// Object metadata (name, labels).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// A single container of a pod template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    pub restart_policy: String,
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodTemplateSpec {
    pub spec: PodSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds_after_finished: Option<i32>,
    pub template: PodTemplateSpec,
}

/// A `batch/v1` Job as submitted to the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: JobSpec,
}

impl Job {
    pub fn new(metadata: ObjectMeta, spec: JobSpec) -> Self {
        Job {
            api_version: "batch/v1".to_string(),
            kind: "Job".to_string(),
            metadata,
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

/// A condition reported on a job (`Complete`, `Failed`, `Suspended`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl JobCondition {
    pub fn new(condition_type: impl Into<String>, status: impl Into<String>) -> Self {
        JobCondition {
            condition_type: condition_type.into(),
            status: status.into(),
            reason: None,
            message: None,
        }
    }

    /// Whether the condition currently holds (status `"True"`, case-insensitive).
    pub fn is_true(&self) -> bool {
        self.status.eq_ignore_ascii_case("true")
    }
}

/// Raw job counters and timestamps as reported by the job controller.
///
/// Every field is optional: a freshly created job reports an empty status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub succeeded: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<JobCondition>,
}

/// A job read back from the cluster: metadata plus its observed status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobObservation {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: Option<JobStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PodList {
    #[serde(default)]
    pub items: Vec<PodItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PodItem {
    pub metadata: ObjectMeta,
}

/// Cluster scheduler operations used by the job orchestrator.
///
/// Implementations must be safe to share across tasks; none of the calls
/// carries its own timeout.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Create a job. Rejections (quota, validation, name clash) surface as
    /// `ClientError::Api`.
    async fn create_job(&self, job: &Job) -> ClientResult<()>;

    /// Fetch a job by name. Returns `Ok(None)` when it does not exist.
    async fn get_job(&self, name: &str) -> ClientResult<Option<JobObservation>>;

    /// Name of the first pod labelled with `job-name=<job_name>`, if any.
    async fn first_pod_for_job(&self, job_name: &str) -> ClientResult<Option<String>>;

    /// Last `tail_lines` lines of a container's log.
    async fn read_pod_log(
        &self,
        pod_name: &str,
        container: &str,
        tail_lines: u32,
    ) -> ClientResult<String>;
}
