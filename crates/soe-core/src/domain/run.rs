//! Runs: what gets submitted and what a status query reports back.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Default output root for EDA reports.
pub const DEFAULT_EDA_OUTPUT: &str = "/out";

/// Default column checked for outliers by the EDA program.
pub const DEFAULT_OUTLIERS_COLUMN: &str = "charges";

/// Kind of batch execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Eda,
    Train,
}

impl RunKind {
    pub const ALL: [RunKind; 2] = [RunKind::Eda, RunKind::Train];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Eda => "eda",
            RunKind::Train => "train",
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs of an exploratory-data-analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdaArgs {
    pub dataset_path: String,
    pub output_path: String,
    pub outliers_col: String,
}

impl EdaArgs {
    pub fn new(dataset_path: impl Into<String>) -> Self {
        Self {
            dataset_path: dataset_path.into(),
            output_path: DEFAULT_EDA_OUTPUT.to_string(),
            outliers_col: DEFAULT_OUTLIERS_COLUMN.to_string(),
        }
    }

    pub fn with_output_path(mut self, output_path: impl Into<String>) -> Self {
        self.output_path = output_path.into();
        self
    }

    pub fn with_outliers_col(mut self, outliers_col: impl Into<String>) -> Self {
        self.outliers_col = outliers_col.into();
        self
    }
}

/// Inputs of a training run. `params` is handed to the trainer as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainArgs {
    pub dataset_path: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl TrainArgs {
    pub fn new(dataset_path: impl Into<String>) -> Self {
        Self {
            dataset_path: dataset_path.into(),
            params: Map::new(),
        }
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }
}

/// A run to submit: one case per kind, each with its own typed inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RunRequest {
    Eda(EdaArgs),
    Train(TrainArgs),
}

impl RunRequest {
    pub fn kind(&self) -> RunKind {
        match self {
            RunRequest::Eda(_) => RunKind::Eda,
            RunRequest::Train(_) => RunKind::Train,
        }
    }

    /// Positional arguments of the runner container for this request.
    ///
    /// `short_id` namespaces the EDA output directory per run.
    pub fn container_args(&self, short_id: &str) -> Vec<String> {
        match self {
            RunRequest::Eda(args) => vec![
                "python".to_string(),
                "/app/eda.py".to_string(),
                "--input".to_string(),
                args.dataset_path.clone(),
                "--output".to_string(),
                format!("{}/{}", args.output_path.trim_end_matches('/'), short_id),
                "--outliers-col".to_string(),
                args.outliers_col.clone(),
            ],
            RunRequest::Train(args) => vec![
                "python".to_string(),
                "/app/train.py".to_string(),
                "--dataset".to_string(),
                args.dataset_path.clone(),
                "--params".to_string(),
                Value::Object(args.params.clone()).to_string(),
            ],
        }
    }
}

/// Canonical lifecycle state of a run, derived at query time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RunPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    NotFound,
    Unknown,
    /// The status query itself failed.
    Error,
    /// A true job condition outside the phases above, upper-cased.
    Condition(String),
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Pending => f.write_str("PENDING"),
            RunPhase::Running => f.write_str("RUNNING"),
            RunPhase::Succeeded => f.write_str("SUCCEEDED"),
            RunPhase::Failed => f.write_str("FAILED"),
            RunPhase::NotFound => f.write_str("NOT_FOUND"),
            RunPhase::Unknown => f.write_str("UNKNOWN"),
            RunPhase::Error => f.write_str("ERROR"),
            RunPhase::Condition(name) => f.write_str(name),
        }
    }
}

impl FromStr for RunPhase {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "PENDING" => RunPhase::Pending,
            "RUNNING" => RunPhase::Running,
            "SUCCEEDED" => RunPhase::Succeeded,
            "FAILED" => RunPhase::Failed,
            "NOT_FOUND" => RunPhase::NotFound,
            "UNKNOWN" => RunPhase::Unknown,
            "ERROR" => RunPhase::Error,
            other => RunPhase::Condition(other.to_string()),
        })
    }
}

impl Serialize for RunPhase {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RunPhase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or(RunPhase::Unknown))
    }
}

/// Snapshot of one run, rebuilt from the cluster on every status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<RunKind>,
    pub phase: RunPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub succeeded: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "finishedAt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_tail: Option<String>,
}

impl Run {
    fn bare(run_id: &str, kind: Option<RunKind>, phase: RunPhase) -> Self {
        Self {
            run_id: run_id.to_string(),
            kind,
            phase,
            succeeded: None,
            failed: None,
            started_at: None,
            completed_at: None,
            logs_tail: None,
        }
    }

    /// No job exists under any name this id resolves to.
    pub fn not_found(run_id: &str) -> Self {
        Self::bare(run_id, None, RunPhase::NotFound)
    }

    /// The query failed; `message` explains why.
    pub fn query_error(run_id: &str, kind: Option<RunKind>, message: impl Into<String>) -> Self {
        let mut run = Self::bare(run_id, kind, RunPhase::Error);
        run.logs_tail = Some(message.into());
        run
    }
}

/// Acknowledgement handed back to the caller after a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReceipt {
    pub run_id: String,
    pub status: String,
    pub message: String,
}

impl RunReceipt {
    pub fn submitted(run_id: impl Into<String>, kind: RunKind) -> Self {
        let message = match kind {
            RunKind::Eda => "EDA job submitted",
            RunKind::Train => "Training job submitted",
        };
        Self {
            run_id: run_id.into(),
            status: "SUBMITTED".to_string(),
            message: message.to_string(),
        }
    }
}
