//! Model artifacts observed in the artifact bucket.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One completed training output, located by its storage prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelArtifact {
    pub model_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metrics: BTreeMap<String, Value>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl ModelArtifact {
    /// Numeric metric by name; non-numeric values read as `None`.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).and_then(Value::as_f64)
    }

    /// Whether `uri` names this artifact or something stored beneath it,
    /// e.g. `s3://models/run-41/model.onnx` for `s3://models/run-41`.
    /// Trailing slashes on either side are ignored.
    pub fn contains_uri(&self, uri: &str) -> bool {
        let root = self.model_uri.trim_end_matches('/');
        let uri = uri.trim_end_matches('/');
        match uri.strip_prefix(root) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Artifact a serving config pointing at `uri` refers to.
///
/// When artifact prefixes nest, the deepest one containing `uri` wins.
pub fn artifact_for_uri<'a>(
    artifacts: &'a [ModelArtifact],
    uri: &str,
) -> Option<&'a ModelArtifact> {
    artifacts
        .iter()
        .filter(|artifact| artifact.contains_uri(uri))
        .max_by_key(|artifact| artifact.model_uri.trim_end_matches('/').len())
}

/// Newest first. Artifacts without a timestamp go last, keeping their
/// relative order under a stable sort.
pub fn newest_first(a: &ModelArtifact, b: &ModelArtifact) -> Ordering {
    match (a.created_at, b.created_at) {
        (Some(left), Some(right)) => right.cmp(&left),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
