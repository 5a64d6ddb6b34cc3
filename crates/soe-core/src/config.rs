//! Service configuration.
//!
//! Every service gets its own config struct with sensible defaults and a
//! `from_env()` constructor reading `SOE_*` variables, so a binary only has
//! to provide what the commands it runs actually need.

use std::path::PathBuf;

use crate::domain::{Result, SoeError};

pub use soe_clients::{ClusterConfig, ObjectStoreConfig};

/// Seconds a finished job lingers before the cluster garbage-collects it.
pub const DEFAULT_JOB_TTL_SECONDS: i32 = 1800;

/// Lines of runner output attached to a status snapshot.
pub const DEFAULT_LOG_TAIL_LINES: u32 = 100;

/// File under the overlay directory that holds the serving ConfigMap.
pub const DEFAULT_MANIFEST_FILE: &str = "configmaps.yaml";

/// Object whose presence marks a prefix as a complete model artifact.
pub const DEFAULT_METRICS_MANIFEST: &str = "metrics.json";

fn required(key: &str) -> Result<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(SoeError::Config(format!("{key} is not set"))),
    }
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Job orchestrator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    /// Image of the EDA/training worker.
    pub image: String,
    pub ttl_seconds_after_finished: i32,
    pub log_tail_lines: u32,
}

impl JobConfig {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ttl_seconds_after_finished: DEFAULT_JOB_TTL_SECONDS,
            log_tail_lines: DEFAULT_LOG_TAIL_LINES,
        }
    }

    /// Reads `SOE_K8S_JOB_IMAGE` (required).
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(required("SOE_K8S_JOB_IMAGE")?))
    }
}

/// Model registry settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    pub manifest_name: String,
    /// Manifests fetched concurrently while building artifact records.
    pub fetch_concurrency: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            manifest_name: DEFAULT_METRICS_MANIFEST.to_string(),
            fetch_concurrency: 8,
        }
    }
}

/// GitOps promotion settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GitOpsConfig {
    /// Root of the checked-out configuration repository.
    pub repo_path: PathBuf,
    /// Overlay directory, relative to `repo_path`.
    pub overlay_path: PathBuf,
    pub manifest_file: String,
    /// ConfigMap entry created when the model key is missing.
    pub config_map_name: String,
    pub model_key: String,
    pub bot_name: String,
    pub bot_email: String,
}

impl GitOpsConfig {
    pub fn new(repo_path: impl Into<PathBuf>, overlay_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            overlay_path: overlay_path.into(),
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
            config_map_name: "inference-cm".to_string(),
            model_key: "MODEL_PATH".to_string(),
            bot_name: "integration-bot".to_string(),
            bot_email: "integration@example.com".to_string(),
        }
    }

    /// Reads `SOE_GITOPS_REPO_PATH` and `SOE_GITOPS_OVERLAY_PATH` (required),
    /// `SOE_GITOPS_CM_NAME` and `SOE_GITOPS_MODEL_KEY` (optional).
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new(
            required("SOE_GITOPS_REPO_PATH")?,
            required("SOE_GITOPS_OVERLAY_PATH")?,
        );
        if let Some(name) = optional("SOE_GITOPS_CM_NAME") {
            config.config_map_name = name;
        }
        if let Some(key) = optional("SOE_GITOPS_MODEL_KEY") {
            config.model_key = key;
        }
        Ok(config)
    }

    /// Absolute path of the manifest the promotion rewrites.
    pub fn manifest_path(&self) -> PathBuf {
        self.repo_path
            .join(&self.overlay_path)
            .join(&self.manifest_file)
    }

    /// Manifest path relative to the repository root, as git expects it.
    pub fn manifest_repo_path(&self) -> PathBuf {
        self.overlay_path.join(&self.manifest_file)
    }
}
