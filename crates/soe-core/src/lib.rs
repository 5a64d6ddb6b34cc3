//! SOE Runner core library
//!
//! Orchestration core of the EDA/training pipeline: submits batch runs to the
//! cluster, catalogues trained model artifacts, and promotes a chosen artifact
//! into the serving configuration through git.

pub mod config;
pub mod domain;
pub mod metrics;
pub mod naming;
pub mod obs;
pub mod orchestrator;
pub mod promotion;
pub mod registry;
pub mod telemetry;

pub use config::{GitOpsConfig, JobConfig, RegistryConfig};
pub use domain::{
    artifact_for_uri, newest_first, EdaArgs, ModelArtifact, PromotionResult, PromotionStatus,
    Result, Run, RunKind, RunPhase, RunReceipt, RunRequest, SoeError, TrainArgs,
};
pub use orchestrator::{derive_phase, JobOrchestrator};
pub use promotion::{PolicyVerdict, PromotionPolicy, PromotionService};
pub use registry::ModelRegistry;

pub use soe_clients::{ClusterConfig, KubeClient, ObjectStoreConfig, S3Client};

/// Version string stamped into logs and the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
