//! SOE Clients: cluster and object-store access for SOE Runner
//!
//! This crate owns every byte that crosses the process boundary towards the
//! cluster scheduler and the artifact bucket. Higher layers only see the
//! [`ClusterApi`] and [`ObjectStore`] traits.
//!
//! ## Layer 0 - External collaborators
//!
//! Focus: faithful wire formats and explicit, owned client handles.
//!
//! ## Key Components
//!
//! - `KubeClient`: `batch/v1` Jobs, pod lookup and log tailing over HTTPS
//! - `S3Client`: SigV4-signed `ListObjectsV2`, `GetObject`, `GetObjectTagging`
//! - `fakes`: in-memory `MemoryCluster` and `MemoryObjectStore` for tests

pub mod cluster;
mod error;
pub mod fakes;
pub mod kube;
pub mod object_store;
pub mod s3;

pub use cluster::{
    ClusterApi, Container, Job, JobCondition, JobObservation, JobSpec, JobStatus, ObjectMeta,
    PodSpec, PodTemplateSpec, JOB_NAME_LABEL, RUNNER_CONTAINER,
};
pub use error::ClientError;
pub use kube::{ClusterConfig, KubeClient};
pub use object_store::{ListPage, ObjectStore, ObjectSummary};
pub use s3::{ObjectStoreConfig, S3Client};

/// Result type for client operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;
