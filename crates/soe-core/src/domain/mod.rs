//! Domain models for SOE Runner.
//!
//! Canonical definitions for the entities the services exchange with callers:
//! - `RunRequest` / `Run`: a batch execution, as submitted and as observed
//! - `ModelArtifact`: a completed training output in the artifact bucket
//! - `PromotionResult`: the outcome of pointing serving config at an artifact

pub mod artifact;
pub mod error;
pub mod promotion;
pub mod run;

pub use artifact::{artifact_for_uri, newest_first, ModelArtifact};
pub use error::{Result, SoeError};
pub use promotion::{PromotionResult, PromotionStatus};
pub use run::{EdaArgs, Run, RunKind, RunPhase, RunReceipt, RunRequest, TrainArgs};
