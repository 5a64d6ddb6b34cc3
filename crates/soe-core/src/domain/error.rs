//! Domain-level error taxonomy for SOE Runner.
//!
//! Only submission errors and configuration errors ever reach a caller of the
//! services; the read paths and the promotion path fold everything else into
//! their result types.

use soe_clients::ClientError;

/// SOE Runner domain errors.
#[derive(Debug, thiserror::Error)]
pub enum SoeError {
    /// The cluster refused to create the job (quota, validation, name clash).
    #[error("job submission rejected: {0}")]
    Submission(#[source] ClientError),

    /// Cluster or object-store communication failed during a read.
    #[error("query fault: {0}")]
    Query(#[from] ClientError),

    /// A git command exited non-zero or could not be spawned.
    #[error("git error: {0}")]
    Git(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid manifest pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for SOE Runner domain operations.
pub type Result<T> = std::result::Result<T, SoeError>;
