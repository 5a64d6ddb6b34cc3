//! Error types for soe-clients

use thiserror::Error;

/// Errors raised while talking to the cluster API or the object store
#[derive(Error, Debug)]
pub enum ClientError {
    /// The remote API answered with a non-success status
    #[error("API request failed ({status}): {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure (connect, TLS, timeout)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Response body could not be decoded
    #[error("Decoding response failed: {0}")]
    Decode(String),

    /// Object key does not exist in the bucket
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Missing or invalid client configuration
    #[error("Invalid client configuration: {0}")]
    Config(String),

    /// IO error (token or CA bundle files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// HTTP status carried by an API rejection, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<quick_xml::DeError> for ClientError {
    fn from(err: quick_xml::DeError) -> Self {
        ClientError::Decode(err.to_string())
    }
}
