//! Object store boundary
//!
//! Models the S3 `ListObjectsV2`, `GetObject` and `GetObjectTagging` calls the
//! model registry relies on, independent of any particular backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ClientResult;

/// One object entry of a listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub key: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub size: u64,
}

impl ObjectSummary {
    /// Final `/`-separated segment of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// Key without its final segment, or `None` for keys at the bucket root.
    pub fn parent_prefix(&self) -> Option<&str> {
        self.key.rsplit_once('/').map(|(parent, _)| parent)
    }
}

/// One page of a delimited listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    /// Sub-prefixes rolled up by the delimiter (each ends with the delimiter).
    pub common_prefixes: Vec<String>,
    /// Present while more pages remain.
    pub next_continuation_token: Option<String>,
}

/// Read-only object store operations.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket this store reads from.
    fn bucket(&self) -> &str;

    /// List one page of keys under `prefix`, rolled up by `delimiter`.
    async fn list_objects_v2(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
    ) -> ClientResult<ListPage>;

    /// Full body of an object. `ClientError::ObjectNotFound` if absent.
    async fn get_object(&self, key: &str) -> ClientResult<Vec<u8>>;

    /// Object-level tag set.
    async fn get_object_tagging(&self, key: &str) -> ClientResult<BTreeMap<String, String>>;
}
