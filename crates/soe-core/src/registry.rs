//! Model registry: the catalogue of finished training outputs.
//!
//! A prefix holds a model artifact when it contains the metrics manifest
//! (`metrics.json` by default). The bucket is walked breadth-first with a `/`
//! delimiter, following continuation tokens and descending into every common
//! prefix. Read faults degrade the listing instead of failing it.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde_json::Value;
use soe_clients::{ObjectStore, ObjectSummary};
use tracing::{debug, instrument, warn};

use crate::config::RegistryConfig;
use crate::domain::{newest_first, ModelArtifact, Result};
use crate::metrics::METRICS;
use crate::obs;

const DELIMITER: &str = "/";

pub struct ModelRegistry {
    store: Arc<dyn ObjectStore>,
    config: RegistryConfig,
}

impl ModelRegistry {
    pub fn new(store: Arc<dyn ObjectStore>, config: RegistryConfig) -> Self {
        Self { store, config }
    }

    /// Every artifact in the bucket, newest first.
    ///
    /// Never fails. A prefix whose listing breaks is skipped (with a warning),
    /// so the result may be partial.
    #[instrument(skip(self), fields(bucket = %self.store.bucket()))]
    pub async fn list(&self) -> Vec<ModelArtifact> {
        let (manifests, prefixes_scanned) = self.find_manifests().await;

        let mut artifacts: Vec<ModelArtifact> = stream::iter(manifests)
            .map(|manifest| self.describe(manifest))
            .buffered(self.config.fetch_concurrency.max(1))
            .collect()
            .await;
        artifacts.sort_by(newest_first);

        METRICS.add_artifacts_listed(artifacts.len() as u64);
        obs::emit_registry_scanned(self.store.bucket(), prefixes_scanned, artifacts.len());
        artifacts
    }

    async fn find_manifests(&self) -> (Vec<ObjectSummary>, usize) {
        let mut manifests = Vec::new();
        let mut queue = VecDeque::from([String::new()]);
        let mut seen = HashSet::new();
        let mut scanned = 0;

        while let Some(prefix) = queue.pop_front() {
            if !seen.insert(prefix.clone()) {
                continue;
            }
            scanned += 1;

            let mut children = Vec::new();
            if let Err(err) = self
                .scan_prefix(&prefix, &mut manifests, &mut children)
                .await
            {
                warn!(prefix = %prefix, error = %err, "listing failed, skipping prefix");
            }
            queue.extend(children);
        }
        (manifests, scanned)
    }

    /// Walk every page under `prefix`. Whatever was collected before a
    /// failure is kept.
    async fn scan_prefix(
        &self,
        prefix: &str,
        manifests: &mut Vec<ObjectSummary>,
        children: &mut Vec<String>,
    ) -> Result<()> {
        let mut token: Option<String> = None;
        loop {
            let page = self
                .store
                .list_objects_v2(prefix, Some(DELIMITER), token.as_deref())
                .await?;

            manifests.extend(
                page.objects
                    .into_iter()
                    .filter(|object| object.file_name() == self.config.manifest_name),
            );
            children.extend(
                page.common_prefixes
                    .into_iter()
                    .filter(|child| child != prefix),
            );

            match page.next_continuation_token {
                Some(next) if token.as_deref() != Some(next.as_str()) => token = Some(next),
                _ => return Ok(()),
            }
        }
    }

    async fn describe(&self, manifest: ObjectSummary) -> ModelArtifact {
        let model_uri = match manifest.parent_prefix() {
            Some(parent) => format!("s3://{}/{}", self.store.bucket(), parent),
            None => format!("s3://{}", self.store.bucket()),
        };
        let metrics = self.read_metrics(&manifest.key).await;
        let tags = match self.store.get_object_tagging(&manifest.key).await {
            Ok(tags) => tags,
            Err(err) => {
                debug!(key = %manifest.key, error = %err, "no tags");
                BTreeMap::new()
            }
        };

        ModelArtifact {
            model_uri,
            created_at: manifest.last_modified,
            metrics,
            tags,
        }
    }

    async fn read_metrics(&self, key: &str) -> BTreeMap<String, Value> {
        let body = match self.store.get_object(key).await {
            Ok(body) => body,
            Err(err) => {
                warn!(key = %key, error = %err, "metrics manifest unreadable");
                return BTreeMap::new();
            }
        };
        if body.iter().all(u8::is_ascii_whitespace) {
            return BTreeMap::new();
        }
        match serde_json::from_slice(&body) {
            Ok(metrics) => metrics,
            Err(err) => {
                warn!(key = %key, error = %err, "metrics manifest is not a JSON object");
                BTreeMap::new()
            }
        }
    }
}
