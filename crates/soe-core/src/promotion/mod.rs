//! GitOps promotion: point the serving ConfigMap at a model artifact and
//! commit the change to the configuration repository.

pub mod git;
pub mod patch;
pub mod policy;

use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::config::GitOpsConfig;
use crate::domain::{PromotionResult, Result};
use crate::metrics::METRICS;
use crate::obs;

pub use git::{GitRepo, Identity};
pub use patch::{read_model_path, set_model_path};
pub use policy::{PolicyVerdict, PromotionPolicy};

/// Rewrites and commits the model key of one overlay's manifest.
///
/// Promotions through the same service run one at a time. Separate services
/// sharing a checkout are not coordinated.
pub struct PromotionService {
    config: GitOpsConfig,
    repo: GitRepo,
    identity: Identity,
    write_lock: Mutex<()>,
}

impl PromotionService {
    pub fn new(config: GitOpsConfig) -> Self {
        let repo = GitRepo::new(config.repo_path.clone());
        let identity = Identity {
            name: config.bot_name.clone(),
            email: config.bot_email.clone(),
        };
        Self {
            config,
            repo,
            identity,
            write_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &GitOpsConfig {
        &self.config
    }

    /// Point the manifest at `model_uri` and commit it.
    ///
    /// Never fails: every fault, including git exiting non-zero, comes back
    /// as an `ERROR` result carrying the underlying message.
    #[instrument(skip(self))]
    pub async fn promote(&self, model_uri: &str) -> PromotionResult {
        let _guard = self.write_lock.lock().await;

        let result = match self.apply(model_uri).await {
            Ok(result) => result,
            Err(err) => PromotionResult::error(err.to_string()),
        };

        obs::emit_promotion(model_uri, result.status, &result.message);
        result
    }

    async fn apply(&self, model_uri: &str) -> Result<PromotionResult> {
        // The value lands in a double-quoted YAML scalar, where `\` starts an
        // escape sequence.
        if model_uri.trim().is_empty() || model_uri.contains(['"', '\\', '\n', '\r']) {
            return Ok(PromotionResult::error(format!(
                "invalid model uri: {model_uri:?}"
            )));
        }

        let manifest_path = self.config.manifest_path();
        if !tokio::fs::try_exists(&manifest_path).await? {
            return Ok(PromotionResult::error(format!(
                "manifest not found: {}",
                manifest_path.display()
            )));
        }

        let key = &self.config.model_key;
        let current = tokio::fs::read_to_string(&manifest_path).await?;
        let patched = set_model_path(&current, key, model_uri, &self.config.config_map_name)?;
        if patched == current {
            return Ok(PromotionResult::noop(format!("{key} already set")));
        }

        tokio::fs::write(&manifest_path, patched.as_bytes()).await?;
        debug!(path = %manifest_path.display(), "manifest rewritten");

        let tracked = self.config.manifest_repo_path();
        self.repo.add(&tracked).await?;
        if self.repo.is_clean(&tracked).await? {
            // Staged content already matches HEAD: reported as an update that
            // produced no commit.
            return Ok(PromotionResult::updated("No changes"));
        }

        let message = format!("chore: promote model {model_uri}");
        self.repo
            .commit_as(&self.identity, &tracked, &message)
            .await?;
        let sha = self.repo.head_sha().await?;
        METRICS.inc_promotions_committed();
        Ok(PromotionResult::updated(format!("commit {sha}")))
    }

    /// Model the manifest currently points at, if any.
    ///
    /// A missing manifest reads as no current model.
    pub async fn current_model_uri(&self) -> Result<Option<String>> {
        let manifest_path = self.config.manifest_path();
        if !tokio::fs::try_exists(&manifest_path).await? {
            return Ok(None);
        }
        let text = tokio::fs::read_to_string(&manifest_path).await?;
        read_model_path(&text, &self.config.model_key)
    }
}
