//! Kubernetes API client
//!
//! Talks to the API server over HTTPS with a pre-provisioned bearer token.
//! Credential provisioning is out of scope: the token and CA bundle are read
//! from configuration (by default the in-cluster service-account mount).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::cluster::{ClusterApi, Job, JobObservation, PodList, JOB_NAME_LABEL};
use crate::error::ClientError;
use crate::ClientResult;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";
const IN_CLUSTER_API_URL: &str = "https://kubernetes.default.svc";

/// Cluster connection settings
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    /// API server base URL
    pub api_url: String,
    /// Namespace jobs are created in
    pub namespace: String,
    /// Bearer token (takes precedence over `token_file`)
    pub token: Option<String>,
    /// File holding the bearer token
    pub token_file: Option<PathBuf>,
    /// PEM bundle used to verify the API server certificate
    pub ca_file: Option<PathBuf>,
}

impl ClusterConfig {
    /// Config for an explicit API server and namespace, without credentials.
    pub fn new(api_url: impl Into<String>, namespace: impl Into<String>) -> Self {
        ClusterConfig {
            api_url: api_url.into(),
            namespace: namespace.into(),
            token: None,
            token_file: None,
            ca_file: None,
        }
    }

    /// Build from `SOE_K8S_*` variables, falling back to the in-cluster
    /// service-account mount for namespace, token and CA bundle.
    pub fn from_env() -> ClientResult<Self> {
        let sa_dir = Path::new(SERVICE_ACCOUNT_DIR);
        let api_url =
            std::env::var("SOE_K8S_API_URL").unwrap_or_else(|_| IN_CLUSTER_API_URL.to_string());

        let namespace = match std::env::var("SOE_K8S_NAMESPACE") {
            Ok(ns) if !ns.trim().is_empty() => ns,
            _ => std::fs::read_to_string(sa_dir.join("namespace"))
                .map(|ns| ns.trim().to_string())
                .map_err(|_| {
                    ClientError::Config(
                        "SOE_K8S_NAMESPACE is not set and no service-account namespace is mounted"
                            .to_string(),
                    )
                })?,
        };

        let token_file = std::env::var("SOE_K8S_TOKEN_FILE")
            .map(PathBuf::from)
            .ok()
            .or_else(|| Some(sa_dir.join("token")).filter(|p| p.exists()));
        let ca_file = std::env::var("SOE_K8S_CA_FILE")
            .map(PathBuf::from)
            .ok()
            .or_else(|| Some(sa_dir.join("ca.crt")).filter(|p| p.exists()));

        Ok(ClusterConfig {
            api_url,
            namespace,
            token: std::env::var("SOE_K8S_TOKEN").ok(),
            token_file,
            ca_file,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    fn resolve_token(&self) -> ClientResult<Option<String>> {
        if let Some(token) = &self.token {
            return Ok(Some(token.clone()));
        }
        match &self.token_file {
            Some(path) => Ok(Some(std::fs::read_to_string(path)?.trim().to_string())),
            None => Ok(None),
        }
    }
}

/// `metav1.Status` body returned with API errors.
#[derive(Debug, Deserialize)]
struct ApiStatus {
    message: Option<String>,
}

/// HTTP client for the Kubernetes API server
pub struct KubeClient {
    config: ClusterConfig,
    token: Option<String>,
    http_client: reqwest::Client,
}

impl KubeClient {
    /// Create a client. Reads the token and CA bundle once, up front.
    pub fn new(config: ClusterConfig) -> ClientResult<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("soe-runner/", env!("CARGO_PKG_VERSION")));

        if let Some(ca_file) = &config.ca_file {
            let pem = std::fs::read(ca_file)?;
            let cert = reqwest::Certificate::from_pem(&pem)?;
            builder = builder.add_root_certificate(cert);
        }

        let token = config.resolve_token()?;
        let http_client = builder.build()?;

        Ok(KubeClient {
            config,
            token,
            http_client,
        })
    }

    /// Release the connection pool. Call once at process teardown.
    pub fn shutdown(self) {
        info!(api_url = %self.config.api_url, "Closing cluster client");
    }

    fn jobs_url(&self) -> String {
        format!(
            "{}/apis/batch/v1/namespaces/{}/jobs",
            self.config.api_url.trim_end_matches('/'),
            self.config.namespace
        )
    }

    fn pods_url(&self) -> String {
        format!(
            "{}/api/v1/namespaces/{}/pods",
            self.config.api_url.trim_end_matches('/'),
            self.config.namespace
        )
    }

    /// `base` extended by `segments`, each percent-encoded as a single path
    /// segment so a name can never climb out of its collection.
    fn member_url(base: &str, segments: &[&str]) -> ClientResult<reqwest::Url> {
        let mut url = reqwest::Url::parse(base)
            .map_err(|e| ClientError::Config(format!("invalid API URL {base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Config(format!("API URL {base} cannot hold a path")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn api_error(response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiStatus>(&body)
            .ok()
            .and_then(|s| s.message)
            .unwrap_or(body);
        ClientError::Api { status, message }
    }
}

#[async_trait]
impl ClusterApi for KubeClient {
    #[instrument(skip(self, job), fields(job = %job.name(), namespace = %self.config.namespace))]
    async fn create_job(&self, job: &Job) -> ClientResult<()> {
        let response = self
            .authorize(self.http_client.post(self.jobs_url()))
            .json(job)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        debug!("Job accepted by API server");
        Ok(())
    }

    async fn get_job(&self, name: &str) -> ClientResult<Option<JobObservation>> {
        let url = Self::member_url(&self.jobs_url(), &[name])?;
        let response = self.authorize(self.http_client.get(url)).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let body = response.bytes().await?;
        Ok(Some(serde_json::from_slice(&body)?))
    }

    async fn first_pod_for_job(&self, job_name: &str) -> ClientResult<Option<String>> {
        let selector = format!("{JOB_NAME_LABEL}={job_name}");
        let response = self
            .authorize(self.http_client.get(self.pods_url()))
            .query(&[("labelSelector", selector.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let pods: PodList = serde_json::from_slice(&response.bytes().await?)?;
        Ok(pods.items.into_iter().next().map(|pod| pod.metadata.name))
    }

    async fn read_pod_log(
        &self,
        pod_name: &str,
        container: &str,
        tail_lines: u32,
    ) -> ClientResult<String> {
        let url = Self::member_url(&self.pods_url(), &[pod_name, "log"])?;
        let tail = tail_lines.to_string();
        let response = self
            .authorize(self.http_client.get(url))
            .query(&[("container", container), ("tailLines", tail.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_namespaced() {
        let client = KubeClient::new(ClusterConfig::new("https://k8s.local:6443/", "ml")).unwrap();
        assert_eq!(
            client.jobs_url(),
            "https://k8s.local:6443/apis/batch/v1/namespaces/ml/jobs"
        );
        assert_eq!(client.pods_url(), "https://k8s.local:6443/api/v1/namespaces/ml/pods");
    }

    #[test]
    fn member_names_stay_inside_their_collection() {
        let client = KubeClient::new(ClusterConfig::new("https://k8s.local:6443/", "ml")).unwrap();

        let url = KubeClient::member_url(&client.jobs_url(), &["eda-run-ab12cd34"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://k8s.local:6443/apis/batch/v1/namespaces/ml/jobs/eda-run-ab12cd34"
        );

        let url = KubeClient::member_url(
            &client.jobs_url(),
            &["eda-run-x/../../../../../../api/v1/namespaces/ml/secrets/db"],
        )
        .unwrap();
        assert!(url.path().starts_with("/apis/batch/v1/namespaces/ml/jobs/"));
        assert!(url.path().contains("%2F"));
        assert!(!url.path().contains("/secrets/"));

        let url = KubeClient::member_url(&client.pods_url(), &["pod-1", "log"]).unwrap();
        assert_eq!(url.path(), "/api/v1/namespaces/ml/pods/pod-1/log");
    }

    #[test]
    fn explicit_token_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token");
        std::fs::write(&token_path, "from-file\n").unwrap();

        let mut config = ClusterConfig::new("https://k8s.local", "ml");
        config.token_file = Some(token_path.clone());
        assert_eq!(config.resolve_token().unwrap().as_deref(), Some("from-file"));

        let config = config.with_token("inline");
        assert_eq!(config.resolve_token().unwrap().as_deref(), Some("inline"));
    }

    #[test]
    fn missing_ca_file_is_an_io_error() {
        let config = ClusterConfig::new("https://k8s.local", "ml")
            .with_ca_file("/definitely/not/here/ca.crt");
        assert!(matches!(KubeClient::new(config), Err(ClientError::Io(_))));
    }
}
