//! In-memory fakes for the cluster and object store (testing only)
//!
//! `MemoryCluster` and `MemoryObjectStore` satisfy the trait contracts without
//! any network access, and expose knobs to inject faults.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::cluster::{ClusterApi, Job, JobObservation, JobStatus};
use crate::error::ClientError;
use crate::object_store::{ListPage, ObjectStore, ObjectSummary};
use crate::ClientResult;

// ---------------------------------------------------------------------------
// MemoryCluster
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ClusterState {
    jobs: BTreeMap<String, (Job, Option<JobStatus>)>,
    pods: HashMap<String, String>,
    logs: HashMap<String, String>,
    reject_create: Option<ClientError>,
    query_fault: Option<String>,
    log_fault: Option<String>,
}

/// In-memory cluster keeping jobs by name.
///
/// Newly created jobs report an empty status, like a job the controller has
/// not picked up yet.
#[derive(Debug, Default)]
pub struct MemoryCluster {
    state: Mutex<ClusterState>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every job created so far, ordered by name.
    pub fn created_jobs(&self) -> Vec<Job> {
        let state = self.state.lock().unwrap();
        state.jobs.values().map(|(job, _)| job.clone()).collect()
    }

    /// Replace the observed status of an existing job.
    pub fn set_status(&self, job_name: &str, status: Option<JobStatus>) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.jobs.get_mut(job_name) {
            entry.1 = status;
        }
    }

    /// Seed a job that was created outside this process.
    pub fn insert_job(&self, job: Job, status: Option<JobStatus>) {
        let mut state = self.state.lock().unwrap();
        state.jobs.insert(job.name().to_string(), (job, status));
    }

    /// Attach a pod (and its runner log) to a job.
    pub fn attach_pod(&self, job_name: &str, pod_name: &str, log: &str) {
        let mut state = self.state.lock().unwrap();
        state.pods.insert(job_name.to_string(), pod_name.to_string());
        state.logs.insert(pod_name.to_string(), log.to_string());
    }

    /// Make every subsequent `create_job` fail with `err`.
    pub fn reject_submissions(&self, err: ClientError) {
        self.state.lock().unwrap().reject_create = Some(err);
    }

    /// Make every subsequent read (`get_job`, pod lookup) fail.
    pub fn fail_queries(&self, message: &str) {
        self.state.lock().unwrap().query_fault = Some(message.to_string());
    }

    /// Make every subsequent log read fail.
    pub fn fail_log_reads(&self, message: &str) {
        self.state.lock().unwrap().log_fault = Some(message.to_string());
    }
}

fn replay_error(err: &ClientError) -> ClientError {
    match err {
        ClientError::Api { status, message } => ClientError::Api {
            status: *status,
            message: message.clone(),
        },
        other => ClientError::Http(other.to_string()),
    }
}

#[async_trait]
impl ClusterApi for MemoryCluster {
    async fn create_job(&self, job: &Job) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = &state.reject_create {
            return Err(replay_error(err));
        }
        if state.jobs.contains_key(job.name()) {
            return Err(ClientError::Api {
                status: 409,
                message: format!("jobs.batch \"{}\" already exists", job.name()),
            });
        }
        state.jobs.insert(
            job.name().to_string(),
            (job.clone(), Some(JobStatus::default())),
        );
        Ok(())
    }

    async fn get_job(&self, name: &str) -> ClientResult<Option<JobObservation>> {
        let state = self.state.lock().unwrap();
        if let Some(message) = &state.query_fault {
            return Err(ClientError::Http(message.clone()));
        }
        Ok(state.jobs.get(name).map(|(job, status)| JobObservation {
            metadata: job.metadata.clone(),
            status: status.clone(),
        }))
    }

    async fn first_pod_for_job(&self, job_name: &str) -> ClientResult<Option<String>> {
        let state = self.state.lock().unwrap();
        if let Some(message) = &state.query_fault {
            return Err(ClientError::Http(message.clone()));
        }
        Ok(state.pods.get(job_name).cloned())
    }

    async fn read_pod_log(
        &self,
        pod_name: &str,
        _container: &str,
        tail_lines: u32,
    ) -> ClientResult<String> {
        let state = self.state.lock().unwrap();
        if let Some(message) = &state.log_fault {
            return Err(ClientError::Api {
                status: 400,
                message: message.clone(),
            });
        }
        let log = state.logs.get(pod_name).ok_or_else(|| ClientError::Api {
            status: 404,
            message: format!("pods \"{pod_name}\" not found"),
        })?;

        let lines: Vec<&str> = log.lines().collect();
        let start = lines.len().saturating_sub(tail_lines as usize);
        Ok(lines[start..].join("\n"))
    }
}

// ---------------------------------------------------------------------------
// MemoryObjectStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    last_modified: Option<DateTime<Utc>>,
    tags: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default)]
struct StoreState {
    objects: BTreeMap<String, StoredObject>,
    read_faults: HashSet<String>,
    list_fault: Option<String>,
    list_calls: usize,
}

/// In-memory bucket with S3 listing semantics (delimiter roll-up, paging).
#[derive(Debug)]
pub struct MemoryObjectStore {
    bucket: String,
    page_size: usize,
    state: Mutex<StoreState>,
}

impl MemoryObjectStore {
    pub fn new(bucket: &str) -> Self {
        MemoryObjectStore {
            bucket: bucket.to_string(),
            page_size: 1000,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Limit entries (objects + common prefixes) per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn put(&self, key: &str, body: &[u8], last_modified: Option<DateTime<Utc>>) {
        let mut state = self.state.lock().unwrap();
        state.objects.insert(
            key.to_string(),
            StoredObject {
                body: body.to_vec(),
                last_modified,
                tags: None,
            },
        );
    }

    pub fn put_tags(&self, key: &str, tags: &[(&str, &str)]) {
        let mut state = self.state.lock().unwrap();
        if let Some(obj) = state.objects.get_mut(key) {
            obj.tags = Some(
                tags.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            );
        }
    }

    /// Make body and tag reads of `key` fail.
    pub fn fail_reads(&self, key: &str) {
        self.state.lock().unwrap().read_faults.insert(key.to_string());
    }

    /// Make every listing call fail.
    pub fn fail_listing(&self, message: &str) {
        self.state.lock().unwrap().list_fault = Some(message.to_string());
    }

    /// Number of `list_objects_v2` calls served.
    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_objects_v2(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
    ) -> ClientResult<ListPage> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if let Some(message) = &state.list_fault {
            return Err(ClientError::Http(message.clone()));
        }

        // Entries in key order; a rolled-up prefix sorts where its first key would.
        let mut entries: Vec<(String, Option<ObjectSummary>)> = Vec::new();
        let mut seen_prefixes = BTreeSet::new();
        for (key, obj) in state.objects.range(prefix.to_string()..) {
            let Some(rest) = key.strip_prefix(prefix) else {
                break;
            };
            let rolled_up = delimiter
                .filter(|d| !d.is_empty())
                .and_then(|d| rest.find(d).map(|idx| format!("{prefix}{}", &rest[..idx + d.len()])));
            match rolled_up {
                Some(common) => {
                    if seen_prefixes.insert(common.clone()) {
                        entries.push((common, None));
                    }
                }
                None => entries.push((
                    key.clone(),
                    Some(ObjectSummary {
                        key: key.clone(),
                        last_modified: obj.last_modified,
                        size: obj.body.len() as u64,
                    }),
                )),
            }
        }

        let remaining: Vec<_> = entries
            .into_iter()
            .filter(|(name, _)| continuation_token.map_or(true, |token| name.as_str() > token))
            .collect();
        let has_more = remaining.len() > self.page_size;

        let mut page = ListPage::default();
        for (name, summary) in remaining.into_iter().take(self.page_size) {
            page.next_continuation_token = Some(name.clone());
            match summary {
                Some(summary) => page.objects.push(summary),
                None => page.common_prefixes.push(name),
            }
        }
        if !has_more {
            page.next_continuation_token = None;
        }
        Ok(page)
    }

    async fn get_object(&self, key: &str) -> ClientResult<Vec<u8>> {
        let state = self.state.lock().unwrap();
        if state.read_faults.contains(key) {
            return Err(ClientError::Http(format!("read of {key} failed")));
        }
        state
            .objects
            .get(key)
            .map(|obj| obj.body.clone())
            .ok_or_else(|| ClientError::ObjectNotFound(key.to_string()))
    }

    async fn get_object_tagging(&self, key: &str) -> ClientResult<BTreeMap<String, String>> {
        let state = self.state.lock().unwrap();
        if state.read_faults.contains(key) {
            return Err(ClientError::Http(format!("tagging of {key} failed")));
        }
        let obj = state
            .objects
            .get(key)
            .ok_or_else(|| ClientError::ObjectNotFound(key.to_string()))?;
        Ok(obj.tags.clone().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{JobSpec, ObjectMeta, PodSpec, PodTemplateSpec};

    fn job(name: &str) -> Job {
        Job::new(
            ObjectMeta {
                name: name.to_string(),
                ..Default::default()
            },
            JobSpec {
                ttl_seconds_after_finished: None,
                template: PodTemplateSpec {
                    spec: PodSpec {
                        restart_policy: "Never".to_string(),
                        containers: Vec::new(),
                    },
                },
            },
        )
    }

    #[tokio::test]
    async fn created_job_reports_empty_status() {
        let cluster = MemoryCluster::new();
        cluster.create_job(&job("eda-run-1")).await.unwrap();

        let observed = cluster.get_job("eda-run-1").await.unwrap().unwrap();
        assert_eq!(observed.status, Some(JobStatus::default()));
        assert!(cluster.get_job("eda-run-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_job_name_is_rejected() {
        let cluster = MemoryCluster::new();
        cluster.create_job(&job("eda-run-1")).await.unwrap();
        let err = cluster.create_job(&job("eda-run-1")).await.unwrap_err();
        assert_eq!(err.status(), Some(409));
    }

    #[tokio::test]
    async fn pod_log_is_tailed() {
        let cluster = MemoryCluster::new();
        cluster.attach_pod("eda-run-1", "eda-run-1-abcde", "one\ntwo\nthree\nfour");
        let tail = cluster
            .read_pod_log("eda-run-1-abcde", "runner", 2)
            .await
            .unwrap();
        assert_eq!(tail, "three\nfour");
    }

    #[tokio::test]
    async fn listing_rolls_up_prefixes() {
        let store = MemoryObjectStore::new("models");
        store.put("README.md", b"hi", None);
        store.put("run-41/metrics.json", b"{}", None);
        store.put("run-41/model.pkl", b"..", None);
        store.put("run-42/metrics.json", b"{}", None);

        let root = store.list_objects_v2("", Some("/"), None).await.unwrap();
        assert_eq!(root.objects.len(), 1);
        assert_eq!(root.common_prefixes, vec!["run-41/", "run-42/"]);

        let nested = store
            .list_objects_v2("run-41/", Some("/"), None)
            .await
            .unwrap();
        let keys: Vec<_> = nested.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["run-41/metrics.json", "run-41/model.pkl"]);
    }

    #[tokio::test]
    async fn listing_pages_with_continuation_tokens() {
        let store = MemoryObjectStore::new("models").with_page_size(2);
        for key in ["a", "b", "c", "d", "e"] {
            store.put(key, b"", None);
        }

        let mut token: Option<String> = None;
        let mut keys = Vec::new();
        let mut pages = 0;
        loop {
            let page = store
                .list_objects_v2("", None, token.as_deref())
                .await
                .unwrap();
            pages += 1;
            keys.extend(page.objects.into_iter().map(|o| o.key));
            token = page.next_continuation_token;
            if token.is_none() {
                break;
            }
        }
        assert_eq!(pages, 3);
        assert_eq!(keys, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn read_faults_are_per_key() {
        let store = MemoryObjectStore::new("models");
        store.put("ok", b"1", None);
        store.put("bad", b"2", None);
        store.fail_reads("bad");

        assert_eq!(store.get_object("ok").await.unwrap(), b"1");
        assert!(store.get_object("bad").await.is_err());
        assert!(store.get_object_tagging("bad").await.is_err());
        assert!(matches!(
            store.get_object("missing").await,
            Err(ClientError::ObjectNotFound(_))
        ));
    }
}
