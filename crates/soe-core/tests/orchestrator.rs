//! Job orchestrator against the in-memory cluster.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use soe_clients::fakes::MemoryCluster;
use soe_clients::{ClientError, JobCondition, JobStatus};
use soe_core::{
    EdaArgs, JobConfig, JobOrchestrator, RunKind, RunPhase, RunRequest, SoeError, TrainArgs,
};

const IMAGE: &str = "registry.local/soe/worker:1.4";

fn orchestrator() -> (Arc<MemoryCluster>, JobOrchestrator) {
    let cluster = Arc::new(MemoryCluster::new());
    let orchestrator = JobOrchestrator::new(cluster.clone(), JobConfig::new(IMAGE));
    (cluster, orchestrator)
}

#[tokio::test]
async fn eda_submission_builds_expected_job() {
    let (cluster, orchestrator) = orchestrator();
    let request = RunRequest::Eda(EdaArgs::new("/data/a.csv").with_output_path("/out"));

    let run_id = orchestrator.submit(&request).await.unwrap();
    assert!(run_id.starts_with("eda-run-"));
    let short_id = run_id.trim_start_matches("eda-run-");
    assert_eq!(short_id.len(), 8);

    let jobs = cluster.created_jobs();
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.name(), run_id);
    assert_eq!(job.api_version, "batch/v1");
    assert_eq!(job.metadata.labels["app"], "integration");
    assert_eq!(
        job.metadata.labels["app.kubernetes.io/managed-by"],
        "integration-api"
    );
    assert_eq!(job.spec.ttl_seconds_after_finished, Some(1800));

    let pod = &job.spec.template.spec;
    assert_eq!(pod.restart_policy, "Never");
    assert_eq!(pod.containers.len(), 1);
    assert_eq!(pod.containers[0].name, "runner");
    assert_eq!(pod.containers[0].image, IMAGE);
    assert_eq!(
        pod.containers[0].args,
        vec![
            "python".to_string(),
            "/app/eda.py".to_string(),
            "--input".to_string(),
            "/data/a.csv".to_string(),
            "--output".to_string(),
            format!("/out/{short_id}"),
            "--outliers-col".to_string(),
            "charges".to_string(),
        ]
    );
}

#[tokio::test]
async fn immediate_status_is_pending_with_null_counters() {
    let (_cluster, orchestrator) = orchestrator();
    let run_id = orchestrator
        .submit(&RunRequest::Eda(EdaArgs::new("/data/a.csv")))
        .await
        .unwrap();

    let run = orchestrator.status(&run_id).await;
    assert_eq!(run.run_id, run_id);
    assert_eq!(run.kind, Some(RunKind::Eda));
    assert_eq!(run.phase, RunPhase::Pending);
    assert_eq!(run.succeeded, None);
    assert_eq!(run.failed, None);
    assert_eq!(run.logs_tail, None);

    let value = serde_json::to_value(&run).unwrap();
    assert!(value.get("succeeded").is_none());
    assert_eq!(value["phase"], "PENDING");
}

#[tokio::test]
async fn train_params_reach_the_container() {
    let (cluster, orchestrator) = orchestrator();
    let params = serde_json::json!({"model": "xgboost", "n_estimators": 300});
    let request = RunRequest::Train(
        TrainArgs::new("s3://data/insurance.csv").with_params(params.as_object().cloned().unwrap()),
    );

    let run_id = orchestrator.submit(&request).await.unwrap();
    assert!(run_id.starts_with("train-run-"));

    let args = &cluster.created_jobs()[0].spec.template.spec.containers[0].args;
    assert_eq!(&args[..4], ["python", "/app/train.py", "--dataset", "s3://data/insurance.csv"]);
    assert_eq!(args[4], "--params");
    let sent: serde_json::Value = serde_json::from_str(&args[5]).unwrap();
    assert_eq!(sent, params);
}

#[tokio::test]
async fn submissions_get_distinct_ids() {
    let (cluster, orchestrator) = orchestrator();
    let mut ids = HashSet::new();
    for _ in 0..200 {
        let id = orchestrator
            .submit(&RunRequest::Train(TrainArgs::new("/data/a.csv")))
            .await
            .unwrap();
        assert!(!id.is_empty());
        ids.insert(id);
    }
    assert_eq!(ids.len(), 200);
    assert_eq!(cluster.created_jobs().len(), 200);
}

#[tokio::test]
async fn rejection_is_propagated_untranslated() {
    let (cluster, orchestrator) = orchestrator();
    cluster.reject_submissions(ClientError::Api {
        status: 403,
        message: "exceeded quota: ml-jobs".to_string(),
    });

    let err = orchestrator
        .submit(&RunRequest::Eda(EdaArgs::new("/data/a.csv")))
        .await
        .unwrap_err();
    match err {
        SoeError::Submission(inner) => {
            assert_eq!(inner.status(), Some(403));
            assert!(inner.to_string().contains("exceeded quota: ml-jobs"));
        }
        other => panic!("expected submission error, got {other}"),
    }
    assert!(cluster.created_jobs().is_empty());
}

#[tokio::test]
async fn unknown_run_is_not_found() {
    let (_cluster, orchestrator) = orchestrator();
    let run = orchestrator.status("deadbeef").await;
    assert_eq!(run.phase, RunPhase::NotFound);
    assert_eq!(run.run_id, "deadbeef");
    assert_eq!(run.kind, None);
}

#[tokio::test]
async fn path_like_run_id_is_not_found_without_querying() {
    let (cluster, orchestrator) = orchestrator();
    // Any cluster call would now surface as an ERROR phase.
    cluster.fail_queries("unexpected lookup");

    for run_id in [
        "eda-run-x/../../secrets/db",
        "../../api/v1/namespaces/ml/secrets/db",
        "EDA-RUN-ABCD1234",
        "",
    ] {
        let run = orchestrator.status(run_id).await;
        assert_eq!(run.phase, RunPhase::NotFound, "{run_id:?}");
        assert_eq!(run.run_id, run_id);
        assert_eq!(run.logs_tail, None);
    }
}

#[tokio::test]
async fn bare_id_resolves_train_job() {
    let (cluster, orchestrator) = orchestrator();
    let run_id = orchestrator
        .submit(&RunRequest::Train(TrainArgs::new("/data/a.csv")))
        .await
        .unwrap();
    cluster.set_status(
        &run_id,
        Some(JobStatus {
            active: Some(1),
            ..JobStatus::default()
        }),
    );

    let short_id = run_id.trim_start_matches("train-run-");
    let run = orchestrator.status(short_id).await;
    assert_eq!(run.kind, Some(RunKind::Train));
    assert_eq!(run.phase, RunPhase::Running);
}

#[tokio::test]
async fn failed_and_succeeded_reports_failed() {
    let (cluster, orchestrator) = orchestrator();
    let run_id = orchestrator
        .submit(&RunRequest::Eda(EdaArgs::new("/data/a.csv")))
        .await
        .unwrap();
    let started = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let finished = Utc.with_ymd_and_hms(2024, 3, 1, 12, 5, 0).unwrap();
    cluster.set_status(
        &run_id,
        Some(JobStatus {
            succeeded: Some(1),
            failed: Some(1),
            start_time: Some(started),
            completion_time: Some(finished),
            ..JobStatus::default()
        }),
    );

    let run = orchestrator.status(&run_id).await;
    assert_eq!(run.phase, RunPhase::Failed);
    assert_eq!(run.succeeded, Some(1));
    assert_eq!(run.failed, Some(1));
    assert_eq!(run.started_at, Some(started));
    assert_eq!(run.completed_at, Some(finished));
}

#[tokio::test]
async fn true_condition_is_surfaced_upper_cased() {
    let (cluster, orchestrator) = orchestrator();
    let run_id = orchestrator
        .submit(&RunRequest::Eda(EdaArgs::new("/data/a.csv")))
        .await
        .unwrap();
    cluster.set_status(
        &run_id,
        Some(JobStatus {
            conditions: vec![JobCondition::new("Suspended", "True")],
            ..JobStatus::default()
        }),
    );

    let run = orchestrator.status(&run_id).await;
    assert_eq!(run.phase, RunPhase::Condition("SUSPENDED".to_string()));
    assert_eq!(serde_json::to_value(&run).unwrap()["phase"], "SUSPENDED");
}

#[tokio::test]
async fn missing_status_block_is_unknown() {
    let (cluster, orchestrator) = orchestrator();
    let run_id = orchestrator
        .submit(&RunRequest::Eda(EdaArgs::new("/data/a.csv")))
        .await
        .unwrap();
    cluster.set_status(&run_id, None);
    assert_eq!(orchestrator.status(&run_id).await.phase, RunPhase::Unknown);
}

#[tokio::test]
async fn log_tail_is_bounded_to_last_lines() {
    let (cluster, orchestrator) = orchestrator();
    let run_id = orchestrator
        .submit(&RunRequest::Eda(EdaArgs::new("/data/a.csv")))
        .await
        .unwrap();
    let log: String = (1..=150).map(|i| format!("line {i}\n")).collect();
    cluster.attach_pod(&run_id, &format!("{run_id}-x7k2p"), &log);

    let run = orchestrator.status(&run_id).await;
    let tail = run.logs_tail.unwrap();
    assert_eq!(tail.lines().count(), 100);
    assert!(tail.starts_with("line 51"));
    assert!(tail.ends_with("line 150"));
}

#[tokio::test]
async fn log_failure_omits_tail() {
    let (cluster, orchestrator) = orchestrator();
    let run_id = orchestrator
        .submit(&RunRequest::Eda(EdaArgs::new("/data/a.csv")))
        .await
        .unwrap();
    cluster.attach_pod(&run_id, "pod-1", "hello\n");
    cluster.fail_log_reads("container \"runner\" is waiting to start");

    let run = orchestrator.status(&run_id).await;
    assert_eq!(run.phase, RunPhase::Pending);
    assert_eq!(run.logs_tail, None);
}

#[tokio::test]
async fn query_fault_becomes_error_phase() {
    let (cluster, orchestrator) = orchestrator();
    cluster.fail_queries("connection refused");

    let run = orchestrator.status("eda-run-0badf00d").await;
    assert_eq!(run.phase, RunPhase::Error);
    assert_eq!(run.kind, Some(RunKind::Eda));
    assert!(run.logs_tail.unwrap().contains("connection refused"));
}
