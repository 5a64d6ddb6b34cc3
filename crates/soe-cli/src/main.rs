//! SOE Runner - operator CLI
//!
//! `soectl` drives the orchestration core from a shell or a CI job.
//!
//! ## Commands
//!
//! - `eda` / `train`: submit a batch run and print its receipt
//! - `status`: print the current state of a run
//! - `models`: list trained model artifacts, newest first
//! - `promote`: point the serving config at an artifact and commit it
//! - `auto-promote`: promote the newest artifact if it beats the current one
//!
//! Settings come from `SOE_*` environment variables, optionally loaded from a
//! `.env` file in the working directory.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, Level};

use soe_clients::{ClusterConfig, KubeClient, ObjectStoreConfig, S3Client};
use soe_core::metrics::METRICS;
use soe_core::telemetry::LogFormat;
use soe_core::{
    artifact_for_uri, EdaArgs, GitOpsConfig, JobConfig, JobOrchestrator, ModelArtifact,
    ModelRegistry, PolicyVerdict, PromotionPolicy, PromotionResult, PromotionService,
    RegistryConfig, RunReceipt, RunRequest, TrainArgs,
};

#[derive(Parser)]
#[command(name = "soectl")]
#[command(author = "SOE Engineering")]
#[command(version = soe_core::VERSION)]
#[command(about = "Submit EDA/training runs, browse models, promote via GitOps", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit an exploratory data analysis run
    Eda {
        /// Dataset to analyse
        #[arg(short, long)]
        dataset: String,

        /// Report root; the run id is appended
        #[arg(short, long, default_value = soe_core::domain::run::DEFAULT_EDA_OUTPUT)]
        output: String,

        /// Column checked for outliers
        #[arg(long, default_value = soe_core::domain::run::DEFAULT_OUTLIERS_COLUMN)]
        outliers_col: String,
    },

    /// Submit a training run
    Train {
        /// Training dataset
        #[arg(short, long)]
        dataset: String,

        /// Hyper-parameters as a JSON object
        #[arg(short, long, default_value = "{}")]
        params: String,
    },

    /// Show the current state of a run
    Status {
        /// Run id as returned by `eda`/`train` (bare 8-char ids are accepted)
        run_id: String,
    },

    /// List model artifacts, newest first
    Models,

    /// Point the serving config at a model artifact and commit the change
    Promote {
        /// Artifact URI, e.g. s3://models/run-42
        model_uri: String,
    },

    /// Promote the newest artifact when its metrics beat the current model's
    AutoPromote {
        /// Minimum R² gain over the current model
        #[arg(long, env = "SOE_POLICY_R2_MIN_GAIN")]
        r2_min_gain: Option<f64>,

        /// Minimum RMSE drop below the current model
        #[arg(long, env = "SOE_POLICY_RMSE_MIN_DROP")]
        rmse_min_drop: Option<f64>,

        /// Evaluate only; never commit
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // A missing .env is fine; the environment may already be populated.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    soe_core::telemetry::init_tracing(LogFormat::from_json_flag(cli.json), level);
    debug!(version = soe_core::VERSION, "soectl starting");

    let outcome = match cli.command {
        Commands::Eda {
            dataset,
            output,
            outliers_col,
        } => {
            let args = EdaArgs::new(dataset)
                .with_output_path(output)
                .with_outliers_col(outliers_col);
            cmd_submit(RunRequest::Eda(args)).await
        }
        Commands::Train { dataset, params } => {
            let params = parse_params(&params)?;
            cmd_submit(RunRequest::Train(TrainArgs::new(dataset).with_params(params))).await
        }
        Commands::Status { run_id } => cmd_status(&run_id).await,
        Commands::Models => cmd_models().await,
        Commands::Promote { model_uri } => cmd_promote(&model_uri).await,
        Commands::AutoPromote {
            r2_min_gain,
            rmse_min_drop,
            dry_run,
        } => {
            let mut policy = PromotionPolicy::default();
            if let Some(gain) = r2_min_gain {
                policy = policy.with_r2_min_gain(gain);
            }
            if let Some(drop) = rmse_min_drop {
                policy = policy.with_rmse_min_drop(drop);
            }
            cmd_auto_promote(policy, dry_run).await
        }
    };

    METRICS.flush();
    outcome
}

fn parse_params(raw: &str) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(raw).context("--params is not valid JSON")?;
    match value {
        Value::Object(map) => Ok(map),
        other => bail!("--params must be a JSON object, got {other}"),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

fn cluster_client() -> Result<Arc<KubeClient>> {
    let config = ClusterConfig::from_env().context("Failed to read cluster configuration")?;
    let client = KubeClient::new(config).context("Failed to create cluster client")?;
    Ok(Arc::new(client))
}

fn store_client() -> Result<Arc<S3Client>> {
    let config =
        ObjectStoreConfig::from_env().context("Failed to read object store configuration")?;
    let client = S3Client::new(config).context("Failed to create object store client")?;
    Ok(Arc::new(client))
}

fn shutdown_cluster(client: Arc<KubeClient>) {
    match Arc::try_unwrap(client) {
        Ok(client) => client.shutdown(),
        Err(_) => debug!("cluster client still shared at shutdown"),
    }
}

fn shutdown_store(client: Arc<S3Client>) {
    match Arc::try_unwrap(client) {
        Ok(client) => client.shutdown(),
        Err(_) => debug!("object store client still shared at shutdown"),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_submit(request: RunRequest) -> Result<ExitCode> {
    let job_config = JobConfig::from_env().context("Failed to read job configuration")?;
    let cluster = cluster_client()?;
    let orchestrator = JobOrchestrator::new(cluster.clone(), job_config);

    let submitted = orchestrator.submit(&request).await;
    drop(orchestrator);
    shutdown_cluster(cluster);

    let run_id = submitted.context("Job submission failed")?;
    print_json(&RunReceipt::submitted(run_id, request.kind()))?;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_status(run_id: &str) -> Result<ExitCode> {
    // The worker image only matters for submissions.
    let image = std::env::var("SOE_K8S_JOB_IMAGE").unwrap_or_default();
    let cluster = cluster_client()?;
    let orchestrator = JobOrchestrator::new(cluster.clone(), JobConfig::new(image));

    let run = orchestrator.status(run_id).await;
    drop(orchestrator);
    shutdown_cluster(cluster);

    print_json(&run)?;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_models() -> Result<ExitCode> {
    let store = store_client()?;
    let registry = ModelRegistry::new(store.clone(), RegistryConfig::default());

    let artifacts = registry.list().await;
    drop(registry);
    shutdown_store(store);

    print_json(&artifacts)?;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_promote(model_uri: &str) -> Result<ExitCode> {
    let config = GitOpsConfig::from_env().context("Failed to read GitOps configuration")?;
    let service = PromotionService::new(config);

    let result = service.promote(model_uri).await;
    print_json(&result)?;
    Ok(exit_code(&result))
}

fn exit_code(result: &PromotionResult) -> ExitCode {
    if result.is_error() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AutoPromoteReport {
    candidate: Option<ModelArtifact>,
    current_model_uri: Option<String>,
    verdict: Option<PolicyVerdict>,
    promotion: Option<PromotionResult>,
}

async fn cmd_auto_promote(policy: PromotionPolicy, dry_run: bool) -> Result<ExitCode> {
    let config = GitOpsConfig::from_env().context("Failed to read GitOps configuration")?;
    let service = PromotionService::new(config);
    let current_model_uri = service
        .current_model_uri()
        .await
        .context("Failed to read the current model from the manifest")?;

    let store = store_client()?;
    let registry = ModelRegistry::new(store.clone(), RegistryConfig::default());
    let artifacts = registry.list().await;
    drop(registry);
    shutdown_store(store);

    let mut report = AutoPromoteReport {
        candidate: artifacts.first().cloned(),
        current_model_uri,
        verdict: None,
        promotion: None,
    };

    let Some(candidate) = report.candidate.as_ref() else {
        info!("registry holds no artifacts, nothing to promote");
        print_json(&report)?;
        return Ok(ExitCode::SUCCESS);
    };

    let current_metrics = report
        .current_model_uri
        .as_deref()
        .and_then(|uri| artifact_for_uri(&artifacts, uri))
        .map(|a| a.metrics.clone())
        .unwrap_or_default();

    let verdict = policy.evaluate(&current_metrics, &candidate.metrics);
    info!(
        candidate = %candidate.model_uri,
        improved = verdict.improved,
        reasons = %verdict.reasons.join(", "),
        "policy evaluated"
    );

    if verdict.improved && !dry_run {
        report.promotion = Some(service.promote(&candidate.model_uri).await);
    }
    report.verdict = Some(verdict);

    print_json(&report)?;
    Ok(report
        .promotion
        .as_ref()
        .map(exit_code)
        .unwrap_or(ExitCode::SUCCESS))
}
