//! neuropipe-cli
//!
//! Operator CLI (`clap derive`, matching the teacher's `bin/test_clap.rs`):
//! a thin wrapper over the library for enqueuing jobs, inspecting
//! job/recording/model state, and promoting a model to production,
//! useful for local development and ops without standing up the HTTP
//! surface.

use clap::{Parser, Subcommand};
use neuropipe::config::PipelineConfig;
use neuropipe::db::config::{init_pool, DatabaseConfig};
use neuropipe::db::repository;
use neuropipe::model::{ModelFamily, ProcessingStep};
use neuropipe::orchestrator;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "neuropipe-cli", about = "Operator CLI for the neuropipe job pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[clap(rename_all = "kebab-case")]
enum Commands {
    /// Enqueue a preprocessing job for a recording.
    EnqueuePreprocessing {
        #[arg(long)]
        recording_id: Uuid,
    },
    /// Enqueue a feature-extraction job for a recording.
    EnqueueFeatures {
        #[arg(long)]
        recording_id: Uuid,
    },
    /// Enqueue a training job over a set of labeled recordings.
    EnqueueTraining {
        #[arg(long, value_delimiter = ',')]
        recording_ids: Vec<Uuid>,
        /// `recording_id=label` pairs, comma-separated.
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,
        #[arg(long, value_enum)]
        family: CliModelFamily,
        #[arg(long)]
        name: String,
        #[arg(long)]
        version: String,
    },
    /// Show a job's current status and progress.
    JobStatus {
        #[arg(long)]
        job_id: Uuid,
    },
    /// Cancel a running or pending job.
    CancelJob {
        #[arg(long)]
        job_id: Uuid,
    },
    /// Show a recording's current state.
    RecordingShow {
        #[arg(long)]
        recording_id: Uuid,
    },
    /// Show a trained model's metrics and stage.
    ModelShow {
        #[arg(long)]
        model_id: Uuid,
    },
    /// Promote a model to production, enforcing the configured metric
    /// thresholds.
    ModelPromote {
        #[arg(long)]
        model_id: Uuid,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum CliModelFamily {
    Logistic,
    RandomForest,
}

impl From<CliModelFamily> for ModelFamily {
    fn from(value: CliModelFamily) -> Self {
        match value {
            CliModelFamily::Logistic => ModelFamily::Logistic,
            CliModelFamily::RandomForest => ModelFamily::RandomForest,
        }
    }
}

fn parse_labels(pairs: &[String]) -> anyhow::Result<Vec<(Uuid, i64)>> {
    pairs
        .iter()
        .map(|pair| {
            let (id, label) = pair
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("malformed label pair '{pair}', expected recording_id=label"))?;
            Ok((id.parse()?, label.parse()?))
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let db_config = DatabaseConfig::from_env();
    let pool = init_pool(&db_config).await?;
    let config = PipelineConfig::load(std::env::var("NEUROPIPE_CONFIG_PATH").ok().as_deref())?;

    match cli.command {
        Commands::EnqueuePreprocessing { recording_id } => {
            let job = repository::create_job(&pool, Some(recording_id), None, ProcessingStep::Preprocessing, serde_json::json!({})).await?;
            println!("enqueued preprocessing job {}", job.id);
        }
        Commands::EnqueueFeatures { recording_id } => {
            let job = repository::create_job(&pool, Some(recording_id), None, ProcessingStep::FeatureExtraction, serde_json::json!({})).await?;
            println!("enqueued feature-extraction job {}", job.id);
        }
        Commands::EnqueueTraining { recording_ids, labels, family, name, version } => {
            let labels = parse_labels(&labels)?;
            let params = orchestrator::TrainingParameters {
                recording_ids: recording_ids.clone(),
                labels,
                family: family.into(),
                name,
                version,
            };
            let parameters = serde_json::to_value(&params)?;
            let job = repository::create_job(&pool, None, Some(recording_ids), ProcessingStep::Training, parameters).await?;
            println!("enqueued training job {}", job.id);
        }
        Commands::JobStatus { job_id } => {
            let job = repository::get_job(&pool, job_id).await?.ok_or_else(|| anyhow::anyhow!("job {job_id} not found"))?;
            println!("job {} step={:?} status={:?} progress={:.2} log={}", job.id, job.step, job.status, job.progress, job.log);
        }
        Commands::CancelJob { job_id } => {
            orchestrator::cancel_job(&pool, job_id).await?;
            println!("cancelled job {job_id}");
        }
        Commands::RecordingShow { recording_id } => {
            let recording = repository::get_recording(&pool, recording_id).await?.ok_or_else(|| anyhow::anyhow!("recording {recording_id} not found"))?;
            println!(
                "recording {} status={:?} raw_path={} cleaned_path={:?} features_path={:?}",
                recording.id, recording.status, recording.raw_path, recording.cleaned_path, recording.features_path
            );
        }
        Commands::ModelShow { model_id } => {
            let model = repository::get_model(&pool, model_id).await?.ok_or_else(|| anyhow::anyhow!("model {model_id} not found"))?;
            println!("model {} name={} version={} stage={:?} metrics={}", model.id, model.name, model.version, model.stage, model.metrics);
        }
        Commands::ModelPromote { model_id } => {
            orchestrator::promote_model(&pool, &config, model_id).await?;
            println!("promoted model {model_id} to production");
        }
    }

    Ok(())
}
