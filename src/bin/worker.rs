//! neuropipe-worker: runs the job orchestrator and the retrain-tick
//! monitor side by side in one process, the same pairing the teacher's
//! `server.rs` + `auto_scanner.rs` processes form around a shared pool.

use neuropipe::config::PipelineConfig;
use neuropipe::db::config::{init_pool, DatabaseConfig};
use neuropipe::events::EventBus;
use neuropipe::orchestrator::Orchestrator;
use neuropipe::retrain::RetrainMonitor;
use neuropipe::storage::S3ObjectStore;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,neuropipe=debug".into()),
        )
        .init();

    let db_config = DatabaseConfig::from_env();
    let pool = init_pool(&db_config).await?;

    let bucket = std::env::var("NEUROPIPE_BUCKET").unwrap_or_else(|_| "neuropipe".into());
    let store: Arc<dyn neuropipe::storage::ObjectStore> = Arc::new(S3ObjectStore::new(bucket).await);

    let config_path = std::env::var("NEUROPIPE_CONFIG_PATH").ok();
    let config = PipelineConfig::load(config_path.as_deref())?;

    let events = Arc::new(EventBus::new());

    let orchestrator = Arc::new(Orchestrator::new(pool.clone(), store, config.clone(), events));
    let retrain_monitor = Arc::new(RetrainMonitor::new(pool, config));

    info!("neuropipe-worker starting orchestrator and retrain monitor");
    tokio::try_join!(orchestrator.start(), retrain_monitor.start())?;
    Ok(())
}
