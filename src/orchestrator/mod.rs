//! Job Orchestrator (C8): a durable work coordinator over the three
//! logical queues (preprocessing, feature extraction, training), grounded
//! on the teacher's `auto_scanner.rs` worker-loop shape - an `Arc<Self>`
//! poll loop, semaphore-bounded fan-out, and per-item error logging that
//! never kills the loop itself.

mod visualize;

use crate::config::PipelineConfig;
use crate::db::repository;
use crate::error::{PipelineError, Result};
use crate::events::{Event, EventBus};
use crate::model::{JobStatus, ProcessingStep, RecordingStatus};
use crate::storage::{paths, ObjectStore};
use crate::{dsp, features, signal, trainer};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Exceeding this is tolerated; a `job_progress` event still fires but the
/// job is allowed to keep running.
const SOFT_TIMEOUT: Duration = Duration::from_secs(50 * 60);
/// Exceeding this aborts the job as a `TimeoutError`.
const HARD_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct Orchestrator {
    pool: PgPool,
    store: Arc<dyn ObjectStore>,
    config: PipelineConfig,
    events: Arc<EventBus>,
    worker_id: String,
    preprocessing_slot: Arc<Semaphore>,
    feature_slot: Arc<Semaphore>,
    training_slot: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(pool: PgPool, store: Arc<dyn ObjectStore>, config: PipelineConfig, events: Arc<EventBus>) -> Self {
        Self {
            pool,
            store,
            config,
            events,
            worker_id: format!("worker-{}", Uuid::new_v4()),
            preprocessing_slot: Arc::new(Semaphore::new(1)),
            feature_slot: Arc::new(Semaphore::new(1)),
            training_slot: Arc::new(Semaphore::new(1)),
        }
    }

    /// Runs forever, polling each queue once per tick. A failed poll is
    /// logged and the loop continues rather than exiting the worker.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        loop {
            if let Err(e) = self.poll_once().await {
                error!(error = %e, "orchestrator poll tick failed");
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn poll_once(&self) -> Result<()> {
        self.try_run(ProcessingStep::Preprocessing, &self.preprocessing_slot)
            .await?;
        self.try_run(ProcessingStep::FeatureExtraction, &self.feature_slot)
            .await?;
        self.try_run(ProcessingStep::Training, &self.training_slot)
            .await?;
        Ok(())
    }

    async fn try_run(&self, step: ProcessingStep, slot: &Arc<Semaphore>) -> Result<()> {
        let Ok(permit) = slot.clone().try_acquire_owned() else {
            return Ok(());
        };
        let Some(job) = repository::claim_next_pending_job(&self.pool, step, &self.worker_id).await? else {
            return Ok(());
        };
        let job_id = job.id;
        info!(job_id = %job_id, ?step, "claimed job");

        let outcome = tokio::time::timeout(HARD_TIMEOUT, self.run_job(job)).await;
        drop(permit);

        match outcome {
            Ok(Ok(())) => {
                repository::finish_job(&self.pool, job_id, JobStatus::Completed, None).await?;
                info!(actor = %self.worker_id, action = "finish_job", entity_type = "processing_job", entity_id = %job_id, outcome = "completed", "job completed");
            }
            Ok(Err(PipelineError::Cancelled)) => {
                info!(actor = %self.worker_id, action = "finish_job", entity_type = "processing_job", entity_id = %job_id, outcome = "cancelled", "job cancelled mid-run");
                // cancel_job already stamped the terminal row; nothing else to do.
            }
            Ok(Err(e)) => {
                warn!(actor = %self.worker_id, action = "finish_job", entity_type = "processing_job", entity_id = %job_id, outcome = "failed", error = %e, "job failed");
                repository::finish_job(&self.pool, job_id, JobStatus::Failed, Some(&e.to_string())).await?;
                if step == ProcessingStep::Preprocessing {
                    if let Ok(Some(job)) = repository::get_job(&self.pool, job_id).await {
                        if let Some(recording_id) = job.recording_id {
                            let _ = repository::update_recording_status(
                                &self.pool,
                                recording_id,
                                RecordingStatus::Failed,
                                None,
                                None,
                            )
                            .await;
                            info!(actor = %self.worker_id, action = "update_recording_status", entity_type = "recording", entity_id = %recording_id, outcome = "failed", "recording marked failed");
                        }
                    }
                }
            }
            Err(_) => {
                warn!(actor = %self.worker_id, action = "finish_job", entity_type = "processing_job", entity_id = %job_id, outcome = "timeout", "job exceeded hard timeout");
                let timeout_err = PipelineError::Timeout(format!("{step:?} exceeded {:?}", HARD_TIMEOUT));
                repository::finish_job(&self.pool, job_id, JobStatus::Failed, Some(&timeout_err.to_string())).await?;
            }
        }
        Ok(())
    }

    async fn run_job(&self, job: crate::model::ProcessingJob) -> Result<()> {
        let start = std::time::Instant::now();
        let room = job
            .recording_id
            .map(EventBus::recording_room)
            .unwrap_or_else(|| EventBus::job_room(job.id));

        let result = match job.step {
            ProcessingStep::Preprocessing => self.run_preprocessing(&job, &room).await,
            ProcessingStep::FeatureExtraction => self.run_feature_extraction(&job, &room).await,
            ProcessingStep::Training => self.run_training(&job, &room).await,
        };

        if start.elapsed() > SOFT_TIMEOUT {
            warn!(job_id = %job.id, elapsed = ?start.elapsed(), "job exceeded soft timeout");
        }
        result
    }

    async fn checkpoint(&self, job_id: Uuid, room: &str, progress: f64, name: &str) -> Result<()> {
        self.check_cancelled(job_id).await?;
        repository::update_job_progress(&self.pool, job_id, progress, name).await?;
        self.events.publish(
            room,
            Event::JobProgress {
                job_id,
                progress,
                checkpoint: name.to_string(),
                timestamp: Utc::now(),
            },
        );
        Ok(())
    }

    async fn check_cancelled(&self, job_id: Uuid) -> Result<()> {
        if let Some(job) = repository::get_job(&self.pool, job_id).await? {
            if job.status == JobStatus::Cancelled {
                return Err(PipelineError::Cancelled);
            }
        }
        Ok(())
    }

    async fn run_preprocessing(&self, job: &crate::model::ProcessingJob, room: &str) -> Result<()> {
        let recording_id = job
            .recording_id
            .ok_or_else(|| PipelineError::Data("preprocessing job missing recording_id".into()))?;
        let recording = repository::get_recording(&self.pool, recording_id)
            .await?
            .ok_or_else(|| PipelineError::Data(format!("recording {recording_id} not found")))?;

        repository::update_recording_status(&self.pool, recording_id, RecordingStatus::Processing, None, None).await?;

        self.checkpoint(job.id, room, 0.1, "download").await?;
        let raw_bytes = self.store.get_bytes(&recording.raw_path).await?;

        self.checkpoint(job.id, room, 0.2, "decode").await?;
        let mut buffer = signal::decode(&raw_bytes, recording.format)?;
        buffer.normalize_channel_names();

        self.checkpoint(job.id, room, 0.3, "resample").await?;
        let report = dsp::clean(&mut buffer, &self.config)?;
        self.checkpoint(job.id, room, 0.4, "notch").await?;
        self.checkpoint(job.id, room, 0.5, "band-pass").await?;
        self.checkpoint(job.id, room, 0.6, "bad-channels").await?;
        self.checkpoint(job.id, room, 0.7, "ICA").await?;

        let cleaned_bytes = signal::encode_fif(&buffer)?;
        let cleaned_path = paths::cleaned(&recording_id.to_string());
        self.store.put_bytes(cleaned_bytes, &cleaned_path, "application/octet-stream").await?;
        self.checkpoint(job.id, room, 0.85, "save").await?;

        // visualizations are best-effort: a rendering failure does not fail the job
        if let Err(e) = self.render_preprocessing_visualizations(recording_id, &buffer, &report.bad_channels).await {
            warn!(job_id = %job.id, error = %e, "visualization rendering failed");
        }
        self.checkpoint(job.id, room, 0.9, "visualizations").await?;

        let status = if report.needs_review {
            RecordingStatus::NeedsReview
        } else {
            RecordingStatus::Processed
        };
        repository::update_recording_status(&self.pool, recording_id, status, Some(&cleaned_path), None).await?;
        self.events.publish(
            &EventBus::recording_room(recording_id),
            Event::RecordingUpdate {
                recording_id,
                status: format!("{status:?}"),
                timestamp: Utc::now(),
            },
        );

        self.checkpoint(job.id, room, 1.0, "done").await?;
        Ok(())
    }

    async fn render_preprocessing_visualizations(
        &self,
        recording_id: Uuid,
        buffer: &signal::SignalBuffer,
        bad_channels: &[String],
    ) -> Result<()> {
        let psd_png = visualize::psd_png(buffer, "psd_after")?;
        self.store
            .put_bytes(psd_png, &paths::visualization(&recording_id.to_string(), "psd_after"), "image/png")
            .await?;

        let overlay_png = visualize::bad_channel_overlay_png(&buffer.channel_labels, &buffer.data, bad_channels)?;
        self.store
            .put_bytes(overlay_png, &paths::visualization(&recording_id.to_string(), "bad_channels"), "image/png")
            .await?;
        Ok(())
    }

    async fn run_feature_extraction(&self, job: &crate::model::ProcessingJob, room: &str) -> Result<()> {
        let recording_id = job
            .recording_id
            .ok_or_else(|| PipelineError::Data("feature-extraction job missing recording_id".into()))?;
        let recording = repository::get_recording(&self.pool, recording_id)
            .await?
            .ok_or_else(|| PipelineError::Data(format!("recording {recording_id} not found")))?;
        let cleaned_path = recording
            .cleaned_path
            .clone()
            .ok_or_else(|| PipelineError::Data("recording has no cleaned_path".into()))?;

        self.checkpoint(job.id, room, 0.2, "download").await?;
        let cleaned_bytes = self.store.get_bytes(&cleaned_path).await?;

        self.checkpoint(job.id, room, 0.3, "load").await?;
        let buffer = signal::decode_fif(&cleaned_bytes)?;

        self.checkpoint(job.id, room, 0.5, "per-epoch").await?;
        let table = features::compute_feature_table(&buffer, &self.config.features)?;

        self.checkpoint(job.id, room, 0.7, "connectivity").await?;
        let coherence = features::compute_coherence(&buffer, &self.config.features);
        let coherence_bytes = serde_json::to_vec(&coherence)
            .map_err(|e| PipelineError::Data(format!("failed to serialize coherence rows: {e}")))?;
        self.store
            .put_bytes(coherence_bytes, &paths::coherence(&recording_id.to_string()), "application/json")
            .await?;

        let parquet_bytes = features::write_parquet(&table)?;
        let features_path = paths::features_table(&recording_id.to_string());
        self.store.put_bytes(parquet_bytes, &features_path, "application/octet-stream").await?;

        let summary = features::summarize(&table);
        let summary_bytes = serde_json::to_vec(&summary)
            .map_err(|e| PipelineError::Data(format!("failed to serialize feature summary: {e}")))?;
        self.store
            .put_bytes(summary_bytes, &paths::features_summary(&recording_id.to_string()), "application/json")
            .await?;
        self.checkpoint(job.id, room, 0.85, "save").await?;

        repository::update_recording_status(&self.pool, recording_id, recording.status, None, Some(&features_path)).await?;

        self.checkpoint(job.id, room, 1.0, "done").await?;
        Ok(())
    }

    async fn run_training(&self, job: &crate::model::ProcessingJob, room: &str) -> Result<()> {
        let params: TrainingParameters = serde_json::from_value(job.parameters.clone())
            .map_err(|e| PipelineError::Data(format!("invalid training parameters: {e}")))?;

        self.checkpoint(job.id, room, 0.1, "load recordings").await?;
        let mut recording_tables = Vec::new();
        for recording_id in &params.recording_ids {
            self.check_cancelled(job.id).await?;
            let recording = repository::get_recording(&self.pool, *recording_id)
                .await?
                .ok_or_else(|| PipelineError::Data(format!("recording {recording_id} not found")))?;
            let Some(features_path) = recording.features_path else {
                continue;
            };
            let bytes = self.store.get_bytes(&features_path).await?;
            let table = features::read_parquet(&bytes)?;
            recording_tables.push((*recording_id, features::channel_averaged(&table)));
        }
        self.checkpoint(job.id, room, 0.3, "assemble dataset").await?;

        let labels: std::collections::HashMap<Uuid, i64> =
            params.labels.iter().map(|(id, label)| (*id, *label)).collect();
        let input = trainer::TrainingInput {
            recording_tables: &recording_tables,
            labels: &labels,
            family: params.family,
            cv_folds: self.config.training.cv_folds,
            test_split: self.config.training.test_split,
            seed: 42,
        };
        let output = trainer::train(input)?;
        self.checkpoint(job.id, room, 0.7, "fit and evaluate").await?;

        let model_id = Uuid::new_v4();
        let artifact_bytes = output.artifact.to_bytes()?;
        self.store.put_bytes(artifact_bytes, &paths::model_artifact(&model_id.to_string()), "application/octet-stream").await?;

        let class_labels: Vec<String> = output.classes.iter().map(|c| c.to_string()).collect();
        let confusion_png = trainer::confusion_matrix_png(&output.confusion_matrix, &class_labels)?;
        self.store
            .put_bytes(confusion_png, &paths::model_eval_plot(&model_id.to_string(), "confusion_matrix"), "image/png")
            .await?;
        if !output.roc_curve_points.is_empty() {
            let roc_png = trainer::roc_curve_png(&output.roc_curve_points)?;
            self.store
                .put_bytes(roc_png, &paths::model_eval_plot(&model_id.to_string(), "roc_curve"), "image/png")
                .await?;
        }
        if let Some(importances) = &output.feature_importances {
            let fi_png = trainer::feature_importance_png(&output.artifact.feature_names, importances)?;
            self.store
                .put_bytes(fi_png, &paths::model_eval_plot(&model_id.to_string(), "feature_importance"), "image/png")
                .await?;
        }
        self.checkpoint(job.id, room, 0.85, "save").await?;

        let stage = if trainer::meets_promotion_thresholds(
            &output.holdout_metrics,
            self.config.training.promotion_thresholds.roc_auc,
            self.config.training.promotion_thresholds.f1,
        ) {
            crate::model::ModelStage::Candidate
        } else {
            crate::model::ModelStage::Development
        };

        let model = crate::model::MLModel {
            id: model_id,
            name: params.name.clone(),
            version: params.version.clone(),
            model_type: params.family,
            hyperparameters: serde_json::json!({}),
            metrics: serde_json::to_value(&output.holdout_metrics)
                .map_err(|e| PipelineError::Data(format!("failed to serialize metrics: {e}")))?,
            feature_names: output.artifact.feature_names.clone(),
            scaler_mean: output.artifact.scaler.mean.clone(),
            scaler_scale: output.artifact.scaler.scale.clone(),
            cv_fold_results: serde_json::to_value(&output.cv_fold_results)
                .map_err(|e| PipelineError::Data(format!("failed to serialize cv folds: {e}")))?,
            dataset_recording_ids: params.recording_ids.clone(),
            label_mapping: serde_json::to_value(&params.labels)
                .map_err(|e| PipelineError::Data(format!("failed to serialize label mapping: {e}")))?,
            split_seed: 42,
            stage,
            artifact_path: Some(paths::model_artifact(&model_id.to_string())),
            random_seed: 42,
            created_at: Utc::now(),
        };
        repository::create_model(&self.pool, &model).await?;

        self.checkpoint(job.id, room, 1.0, "done").await?;
        Ok(())
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TrainingParameters {
    pub recording_ids: Vec<Uuid>,
    pub labels: Vec<(Uuid, i64)>,
    pub family: crate::model::ModelFamily,
    pub name: String,
    pub version: String,
}

/// Cancels a job if it is not already terminal; a no-op on a completed,
/// failed or already-cancelled job.
pub async fn cancel_job(pool: &PgPool, job_id: Uuid) -> Result<()> {
    if let Some(job) = repository::get_job(pool, job_id).await? {
        if !job.status.is_terminal() {
            repository::finish_job(pool, job_id, JobStatus::Cancelled, None).await?;
            info!(actor = "operator", action = "cancel_job", entity_type = "processing_job", entity_id = %job_id, outcome = "cancelled", "job cancelled by operator");
        }
    }
    Ok(())
}

/// Pure gate check, pulled out of `promote_model` so the threshold
/// arithmetic is testable without a database.
fn satisfies_promotion_thresholds(roc_auc: f64, f1: f64, thresholds: &crate::config::PromotionThresholds) -> bool {
    roc_auc >= thresholds.roc_auc && f1 >= thresholds.f1
}

/// Promotes `model_id` to `production`, failing with `ThresholdError` if
/// its metrics do not meet the configured thresholds.
pub async fn promote_model(pool: &PgPool, config: &PipelineConfig, model_id: Uuid) -> Result<()> {
    let model = repository::get_model(pool, model_id)
        .await?
        .ok_or_else(|| PipelineError::Model(format!("model {model_id} not found")))?;
    let roc_auc = model.metric("roc_auc").unwrap_or(0.0);
    let f1 = model.metric("f1_weighted").unwrap_or(0.0);
    if !satisfies_promotion_thresholds(roc_auc, f1, &config.training.promotion_thresholds) {
        warn!(actor = "operator", action = "promote_model", entity_type = "ml_model", entity_id = %model_id, outcome = "rejected", roc_auc, f1, "promotion rejected below threshold");
        return Err(PipelineError::Threshold(format!(
            "roc_auc={roc_auc:.3} f1={f1:.3} below thresholds roc_auc>={:.3} f1>={:.3}",
            config.training.promotion_thresholds.roc_auc, config.training.promotion_thresholds.f1
        )));
    }
    repository::promote_model(pool, model_id).await?;
    info!(actor = "operator", action = "promote_model", entity_type = "ml_model", entity_id = %model_id, outcome = "production", "model promoted to production");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_gate_rejects_below_threshold_metrics() {
        let thresholds = crate::config::PromotionThresholds { roc_auc: 0.75, f1: 0.65 };
        assert!(!satisfies_promotion_thresholds(0.70, 0.60, &thresholds));
    }

    #[test]
    fn promotion_gate_accepts_metrics_at_or_above_threshold() {
        let thresholds = crate::config::PromotionThresholds { roc_auc: 0.75, f1: 0.65 };
        assert!(satisfies_promotion_thresholds(0.90, 0.85, &thresholds));
        assert!(satisfies_promotion_thresholds(0.75, 0.65, &thresholds));
    }

    #[test]
    fn training_parameters_round_trip_through_json() {
        let params = TrainingParameters {
            recording_ids: vec![Uuid::new_v4()],
            labels: vec![(Uuid::new_v4(), 1)],
            family: crate::model::ModelFamily::Logistic,
            name: "test-model".into(),
            version: "0.1.0".into(),
        };
        let value = serde_json::to_value(&params).unwrap();
        let decoded: TrainingParameters = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.name, "test-model");
        assert_eq!(decoded.recording_ids, params.recording_ids);
    }
}
