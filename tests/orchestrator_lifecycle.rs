//! Job-orchestrator lifecycle tests that need a real Postgres instance,
//! per the ambient-stack convention: most logic is unit-tested inline,
//! but cancellation and promotion touch the database directly and go
//! here instead.

use neuropipe::config::PipelineConfig;
use neuropipe::db::repository;
use neuropipe::model::{JobStatus, ModelFamily, ModelStage, ProcessingStep};
use neuropipe::orchestrator;
use sqlx::PgPool;

fn sample_model(name: &str, roc_auc: f64, f1_weighted: f64) -> neuropipe::model::MLModel {
    neuropipe::model::MLModel {
        id: uuid::Uuid::new_v4(),
        name: name.to_string(),
        version: "0.1.0".into(),
        model_type: ModelFamily::Logistic,
        hyperparameters: serde_json::json!({}),
        metrics: serde_json::json!({ "roc_auc": roc_auc, "f1_weighted": f1_weighted }),
        feature_names: vec!["delta_power".into()],
        scaler_mean: vec![0.0],
        scaler_scale: vec![1.0],
        cv_fold_results: serde_json::json!([]),
        dataset_recording_ids: vec![],
        label_mapping: serde_json::json!({}),
        split_seed: 42,
        stage: ModelStage::Development,
        artifact_path: None,
        random_seed: 42,
        created_at: chrono::Utc::now(),
    }
}

#[sqlx::test]
async fn cancelling_a_pending_job_marks_it_cancelled(pool: PgPool) -> sqlx::Result<()> {
    let job = repository::create_job(&pool, None, None, ProcessingStep::Training, serde_json::json!({}))
        .await
        .unwrap();

    orchestrator::cancel_job(&pool, job.id).await.unwrap();

    let reloaded = repository::get_job(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, JobStatus::Cancelled);
    assert!(reloaded.finished_at.is_some());
    Ok(())
}

#[sqlx::test]
async fn cancelling_a_terminal_job_is_a_no_op(pool: PgPool) -> sqlx::Result<()> {
    let job = repository::create_job(&pool, None, None, ProcessingStep::Training, serde_json::json!({}))
        .await
        .unwrap();
    repository::finish_job(&pool, job.id, JobStatus::Completed, None).await.unwrap();

    orchestrator::cancel_job(&pool, job.id).await.unwrap();

    let reloaded = repository::get_job(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, JobStatus::Completed);
    Ok(())
}

#[sqlx::test]
async fn promotion_fails_below_threshold_and_succeeds_above_it(pool: PgPool) -> sqlx::Result<()> {
    let config = PipelineConfig::default();

    let weak = sample_model("weak", 0.70, 0.60);
    repository::create_model(&pool, &weak).await.unwrap();
    let err = orchestrator::promote_model(&pool, &config, weak.id).await.unwrap_err();
    assert!(matches!(err, neuropipe::PipelineError::Threshold(_)));

    let strong = sample_model("strong", 0.90, 0.85);
    repository::create_model(&pool, &strong).await.unwrap();
    orchestrator::promote_model(&pool, &config, strong.id).await.unwrap();

    let reloaded = repository::get_model(&pool, strong.id).await.unwrap().unwrap();
    assert_eq!(reloaded.stage, ModelStage::Production);
    Ok(())
}

#[sqlx::test]
async fn promoting_a_new_model_demotes_the_prior_production_model(pool: PgPool) -> sqlx::Result<()> {
    let config = PipelineConfig::default();

    let first = sample_model("first", 0.90, 0.85);
    repository::create_model(&pool, &first).await.unwrap();
    orchestrator::promote_model(&pool, &config, first.id).await.unwrap();

    let second = sample_model("second", 0.92, 0.88);
    repository::create_model(&pool, &second).await.unwrap();
    orchestrator::promote_model(&pool, &config, second.id).await.unwrap();

    let first_reloaded = repository::get_model(&pool, first.id).await.unwrap().unwrap();
    let second_reloaded = repository::get_model(&pool, second.id).await.unwrap().unwrap();
    assert_eq!(first_reloaded.stage, ModelStage::Candidate);
    assert_eq!(second_reloaded.stage, ModelStage::Production);
    Ok(())
}
