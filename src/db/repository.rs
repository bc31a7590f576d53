//! Postgres-backed CRUD for the five entities in §3, following the
//! teacher's one-function-per-operation style (see `db/queue.rs`'s
//! original table-access functions) rather than a generic repository
//! trait.

use crate::error::Result;
use crate::model::{
    JobStatus, MLModel, ModelFamily, ModelStage, ProcessingJob, ProcessingStep, Recording,
    RecordingFormat, RecordingStatus, Session, Subject,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as Json;
use sqlx::types::Json as SqlxJson;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct SubjectRow {
    id: Uuid,
    label: String,
    date_of_birth: Option<NaiveDate>,
    notes: SqlxJson<Json>,
    created_at: DateTime<Utc>,
}

impl From<SubjectRow> for Subject {
    fn from(row: SubjectRow) -> Self {
        Subject {
            id: row.id,
            label: row.label,
            date_of_birth: row.date_of_birth,
            notes: row.notes.0,
            created_at: row.created_at,
        }
    }
}

pub async fn create_subject(pool: &PgPool, label: &str, date_of_birth: Option<NaiveDate>, notes: Json) -> Result<Subject> {
    let row: SubjectRow = sqlx::query_as(
        "INSERT INTO subjects (id, label, date_of_birth, notes) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(label)
    .bind(date_of_birth)
    .bind(SqlxJson(notes))
    .fetch_one(pool)
    .await?;
    Ok(row.into())
}

pub async fn get_subject(pool: &PgPool, id: Uuid) -> Result<Option<Subject>> {
    let row: Option<SubjectRow> = sqlx::query_as("SELECT * FROM subjects WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Into::into))
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    subject_id: Uuid,
    occurred_at: DateTime<Utc>,
    protocol: SqlxJson<Json>,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: row.id,
            subject_id: row.subject_id,
            occurred_at: row.occurred_at,
            protocol: row.protocol.0,
            created_at: row.created_at,
        }
    }
}

pub async fn create_session(pool: &PgPool, subject_id: Uuid, occurred_at: DateTime<Utc>, protocol: Json) -> Result<Session> {
    let row: SessionRow = sqlx::query_as(
        "INSERT INTO sessions (id, subject_id, occurred_at, protocol) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(subject_id)
    .bind(occurred_at)
    .bind(SqlxJson(protocol))
    .fetch_one(pool)
    .await?;
    Ok(row.into())
}

pub async fn get_session(pool: &PgPool, id: Uuid) -> Result<Option<Session>> {
    let row: Option<SessionRow> = sqlx::query_as("SELECT * FROM sessions WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Into::into))
}

#[derive(sqlx::FromRow)]
struct RecordingRow {
    id: Uuid,
    session_id: Uuid,
    original_filename: String,
    format: RecordingFormat,
    sample_rate: Option<f64>,
    channel_count: Option<i32>,
    duration_seconds: Option<f64>,
    status: RecordingStatus,
    raw_path: String,
    cleaned_path: Option<String>,
    features_path: Option<String>,
    meta: SqlxJson<Json>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RecordingRow> for Recording {
    fn from(row: RecordingRow) -> Self {
        Recording {
            id: row.id,
            session_id: row.session_id,
            original_filename: row.original_filename,
            format: row.format,
            sample_rate: row.sample_rate,
            channel_count: row.channel_count,
            duration_seconds: row.duration_seconds,
            status: row.status,
            raw_path: row.raw_path,
            cleaned_path: row.cleaned_path,
            features_path: row.features_path,
            meta: row.meta.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub async fn create_recording(
    pool: &PgPool,
    session_id: Uuid,
    original_filename: &str,
    format: RecordingFormat,
    raw_path: &str,
) -> Result<Recording> {
    let row: RecordingRow = sqlx::query_as(
        "INSERT INTO recordings (id, session_id, original_filename, format, status, raw_path, meta)
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(session_id)
    .bind(original_filename)
    .bind(format)
    .bind(RecordingStatus::Uploaded)
    .bind(raw_path)
    .bind(SqlxJson(Json::Object(Default::default())))
    .fetch_one(pool)
    .await?;
    Ok(row.into())
}

pub async fn get_recording(pool: &PgPool, id: Uuid) -> Result<Option<Recording>> {
    let row: Option<RecordingRow> = sqlx::query_as("SELECT * FROM recordings WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Into::into))
}

/// Transitions `recordings.status`, stamping `updated_at`. Callers must
/// have already checked [`RecordingStatus::can_transition_to`].
pub async fn update_recording_status(
    pool: &PgPool,
    id: Uuid,
    status: RecordingStatus,
    cleaned_path: Option<&str>,
    features_path: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE recordings SET status = $2, cleaned_path = COALESCE($3, cleaned_path),
         features_path = COALESCE($4, features_path), updated_at = now() WHERE id = $1",
    )
    .bind(id)
    .bind(status)
    .bind(cleaned_path)
    .bind(features_path)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn recordings_newer_than(pool: &PgPool, since: DateTime<Utc>) -> Result<Vec<Recording>> {
    let rows: Vec<RecordingRow> = sqlx::query_as(
        "SELECT * FROM recordings WHERE created_at > $1 AND features_path IS NOT NULL",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

#[derive(sqlx::FromRow)]
struct ProcessingJobRow {
    id: Uuid,
    recording_id: Option<Uuid>,
    training_recording_ids: Option<SqlxJson<Vec<Uuid>>>,
    step: ProcessingStep,
    parameters: SqlxJson<Json>,
    status: JobStatus,
    progress: f64,
    log: String,
    error: Option<String>,
    worker_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<ProcessingJobRow> for ProcessingJob {
    fn from(row: ProcessingJobRow) -> Self {
        ProcessingJob {
            id: row.id,
            recording_id: row.recording_id,
            training_recording_ids: row.training_recording_ids.map(|j| j.0),
            step: row.step,
            parameters: row.parameters.0,
            status: row.status,
            progress: row.progress,
            log: row.log,
            error: row.error,
            worker_id: row.worker_id,
            started_at: row.started_at,
            finished_at: row.finished_at,
            created_at: row.created_at,
        }
    }
}

pub async fn create_job(
    pool: &PgPool,
    recording_id: Option<Uuid>,
    training_recording_ids: Option<Vec<Uuid>>,
    step: ProcessingStep,
    parameters: Json,
) -> Result<ProcessingJob> {
    let row: ProcessingJobRow = sqlx::query_as(
        "INSERT INTO processing_jobs (id, recording_id, training_recording_ids, step, parameters, status, progress)
         VALUES ($1, $2, $3, $4, $5, $6, 0.0) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(recording_id)
    .bind(training_recording_ids.map(SqlxJson))
    .bind(step)
    .bind(SqlxJson(parameters))
    .bind(JobStatus::Pending)
    .fetch_one(pool)
    .await?;
    Ok(row.into())
}

pub async fn get_job(pool: &PgPool, id: Uuid) -> Result<Option<ProcessingJob>> {
    let row: Option<ProcessingJobRow> = sqlx::query_as("SELECT * FROM processing_jobs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Into::into))
}

/// Atomically claims a pending job for `step`, returning `None` if
/// another worker already claimed it or there's nothing pending. The
/// `status = 'pending'` predicate inside `UPDATE ... WHERE` is what makes
/// this safe under concurrent claim attempts.
pub async fn claim_next_pending_job(pool: &PgPool, step: ProcessingStep, worker_id: &str) -> Result<Option<ProcessingJob>> {
    let row: Option<ProcessingJobRow> = sqlx::query_as(
        "UPDATE processing_jobs SET status = 'running', worker_id = $2, started_at = now()
         WHERE id = (
             SELECT id FROM processing_jobs
             WHERE step = $1 AND status = 'pending'
             ORDER BY created_at ASC
             LIMIT 1
             FOR UPDATE SKIP LOCKED
         )
         RETURNING *",
    )
    .bind(step)
    .bind(worker_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Into::into))
}

pub async fn update_job_progress(pool: &PgPool, id: Uuid, progress: f64, log_line: &str) -> Result<()> {
    sqlx::query("UPDATE processing_jobs SET progress = $2, log = log || $3 || E'\\n' WHERE id = $1")
        .bind(id)
        .bind(progress)
        .bind(log_line)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn finish_job(pool: &PgPool, id: Uuid, status: JobStatus, error: Option<&str>) -> Result<()> {
    sqlx::query(
        "UPDATE processing_jobs SET status = $2, error = $3, finished_at = now(),
         progress = CASE WHEN $2 = 'completed' THEN 1.0 ELSE progress END WHERE id = $1",
    )
    .bind(id)
    .bind(status)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct MLModelRow {
    id: Uuid,
    name: String,
    version: String,
    model_type: ModelFamily,
    hyperparameters: SqlxJson<Json>,
    metrics: SqlxJson<Json>,
    feature_names: SqlxJson<Vec<String>>,
    scaler_mean: SqlxJson<Vec<f64>>,
    scaler_scale: SqlxJson<Vec<f64>>,
    cv_fold_results: SqlxJson<Json>,
    dataset_recording_ids: SqlxJson<Vec<Uuid>>,
    label_mapping: SqlxJson<Json>,
    split_seed: i64,
    stage: ModelStage,
    artifact_path: Option<String>,
    random_seed: i64,
    created_at: DateTime<Utc>,
}

impl From<MLModelRow> for MLModel {
    fn from(row: MLModelRow) -> Self {
        MLModel {
            id: row.id,
            name: row.name,
            version: row.version,
            model_type: row.model_type,
            hyperparameters: row.hyperparameters.0,
            metrics: row.metrics.0,
            feature_names: row.feature_names.0,
            scaler_mean: row.scaler_mean.0,
            scaler_scale: row.scaler_scale.0,
            cv_fold_results: row.cv_fold_results.0,
            dataset_recording_ids: row.dataset_recording_ids.0,
            label_mapping: row.label_mapping.0,
            split_seed: row.split_seed,
            stage: row.stage,
            artifact_path: row.artifact_path,
            random_seed: row.random_seed,
            created_at: row.created_at,
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn create_model(pool: &PgPool, model: &MLModel) -> Result<MLModel> {
    let row: MLModelRow = sqlx::query_as(
        "INSERT INTO ml_models (id, name, version, model_type, hyperparameters, metrics, feature_names,
         scaler_mean, scaler_scale, cv_fold_results, dataset_recording_ids, label_mapping, split_seed,
         stage, artifact_path, random_seed)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) RETURNING *",
    )
    .bind(model.id)
    .bind(&model.name)
    .bind(&model.version)
    .bind(model.model_type)
    .bind(SqlxJson(model.hyperparameters.clone()))
    .bind(SqlxJson(model.metrics.clone()))
    .bind(SqlxJson(model.feature_names.clone()))
    .bind(SqlxJson(model.scaler_mean.clone()))
    .bind(SqlxJson(model.scaler_scale.clone()))
    .bind(SqlxJson(model.cv_fold_results.clone()))
    .bind(SqlxJson(model.dataset_recording_ids.clone()))
    .bind(SqlxJson(model.label_mapping.clone()))
    .bind(model.split_seed)
    .bind(model.stage)
    .bind(&model.artifact_path)
    .bind(model.random_seed)
    .fetch_one(pool)
    .await?;
    Ok(row.into())
}

pub async fn get_model(pool: &PgPool, id: Uuid) -> Result<Option<MLModel>> {
    let row: Option<MLModelRow> = sqlx::query_as("SELECT * FROM ml_models WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Into::into))
}

/// The current production model, if any - there is at most one by
/// construction (see [`promote_model`]).
pub async fn current_production_model(pool: &PgPool) -> Result<Option<MLModel>> {
    let row: Option<MLModelRow> = sqlx::query_as("SELECT * FROM ml_models WHERE stage = 'production' LIMIT 1")
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Into::into))
}

/// Promotes `id` to production, atomically demoting any prior production
/// model to candidate so the at-most-one-production invariant holds.
pub async fn promote_model(pool: &PgPool, id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE ml_models SET stage = 'candidate' WHERE stage = 'production'")
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE ml_models SET stage = 'production' WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}
