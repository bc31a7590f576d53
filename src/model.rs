//! Domain entities: plain data records with explicit field types and a thin
//! persistence port, per the "Dynamic ORM entities" design note — no
//! traversable object graphs, relationships are IDs plus lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use sqlx::Type;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: Uuid,
    pub label: String,
    pub date_of_birth: Option<chrono::NaiveDate>,
    pub notes: Json,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub protocol: Json,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum RecordingFormat {
    Edf,
    Bdf,
    Fif,
    Eeglab,
}

impl RecordingFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "edf" => Some(Self::Edf),
            "bdf" => Some(Self::Bdf),
            "fif" => Some(Self::Fif),
            "set" => Some(Self::Eeglab),
            _ => None,
        }
    }
}

/// `uploaded -> processing -> {processed | failed | needs_review}`, with
/// `needs_review` reachable only from `processing`. Terminal states are
/// sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum RecordingStatus {
    Uploaded,
    Processing,
    Processed,
    Failed,
    NeedsReview,
}

impl RecordingStatus {
    /// Whether `self -> next` is a legal transition per §3's graph.
    pub fn can_transition_to(self, next: RecordingStatus) -> bool {
        use RecordingStatus::*;
        matches!(
            (self, next),
            (Uploaded, Processing)
                | (Processing, Processed)
                | (Processing, Failed)
                | (Processing, NeedsReview)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RecordingStatus::Processed | RecordingStatus::Failed | RecordingStatus::NeedsReview
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub id: Uuid,
    pub session_id: Uuid,
    pub original_filename: String,
    pub format: RecordingFormat,
    pub sample_rate: Option<f64>,
    pub channel_count: Option<i32>,
    pub duration_seconds: Option<f64>,
    pub status: RecordingStatus,
    pub raw_path: String,
    pub cleaned_path: Option<String>,
    pub features_path: Option<String>,
    pub meta: Json,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recording {
    /// §3 invariants, checked at the edges that mutate status/paths.
    pub fn check_invariants(&self) -> Result<(), String> {
        let cleaned_required = matches!(
            self.status,
            RecordingStatus::Processed | RecordingStatus::NeedsReview
        );
        if cleaned_required != self.cleaned_path.is_some() {
            return Err(format!(
                "cleaned_path presence ({}) disagrees with status {:?}",
                self.cleaned_path.is_some(),
                self.status
            ));
        }
        if self.features_path.is_some() && self.cleaned_path.is_none() {
            return Err("features_path set without cleaned_path".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ProcessingStep {
    Preprocessing,
    FeatureExtraction,
    Training,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub id: Uuid,
    pub recording_id: Option<Uuid>,
    pub training_recording_ids: Option<Vec<Uuid>>,
    pub step: ProcessingStep,
    pub parameters: Json,
    pub status: JobStatus,
    pub progress: f64,
    pub log: String,
    pub error: Option<String>,
    pub worker_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ProcessingJob {
    pub fn check_invariants(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.progress) {
            return Err(format!("progress {} out of [0,1]", self.progress));
        }
        if self.status.is_terminal() != self.finished_at.is_some() {
            return Err("finished_at presence disagrees with terminal status".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ModelStage {
    Development,
    Candidate,
    Production,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ModelFamily {
    Logistic,
    RandomForest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLModel {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub model_type: ModelFamily,
    pub hyperparameters: Json,
    pub metrics: Json,
    pub feature_names: Vec<String>,
    pub scaler_mean: Vec<f64>,
    pub scaler_scale: Vec<f64>,
    pub cv_fold_results: Json,
    pub dataset_recording_ids: Vec<Uuid>,
    pub label_mapping: Json,
    pub split_seed: i64,
    pub stage: ModelStage,
    pub artifact_path: Option<String>,
    pub random_seed: i64,
    pub created_at: DateTime<Utc>,
}

impl MLModel {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).and_then(|v| v.as_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_status_graph_matches_spec() {
        use RecordingStatus::*;
        assert!(Uploaded.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Processed));
        assert!(Processing.can_transition_to(NeedsReview));
        assert!(!Uploaded.can_transition_to(Processed));
        assert!(!Processed.can_transition_to(Processing));
        assert!(Processed.is_terminal());
        assert!(NeedsReview.is_terminal());
        assert!(!Processing.is_terminal());
    }

    #[test]
    fn recording_invariant_rejects_mismatched_cleaned_path() {
        let rec = Recording {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            original_filename: "x.edf".into(),
            format: RecordingFormat::Edf,
            sample_rate: Some(256.0),
            channel_count: Some(6),
            duration_seconds: Some(10.0),
            status: RecordingStatus::Processed,
            raw_path: "raw/x".into(),
            cleaned_path: None,
            features_path: None,
            meta: Json::Null,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(rec.check_invariants().is_err());
    }

    #[test]
    fn job_progress_must_be_in_unit_interval() {
        let mut job = ProcessingJob {
            id: Uuid::new_v4(),
            recording_id: Some(Uuid::new_v4()),
            training_recording_ids: None,
            step: ProcessingStep::Preprocessing,
            parameters: Json::Null,
            status: JobStatus::Running,
            progress: 1.5,
            log: String::new(),
            error: None,
            worker_id: None,
            started_at: Some(Utc::now()),
            finished_at: None,
            created_at: Utc::now(),
        };
        assert!(job.check_invariants().is_err());
        job.progress = 0.5;
        assert!(job.check_invariants().is_ok());
    }
}
