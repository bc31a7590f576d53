//! Crate-wide error type.
//!
//! One variant per error kind named in the error handling design: callers
//! distinguish retryable storage failures from everything else, and the
//! job orchestrator converts any variant into a terminal job-row mutation.

use thiserror::Error;

/// Sub-kind of a [`PipelineError::Storage`] failure, mirroring the
/// object-store adapter's failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    NotFound,
    Auth,
    Transient,
    Fatal,
}

impl StorageErrorKind {
    /// Only `Transient` failures are worth a bounded retry.
    pub fn is_retryable(self) -> bool {
        matches!(self, StorageErrorKind::Transient)
    }
}

impl std::fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StorageErrorKind::NotFound => "not_found",
            StorageErrorKind::Auth => "auth",
            StorageErrorKind::Transient => "transient",
            StorageErrorKind::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Which DSP stage failed, for [`PipelineError::Dsp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DspStage {
    Resample,
    Notch,
    Bandpass,
    BadChannelDetect,
    Interpolate,
    Ica,
    MuscleArtifact,
}

impl std::fmt::Display for DspStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DspStage::Resample => "resample",
            DspStage::Notch => "notch",
            DspStage::Bandpass => "bandpass",
            DspStage::BadChannelDetect => "bad_channel_detect",
            DspStage::Interpolate => "interpolate",
            DspStage::Ica => "ica",
            DspStage::MuscleArtifact => "muscle_artifact",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("storage error ({kind}): {message}")]
    Storage {
        kind: StorageErrorKind,
        message: String,
    },

    #[error("unsupported or corrupt recording format: {0}")]
    Format(String),

    #[error("DSP stage {stage} failed: {cause}")]
    Dsp { stage: DspStage, cause: String },

    #[error("missing or insufficient data: {0}")]
    Data(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("promotion denied: {0}")]
    Threshold(String),

    #[error("operation exceeded its time budget: {0}")]
    Timeout(String),

    #[error("operation was cancelled")]
    Cancelled,

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn storage(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        PipelineError::Storage {
            kind,
            message: message.into(),
        }
    }

    pub fn dsp(stage: DspStage, cause: impl Into<String>) -> Self {
        PipelineError::Dsp {
            stage,
            cause: cause.into(),
        }
    }

    /// The error kind name as it appears on a job row / terminal event.
    pub fn kind_name(&self) -> &'static str {
        match self {
            PipelineError::Storage { .. } => "StorageError",
            PipelineError::Format(_) => "FormatError",
            PipelineError::Dsp { .. } => "DSPError",
            PipelineError::Data(_) => "DataError",
            PipelineError::Model(_) => "ModelError",
            PipelineError::Threshold(_) => "ThresholdError",
            PipelineError::Timeout(_) => "TimeoutError",
            PipelineError::Cancelled => "Cancelled",
            PipelineError::Database(_) => "DatabaseError",
            PipelineError::Io(_) => "IoError",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
