//! # neuropipe
//!
//! Asynchronous neurophysiological signal processing pipeline: durable
//! job orchestration for EEG/MEG preprocessing, feature extraction and
//! model training, plus a numerical DSP/feature-extraction engine whose
//! outputs are a stable contract between the trainer and the real-time
//! streaming path.
//!
//! ## Architecture
//!
//! - `storage` - object-store adapter over the raw/cleaned/features
//!   layout, with bounded retry on transient failures
//! - `signal` - recording decode (EDF/BDF/FIF/EEGLAB) and channel-name
//!   normalization
//! - `dsp` - the cleaning kernel: resample, notch, band-pass,
//!   bad-channel detection/interpolation, ICA, muscle-artifact marking
//! - `features` - Welch PSD band power, time-domain stats, Hjorth
//!   parameters, sample entropy, coherence, and the canonical feature
//!   table contract
//! - `ringbuffer` / `realtime` - the streaming feature/inference path
//! - `trainer` - scaler + PCA + classifier pipeline with CV and
//!   promotion gates
//! - `orchestrator` - the durable job state machine
//! - `events` - the in-process broadcast bus for job/recording/realtime
//!   updates
//! - `retrain` - the periodic retrain-recommendation tick

pub mod config;
pub mod db;
pub mod dsp;
pub mod error;
pub mod events;
pub mod features;
pub mod model;
pub mod orchestrator;
pub mod realtime;
pub mod retrain;
pub mod ringbuffer;
pub mod signal;
pub mod storage;
pub mod trainer;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};

/// Re-export of the commonly used types, for `use neuropipe::prelude::*`.
pub mod prelude {
    pub use crate::config::PipelineConfig;
    pub use crate::error::{DspStage, PipelineError, Result, StorageErrorKind};
    pub use crate::model::{
        JobStatus, MLModel, ModelFamily, ModelStage, ProcessingJob, ProcessingStep, Recording,
        RecordingFormat, RecordingStatus, Session, Subject,
    };
    pub use crate::storage::ObjectStore;
}
