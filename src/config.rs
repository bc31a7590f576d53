//! Pipeline configuration.
//!
//! Loaded the way the teacher's `DatabaseConfig` is loaded: defaults baked
//! in, overridden by an optional TOML file, overridden again by
//! `NEUROPIPE_`-prefixed environment variables. All defaults below mirror
//! spec §6 exactly.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BandpassConfig {
    pub low: f64,
    pub high: f64,
}

impl Default for BandpassConfig {
    fn default() -> Self {
        Self {
            low: 1.0,
            high: 40.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IcaConfig {
    pub n_components: usize,
    pub random_state: u64,
    pub eog_corr_threshold: f64,
    pub ecg_corr_threshold: f64,
}

impl Default for IcaConfig {
    fn default() -> Self {
        Self {
            n_components: 20,
            random_state: 42,
            eog_corr_threshold: 0.35,
            ecg_corr_threshold: 0.30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactConfig {
    pub flat_threshold: f64,
    pub high_variance_zscore: f64,
    pub kurtosis_threshold: f64,
    pub muscle_rms_threshold: f64,
    pub max_bad_channels_pct: f64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            flat_threshold: 1e-6,
            high_variance_zscore: 5.0,
            kurtosis_threshold: 10.0,
            muscle_rms_threshold: 1e-4,
            max_bad_channels_pct: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BandDef {
    pub name: String,
    pub low: f64,
    pub high: f64,
}

fn default_bands() -> Vec<BandDef> {
    vec![
        BandDef { name: "delta".into(), low: 1.0, high: 4.0 },
        BandDef { name: "theta".into(), low: 4.0, high: 8.0 },
        BandDef { name: "alpha".into(), low: 8.0, high: 12.0 },
        BandDef { name: "beta".into(), low: 12.0, high: 30.0 },
        BandDef { name: "gamma".into(), low: 30.0, high: 45.0 },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeaturesConfig {
    pub bands: Vec<BandDef>,
    pub welch_window_sec: f64,
    pub entropy_m: usize,
    pub entropy_r_factor: f64,
    pub epoch_length_sec: f64,
    pub epoch_overlap: f64,
    pub coherence_pairs: Vec<(String, String)>,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            bands: default_bands(),
            welch_window_sec: 2.0,
            entropy_m: 2,
            entropy_r_factor: 0.2,
            epoch_length_sec: 2.0,
            epoch_overlap: 0.5,
            coherence_pairs: vec![
                ("Fz".into(), "Pz".into()),
                ("F3".into(), "P3".into()),
                ("F4".into(), "P4".into()),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromotionThresholds {
    pub roc_auc: f64,
    pub f1: f64,
}

impl Default for PromotionThresholds {
    fn default() -> Self {
        Self {
            roc_auc: 0.75,
            f1: 0.65,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingConfig {
    pub cv_folds: usize,
    pub test_split: f64,
    pub promotion_thresholds: PromotionThresholds,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            cv_folds: 5,
            test_split: 0.2,
            promotion_thresholds: PromotionThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RealtimeConfig {
    pub buffer_seconds: u64,
    pub hop_seconds: f64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            buffer_seconds: 30,
            hop_seconds: 1.0,
        }
    }
}

/// Top-level pipeline configuration, matching spec §6 "Configuration"
/// one-for-one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    pub target_sfreq: u32,
    pub notch_freqs: Vec<f64>,
    pub bandpass: BandpassConfig,
    pub ica: IcaConfig,
    pub artifact: ArtifactConfig,
    pub features: FeaturesConfig,
    pub training: TrainingConfig,
    pub realtime: RealtimeConfig,
    /// Auto-retrain tick period, seconds (not itemized under a single key
    /// in spec §6 but named in §4.10).
    pub retrain_tick_period_secs: u64,
    /// Auto-retrain recording-count threshold (§4.10).
    pub retrain_min_new_recordings: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_sfreq: 250,
            notch_freqs: vec![50.0],
            bandpass: BandpassConfig::default(),
            ica: IcaConfig::default(),
            artifact: ArtifactConfig::default(),
            features: FeaturesConfig::default(),
            training: TrainingConfig::default(),
            realtime: RealtimeConfig::default(),
            retrain_tick_period_secs: 3600,
            retrain_min_new_recordings: 20,
        }
    }
}

impl PipelineConfig {
    /// Load defaults, then an optional TOML file, then `NEUROPIPE_`-prefixed
    /// environment overrides - the same three-layer precedence the teacher
    /// applies to its own `Config`.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let defaults = PipelineConfig::default();
        let defaults_value = serde_json::to_value(&defaults)?;

        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&defaults_value)?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("NEUROPIPE")
                .separator("__")
                .try_parsing(true),
        );

        let built = builder.build()?;
        Ok(built.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.target_sfreq, 250);
        assert_eq!(cfg.notch_freqs, vec![50.0]);
        assert_eq!(cfg.bandpass.low, 1.0);
        assert_eq!(cfg.bandpass.high, 40.0);
        assert_eq!(cfg.ica.n_components, 20);
        assert_eq!(cfg.artifact.max_bad_channels_pct, 0.25);
        assert_eq!(cfg.features.bands.len(), 5);
        assert_eq!(cfg.training.cv_folds, 5);
        assert_eq!(cfg.realtime.buffer_seconds, 30);
    }

    #[test]
    fn load_without_file_returns_defaults() {
        let cfg = PipelineConfig::load(None).unwrap();
        assert_eq!(cfg, PipelineConfig::default());
    }
}
