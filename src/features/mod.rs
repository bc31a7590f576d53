//! Feature Engine (C4): epoch the cleaned buffer, compute per-epoch
//! per-channel features plus recording-level coherence, and produce both
//! the full and channel-averaged views.

mod coherence;
mod stats;
mod table;
mod welch;

pub use stats::{HjorthParameters, TimeDomainStats};
pub use table::{
    canonical_column_names, channel_averaged, read_parquet, summarize, write_parquet, FeatureRow,
    FeatureSummary, FeatureTable,
};
pub use welch::{band_power, welch_psd, PsdEstimate};

use crate::config::FeaturesConfig;
use crate::error::{PipelineError, Result};
use crate::signal::SignalBuffer;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoherenceRow {
    pub channel_a: String,
    pub channel_b: String,
    pub band: String,
    pub coherence: f64,
}

pub struct EpochedView<'a> {
    pub channel_labels: &'a [String],
    pub epochs: Vec<Vec<Vec<f64>>>,
}

/// Split into fixed-length, fractionally-overlapping epochs; the trailing
/// partial epoch is dropped, per §4.4.
pub fn epoch(buffer: &SignalBuffer, epoch_length_sec: f64, overlap: f64) -> EpochedView<'_> {
    let epoch_len = (epoch_length_sec * buffer.sample_rate).round() as usize;
    let hop = ((1.0 - overlap) * epoch_len as f64).round().max(1.0) as usize;

    let n_samples = buffer.n_samples();
    let mut epochs = Vec::new();
    let mut start = 0;
    while start + epoch_len <= n_samples {
        let epoch_data: Vec<Vec<f64>> = buffer
            .data
            .iter()
            .map(|channel| channel[start..start + epoch_len].to_vec())
            .collect();
        epochs.push(epoch_data);
        start += hop;
    }

    EpochedView {
        channel_labels: &buffer.channel_labels,
        epochs,
    }
}

/// Compute the full per-epoch-per-channel feature table (§4.4).
pub fn compute_feature_table(buffer: &SignalBuffer, config: &FeaturesConfig) -> Result<FeatureTable> {
    if buffer.n_samples() == 0 {
        return Err(PipelineError::Data("cannot compute features on an empty buffer".into()));
    }
    let view = epoch(buffer, config.epoch_length_sec, config.epoch_overlap);
    let column_names = canonical_column_names(config);
    let mut rows = Vec::new();

    for (epoch_id, epoch_data) in view.epochs.iter().enumerate() {
        for (ch_idx, channel) in epoch_data.iter().enumerate() {
            let values = compute_channel_features(channel, buffer.sample_rate, config);
            rows.push(FeatureRow {
                epoch_id: epoch_id as i64,
                channel: view.channel_labels[ch_idx].clone(),
                values,
            });
        }
    }

    Ok(FeatureTable { column_names, rows })
}

fn compute_channel_features(channel: &[f64], sfreq: f64, config: &FeaturesConfig) -> Vec<f64> {
    let psd = welch::welch_psd(channel, sfreq, config.welch_window_sec);
    let total_power = welch::band_power(&psd, 1.0, 45.0).max(1e-12);

    let band_powers: Vec<f64> = config
        .bands
        .iter()
        .map(|band| welch::band_power(&psd, band.low, band.high))
        .collect();
    let relative_powers: Vec<f64> = band_powers.iter().map(|p| p / total_power).collect();

    let time_stats = stats::time_domain_stats(channel);
    let hjorth = stats::hjorth_parameters(channel);

    let std = time_stats.std.max(1e-12);
    let entropy = stats::sample_entropy(channel, config.entropy_m, config.entropy_r_factor * std);

    let mut values = Vec::with_capacity(band_powers.len() * 2 + 7 + 3 + 1);
    values.extend(band_powers);
    values.extend(relative_powers);
    values.extend([
        time_stats.mean,
        time_stats.std,
        time_stats.skewness,
        time_stats.excess_kurtosis,
        time_stats.rms,
        time_stats.peak_to_peak,
        time_stats.zero_crossings,
    ]);
    values.extend([hjorth.activity, hjorth.mobility, hjorth.complexity]);
    values.push(entropy);
    values
}

/// One-shot Welch band power over an arbitrary window, for the realtime
/// path (C6) which does not keep a persistent epoch table.
pub fn quick_band_power(signal: &[f64], sfreq: f64, low: f64, high: f64) -> f64 {
    let psd = welch::welch_psd(signal, sfreq, (signal.len() as f64 / sfreq).min(2.0));
    welch::band_power(&psd, low, high)
}

/// Recording-level coherence between configured channel pairs, averaged
/// per band (§4.4).
pub fn compute_coherence(buffer: &SignalBuffer, config: &FeaturesConfig) -> Vec<CoherenceRow> {
    let mut rows = Vec::new();
    for (a_name, b_name) in &config.coherence_pairs {
        let Some(a_idx) = buffer.channel_labels.iter().position(|l| l == a_name) else {
            continue;
        };
        let Some(b_idx) = buffer.channel_labels.iter().position(|l| l == b_name) else {
            continue;
        };
        for band in &config.bands {
            let value = coherence::band_coherence(
                &buffer.data[a_idx],
                &buffer.data[b_idx],
                buffer.sample_rate,
                config.welch_window_sec,
                band.low,
                band.high,
            );
            rows.push(CoherenceRow {
                channel_a: a_name.clone(),
                channel_b: b_name.clone(),
                band: band.name.clone(),
                coherence: value,
            });
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeaturesConfig;
    use crate::signal::SignalBuffer;

    fn alpha_dominant_buffer() -> SignalBuffer {
        let sfreq = 256.0;
        let n = (sfreq * 10.0) as usize;
        let data: Vec<Vec<f64>> = (0..2)
            .map(|_| {
                (0..n)
                    .map(|i| {
                        let t = i as f64 / sfreq;
                        (2.0 * std::f64::consts::PI * 10.0 * t).sin()
                            + 0.1 * (2.0 * std::f64::consts::PI * 20.0 * t).sin()
                    })
                    .collect()
            })
            .collect();
        SignalBuffer {
            channel_labels: vec!["Fz".to_string(), "Pz".to_string()],
            sample_rate: sfreq,
            data,
            montage: None,
        }
    }

    #[test]
    fn relative_band_powers_sum_near_one() {
        let buffer = alpha_dominant_buffer();
        let mut config = FeaturesConfig::default();
        config.bands = vec![
            crate::config::BandDef { name: "delta".into(), low: 1.0, high: 4.0 },
            crate::config::BandDef { name: "theta".into(), low: 4.0, high: 8.0 },
            crate::config::BandDef { name: "alpha".into(), low: 8.0, high: 12.0 },
            crate::config::BandDef { name: "beta".into(), low: 12.0, high: 30.0 },
            crate::config::BandDef { name: "gamma".into(), low: 30.0, high: 45.0 },
        ];
        let table = compute_feature_table(&buffer, &config).unwrap();
        let n_bands = config.bands.len();
        let row = &table.rows[0];
        let rel_sum: f64 = row.values[n_bands..2 * n_bands].iter().sum();
        assert!((rel_sum - 1.0).abs() < 0.05);
    }

    #[test]
    fn row_count_equals_epochs_times_channels() {
        let buffer = alpha_dominant_buffer();
        let config = FeaturesConfig::default();
        let table = compute_feature_table(&buffer, &config).unwrap();
        let view = epoch(&buffer, config.epoch_length_sec, config.epoch_overlap);
        assert_eq!(table.rows.len(), view.epochs.len() * buffer.n_channels());
    }
}
