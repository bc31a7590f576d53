//! DSP Kernel (C3): the seven-stage cleaning pipeline run in place on a
//! decoded [`SignalBuffer`].

mod bad_channels;
pub mod filters;
mod ica;
mod interpolate;
mod muscle;
mod resample;

pub use bad_channels::BadChannelReport;
pub use ica::IcaResult;
pub use interpolate::InterpolationOutcome;
pub use muscle::MuscleSegment;

use crate::config::PipelineConfig;
use crate::error::{DspStage, PipelineError, Result};
use crate::signal::SignalBuffer;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Structured metadata the kernel reports alongside the cleaned buffer,
/// per §4.3's closing paragraph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelReport {
    pub resampled_rate: f64,
    pub notch_freqs: Vec<f64>,
    pub bandpass: (f64, f64),
    pub bad_channels: Vec<String>,
    pub needs_review: bool,
    pub excluded_channels: Vec<String>,
    pub ica_rejected_components: Vec<usize>,
    pub ica_component_correlations: Vec<(f64, f64)>,
    pub muscle_segments: Vec<MuscleSegment>,
}

/// Run all seven stages in order. Any stage failure aborts the kernel and
/// discards partial artifacts, per §4.3's failure policy.
pub fn clean(buffer: &mut SignalBuffer, config: &PipelineConfig) -> Result<KernelReport> {
    // 1. Resample
    if (buffer.sample_rate - config.target_sfreq as f64).abs() > 1e-9 {
        info!(from = buffer.sample_rate, to = config.target_sfreq, "resampling");
        let target = config.target_sfreq as f64;
        for channel in &mut buffer.data {
            *channel = resample::resample(channel, buffer.sample_rate, target);
        }
        buffer.sample_rate = target;
    }
    check_finite(&buffer.data, DspStage::Resample)?;

    // 2. Notch
    for &freq in &config.notch_freqs {
        let taps = filters::firwin_bandstop(101, freq - 1.0, freq + 1.0, buffer.sample_rate);
        for channel in &mut buffer.data {
            *channel = filters::filtfilt_fir(channel, &taps);
        }
    }
    check_finite(&buffer.data, DspStage::Notch)?;

    // 3. Band-pass
    let taps = filters::firwin_bandpass(
        201,
        config.bandpass.low,
        config.bandpass.high,
        buffer.sample_rate,
    );
    for channel in &mut buffer.data {
        *channel = filters::filtfilt_fir(channel, &taps);
    }
    check_finite(&buffer.data, DspStage::Bandpass)?;

    // 4. Bad-channel detection
    let bad_report = bad_channels::detect_bad_channels(&buffer.channel_labels, &buffer.data, &config.artifact);
    if bad_report.needs_review {
        warn!(
            bad_count = bad_report.bad_channels.len(),
            total = buffer.channel_labels.len(),
            "bad-channel fraction exceeds threshold"
        );
    }

    // 5. Interpolation
    let outcomes = interpolate::interpolate_bad_channels(
        &buffer.channel_labels,
        &mut buffer.data,
        &bad_report.bad_channels,
        buffer.montage.as_ref(),
    );
    let excluded_channels: Vec<String> = outcomes
        .iter()
        .filter(|(_, outcome)| matches!(outcome, InterpolationOutcome::Excluded))
        .map(|(label, _)| label.clone())
        .collect();
    check_finite(&buffer.data, DspStage::Interpolate)?;

    // 6. ICA
    let (eog_like, ecg_like) = guess_artifact_channel_roles(&buffer.channel_labels);
    let mut ica_rejected = Vec::new();
    let mut ica_correlations = Vec::new();
    if let Some(result) = ica::fit_ica(
        &buffer.data,
        config.ica.n_components,
        config.ica.random_state,
        &eog_like,
        &ecg_like,
        config.ica.eog_corr_threshold,
        config.ica.ecg_corr_threshold,
    ) {
        ica_rejected = result.rejected_components.clone();
        ica_correlations = result.component_correlations.clone();
        if !result.rejected_components.is_empty() {
            buffer.data = ica::subtract_components(&buffer.data, &result);
        }
    }
    check_finite(&buffer.data, DspStage::Ica)?;

    // 7. Muscle-artifact marking (detection only, does not mutate `buffer.data`)
    let muscle_segments =
        muscle::detect_muscle_segments(&buffer.data, buffer.sample_rate, config.artifact.muscle_rms_threshold);

    Ok(KernelReport {
        resampled_rate: buffer.sample_rate,
        notch_freqs: config.notch_freqs.clone(),
        bandpass: (config.bandpass.low, config.bandpass.high),
        bad_channels: bad_report.bad_channels,
        needs_review: bad_report.needs_review,
        excluded_channels,
        ica_rejected_components: ica_rejected,
        ica_component_correlations: ica_correlations,
        muscle_segments,
    })
}

/// Checked right after the stage that could have introduced it, so a NaN
/// is attributed to the stage that actually produced it rather than to
/// whichever stage happens to run last.
fn check_finite(data: &[Vec<f64>], stage: DspStage) -> Result<()> {
    if data.iter().any(|channel| channel.iter().any(|v| v.is_nan())) {
        return Err(PipelineError::dsp(stage, "NaN produced during cleaning"));
    }
    Ok(())
}

/// Heuristic role assignment from channel labels: EOG-like channels are
/// named `EOG*` or, failing that, frontal 10-20 channels; ECG-like
/// channels are named `ECG*`/`EKG*`.
fn guess_artifact_channel_roles(labels: &[String]) -> (Vec<usize>, Vec<usize>) {
    let mut eog: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|(_, l)| l.to_uppercase().starts_with("EOG"))
        .map(|(i, _)| i)
        .collect();
    if eog.is_empty() {
        eog = labels
            .iter()
            .enumerate()
            .filter(|(_, l)| l.starts_with("Fp") || l.starts_with("F7") || l.starts_with("F8"))
            .map(|(i, _)| i)
            .collect();
    }
    let ecg = labels
        .iter()
        .enumerate()
        .filter(|(_, l)| {
            let upper = l.to_uppercase();
            upper.starts_with("ECG") || upper.starts_with("EKG")
        })
        .map(|(i, _)| i)
        .collect();
    (eog, ecg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalBuffer;

    fn synthetic_buffer() -> SignalBuffer {
        let sfreq = 256.0;
        let n = (sfreq * 10.0) as usize;
        let labels: Vec<String> = (0..6).map(|i| format!("Ch{i}")).collect();
        let data: Vec<Vec<f64>> = (0..6)
            .map(|_| {
                (0..n)
                    .map(|i| {
                        let t = i as f64 / sfreq;
                        0.5 * (2.0 * std::f64::consts::PI * 2.0 * t).sin()
                            + 0.3 * (2.0 * std::f64::consts::PI * 6.0 * t).sin()
                            + 0.4 * (2.0 * std::f64::consts::PI * 10.0 * t).sin()
                            + 0.2 * (2.0 * std::f64::consts::PI * 20.0 * t).sin()
                            + 0.1 * (2.0 * std::f64::consts::PI * 40.0 * t).sin()
                    })
                    .collect()
            })
            .collect();
        SignalBuffer {
            channel_labels: labels,
            sample_rate: sfreq,
            data,
            montage: None,
        }
    }

    #[test]
    fn cleans_synthetic_multicomponent_signal_without_error() {
        let mut buffer = synthetic_buffer();
        let config = PipelineConfig::default();
        let report = clean(&mut buffer, &config).unwrap();
        assert_eq!(report.resampled_rate, 250.0);
        assert_eq!(buffer.sample_rate, 250.0);
    }

    #[test]
    fn flat_channel_is_detected_and_then_excluded_without_montage() {
        let mut buffer = synthetic_buffer();
        buffer.data[0] = vec![0.0; buffer.data[0].len()];
        let config = PipelineConfig::default();
        let report = clean(&mut buffer, &config).unwrap();
        assert!(report.bad_channels.contains(&"Ch0".to_string()));
    }
}
