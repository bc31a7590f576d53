//! Muscle-artifact segment marking (§4.3 stage 7): sliding-window RMS in
//! the 20-40 Hz band. Annotations only — no samples are deleted.

use super::filters::{filtfilt_fir, firwin_bandpass};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuscleSegment {
    pub start_sample: usize,
    pub end_sample: usize,
    pub rms: f64,
}

pub fn detect_muscle_segments(
    data: &[Vec<f64>],
    sfreq: f64,
    threshold: f64,
) -> Vec<MuscleSegment> {
    let window = (0.5 * sfreq).round() as usize;
    if window == 0 || data.is_empty() {
        return Vec::new();
    }
    let taps = firwin_bandpass(101, 20.0, 40.0, sfreq);
    let n_samples = data[0].len();

    let mut segments = Vec::new();
    let mut start = 0;
    while start < n_samples {
        let end = (start + window).min(n_samples);
        let rms = data
            .iter()
            .map(|channel| {
                let filtered = filtfilt_fir(&channel[start..end], &taps);
                let sum_sq: f64 = filtered.iter().map(|v| v * v).sum();
                (sum_sq / filtered.len().max(1) as f64).sqrt()
            })
            .sum::<f64>()
            / data.len() as f64;

        if rms > threshold {
            segments.push(MuscleSegment {
                start_sample: start,
                end_sample: end,
                rms,
            });
        }
        start += window;
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_frequency_burst_is_flagged() {
        let sfreq = 250.0;
        let n = 2500;
        let mut channel = vec![0.0; n];
        for i in 1000..1200 {
            channel[i] = (2.0 * std::f64::consts::PI * 30.0 * i as f64 / sfreq).sin() * 10.0;
        }
        let segments = detect_muscle_segments(&[channel], sfreq, 1e-4);
        assert!(!segments.is_empty());
    }

    #[test]
    fn quiet_signal_has_no_segments() {
        let segments = detect_muscle_segments(&[vec![0.0; 1000]], 250.0, 1e-4);
        assert!(segments.is_empty());
    }
}
