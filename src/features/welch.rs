//! Welch power spectral density estimate via `rustfft`, Hann-windowed,
//! 50% overlap, matching the parameters named in §4.4.

use num_complex::Complex64;
use rustfft::FftPlanner;

pub struct PsdEstimate {
    pub freqs: Vec<f64>,
    pub power: Vec<f64>,
}

pub fn welch_psd(signal: &[f64], sfreq: f64, segment_seconds: f64) -> PsdEstimate {
    let seg_len = ((segment_seconds * sfreq).round() as usize).max(4).min(signal.len().max(4));
    let hop = (seg_len / 2).max(1);
    let window = hann_window(seg_len);
    let window_power: f64 = window.iter().map(|w| w * w).sum();

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(seg_len);

    let n_freqs = seg_len / 2 + 1;
    let mut accum = vec![0.0; n_freqs];
    let mut n_segments = 0usize;

    let mut start = 0;
    while start + seg_len <= signal.len() {
        let mut buffer: Vec<Complex64> = signal[start..start + seg_len]
            .iter()
            .zip(window.iter())
            .map(|(&x, &w)| Complex64::new(x * w, 0.0))
            .collect();
        fft.process(&mut buffer);

        for (k, item) in accum.iter_mut().enumerate() {
            let mag_sq = buffer[k].norm_sqr();
            *item += mag_sq / (sfreq * window_power);
        }
        n_segments += 1;
        start += hop;
    }

    if n_segments == 0 {
        return PsdEstimate {
            freqs: (0..n_freqs).map(|k| k as f64 * sfreq / seg_len as f64).collect(),
            power: vec![0.0; n_freqs],
        };
    }

    for p in &mut accum {
        *p /= n_segments as f64;
        // one-sided spectrum: double all but DC/Nyquist
    }
    for k in 1..n_freqs.saturating_sub(1) {
        accum[k] *= 2.0;
    }

    let freqs = (0..n_freqs).map(|k| k as f64 * sfreq / seg_len as f64).collect();
    PsdEstimate { freqs, power: accum }
}

fn hann_window(n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

/// Trapezoidal integral of the PSD over `[low, high]` Hz.
pub fn band_power(psd: &PsdEstimate, low: f64, high: f64) -> f64 {
    let mut total = 0.0;
    for i in 1..psd.freqs.len() {
        let f0 = psd.freqs[i - 1];
        let f1 = psd.freqs[i];
        if f1 < low || f0 > high {
            continue;
        }
        let p0 = psd.power[i - 1];
        let p1 = psd.power[i];
        total += (p0 + p1) / 2.0 * (f1 - f0);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_dominant_frequency() {
        let sfreq = 256.0;
        let n = 2000;
        let signal: Vec<f64> = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * 10.0 * i as f64 / sfreq).sin())
            .collect();
        let psd = welch_psd(&signal, sfreq, 2.0);
        let alpha = band_power(&psd, 8.0, 12.0);
        let beta = band_power(&psd, 12.0, 30.0);
        assert!(alpha > beta);
    }
}
