//! Coherence between configured channel pairs (§4.4), averaged per band.
//! One row per recording, not per epoch.

use num_complex::Complex64;
use rustfft::FftPlanner;

pub fn band_coherence(a: &[f64], b: &[f64], sfreq: f64, segment_seconds: f64, low: f64, high: f64) -> f64 {
    let seg_len = ((segment_seconds * sfreq).round() as usize).max(4).min(a.len().max(4)).min(b.len().max(4));
    let hop = (seg_len / 2).max(1);

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(seg_len);
    let window = hann(seg_len);

    let n_freqs = seg_len / 2 + 1;
    let mut pxx = vec![0.0; n_freqs];
    let mut pyy = vec![0.0; n_freqs];
    let mut pxy = vec![Complex64::new(0.0, 0.0); n_freqs];
    let mut n_segments = 0usize;

    let mut start = 0;
    while start + seg_len <= a.len().min(b.len()) {
        let mut fa: Vec<Complex64> = a[start..start + seg_len]
            .iter()
            .zip(&window)
            .map(|(&v, &w)| Complex64::new(v * w, 0.0))
            .collect();
        let mut fb: Vec<Complex64> = b[start..start + seg_len]
            .iter()
            .zip(&window)
            .map(|(&v, &w)| Complex64::new(v * w, 0.0))
            .collect();
        fft.process(&mut fa);
        fft.process(&mut fb);

        for k in 0..n_freqs {
            pxx[k] += fa[k].norm_sqr();
            pyy[k] += fb[k].norm_sqr();
            pxy[k] += fa[k] * fb[k].conj();
        }
        n_segments += 1;
        start += hop;
    }

    if n_segments == 0 {
        return 0.0;
    }

    let freqs: Vec<f64> = (0..n_freqs).map(|k| k as f64 * sfreq / seg_len as f64).collect();
    let mut num = 0.0;
    let mut den_x = 0.0;
    let mut den_y = 0.0;
    for (k, &f) in freqs.iter().enumerate() {
        if f < low || f > high {
            continue;
        }
        num += pxy[k].norm_sqr();
        den_x += pxx[k];
        den_y += pyy[k];
    }

    if den_x < 1e-12 || den_y < 1e-12 {
        0.0
    } else {
        (num / (den_x * den_y)).sqrt()
    }
}

fn hann(n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_signals_are_fully_coherent() {
        let sfreq = 256.0;
        let n = 2000;
        let signal: Vec<f64> = (0..n).map(|i| (2.0 * std::f64::consts::PI * 10.0 * i as f64 / sfreq).sin()).collect();
        let coherence = band_coherence(&signal, &signal, sfreq, 2.0, 8.0, 12.0);
        assert!(coherence > 0.9);
    }

    #[test]
    fn unrelated_signals_have_low_coherence() {
        let sfreq = 256.0;
        let n = 2000;
        let a: Vec<f64> = (0..n).map(|i| (2.0 * std::f64::consts::PI * 10.0 * i as f64 / sfreq).sin()).collect();
        let b: Vec<f64> = (0..n)
            .map(|i| {
                let x = (i * 2654435761u32 as usize) as f64 % 1000.0;
                (x / 1000.0) - 0.5
            })
            .collect();
        let coherence = band_coherence(&a, &b, sfreq, 2.0, 8.0, 12.0);
        assert!(coherence < 0.9);
    }
}
