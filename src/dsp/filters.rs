//! FIR filter design (`firwin`-style) and zero-phase (`filtfilt`-style)
//! forward-backward application, plus IIR notch/Butterworth for the
//! realtime path.

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type as BiquadType, Q_BUTTERWORTH_F64};

/// Windowed-sinc lowpass/bandpass/highpass FIR design, Hamming window,
/// matching the shape of scipy's `firwin`.
pub fn firwin_bandpass(numtaps: usize, low: f64, high: f64, fs: f64) -> Vec<f64> {
    let nyq = fs / 2.0;
    firwin(numtaps, &[low / nyq, high / nyq], false)
}

pub fn firwin_bandstop(numtaps: usize, low: f64, high: f64, fs: f64) -> Vec<f64> {
    let nyq = fs / 2.0;
    firwin(numtaps, &[low / nyq, high / nyq], true)
}

pub fn firwin_lowpass(numtaps: usize, cutoff: f64, fs: f64) -> Vec<f64> {
    let nyq = fs / 2.0;
    firwin(numtaps, &[cutoff / nyq], false)
}

/// `cuts` are normalized to [0, 1] where 1 = Nyquist. One cut => lowpass,
/// two cuts => bandpass (or bandstop if `invert`).
fn firwin(numtaps: usize, cuts: &[f64], invert: bool) -> Vec<f64> {
    let m = numtaps - 1;
    let alpha = m as f64 / 2.0;
    let mut taps = vec![0.0; numtaps];

    for (i, tap) in taps.iter_mut().enumerate() {
        let n = i as f64 - alpha;
        let ideal = match cuts {
            [c] => sinc(*c * n),
            [lo, hi] => hi * sinc(*hi * n) - lo * sinc(*lo * n),
            _ => unreachable!("firwin supports 1 or 2 cutoffs"),
        };
        let window = 0.54 - 0.46 * (2.0 * std::f64::consts::PI * i as f64 / m as f64).cos();
        *tap = ideal * window;
    }

    if invert {
        for (i, tap) in taps.iter_mut().enumerate() {
            let n = i as f64 - alpha;
            *tap = -*tap;
            if n == 0.0 {
                *tap += 1.0;
            }
        }
    }

    let sum: f64 = taps.iter().sum();
    if sum.abs() > 1e-12 && !invert {
        for tap in &mut taps {
            *tap /= sum;
        }
    }
    taps
}

fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        (std::f64::consts::PI * x).sin() / (std::f64::consts::PI * x)
    }
}

/// Zero-phase FIR application: convolve forward, reverse, convolve again,
/// reverse back, with reflect padding at both edges to absorb transients.
pub fn filtfilt_fir(signal: &[f64], taps: &[f64]) -> Vec<f64> {
    let pad = (taps.len() * 3).min(signal.len().saturating_sub(1)).max(1);
    let padded = reflect_pad(signal, pad);
    let forward = convolve_same(&padded, taps);
    let reversed: Vec<f64> = forward.iter().rev().cloned().collect();
    let backward = convolve_same(&reversed, taps);
    let result: Vec<f64> = backward.iter().rev().cloned().collect();
    result[pad..pad + signal.len()].to_vec()
}

fn reflect_pad(signal: &[f64], pad: usize) -> Vec<f64> {
    let n = signal.len();
    let mut out = Vec::with_capacity(n + 2 * pad);
    for i in (1..=pad).rev() {
        out.push(signal[i.min(n - 1)]);
    }
    out.extend_from_slice(signal);
    for i in 0..pad {
        out.push(signal[n.saturating_sub(2 + i).max(0)]);
    }
    out
}

fn convolve_same(signal: &[f64], taps: &[f64]) -> Vec<f64> {
    let n = signal.len();
    let k = taps.len();
    let offset = k / 2;
    let mut out = vec![0.0; n];
    for i in 0..n {
        let mut acc = 0.0;
        for (j, &tap) in taps.iter().enumerate() {
            let idx = i as isize + offset as isize - j as isize;
            if idx >= 0 && (idx as usize) < n {
                acc += tap * signal[idx as usize];
            }
        }
        out[i] = acc;
    }
    out
}

/// 2nd-order IIR notch at `freq` Hz with quality factor `q`, for the
/// realtime path (C6).
pub fn notch_biquad(freq: f64, fs: f64, q: f64) -> DirectForm2Transposed<f64> {
    let coeffs = Coefficients::<f64>::from_params(
        BiquadType::Notch,
        fs.hz(),
        freq.hz(),
        q,
    )
    .expect("valid notch filter parameters");
    DirectForm2Transposed::<f64>::new(coeffs)
}

/// 4th-order Butterworth bandpass built as two cascaded 2nd-order
/// bandpass biquads (forward-backward applied by the caller for
/// zero-phase behaviour).
pub fn butterworth_bandpass_stages(low: f64, high: f64, fs: f64) -> Vec<DirectForm2Transposed<f64>> {
    let center = (low * high).sqrt();
    let bandwidth = high - low;
    let q = (center / bandwidth).max(0.1);
    (0..2)
        .map(|_| {
            let coeffs = Coefficients::<f64>::from_params(
                BiquadType::BandPass,
                fs.hz(),
                center.hz(),
                q.max(Q_BUTTERWORTH_F64 / 2.0),
            )
            .expect("valid bandpass filter parameters");
            DirectForm2Transposed::<f64>::new(coeffs)
        })
        .collect()
}

/// Apply a freshly-built cascade of biquad stages forward then backward,
/// for zero-phase-like behaviour on a finite buffer. `make_stages` is
/// called twice (once per direction) since biquad state is not resettable
/// in place.
pub fn apply_biquad_cascade_zero_phase(
    signal: &[f64],
    make_stages: impl Fn() -> Vec<DirectForm2Transposed<f64>>,
) -> Vec<f64> {
    let mut forward_stages = make_stages();
    let forward: Vec<f64> = signal
        .iter()
        .map(|&x| {
            let mut y = x;
            for stage in forward_stages.iter_mut() {
                y = stage.run(y);
            }
            y
        })
        .collect();
    let mut backward_stages = make_stages();
    let reversed: Vec<f64> = forward.iter().rev().cloned().collect();
    let backward: Vec<f64> = reversed
        .iter()
        .map(|&x| {
            let mut y = x;
            for stage in backward_stages.iter_mut() {
                y = stage.run(y);
            }
            y
        })
        .collect();
    backward.into_iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firwin_bandpass_has_unit_area_taps_count() {
        let taps = firwin_bandpass(101, 1.0, 40.0, 250.0);
        assert_eq!(taps.len(), 101);
    }

    #[test]
    fn filtfilt_preserves_signal_length() {
        let signal: Vec<f64> = (0..500).map(|i| (i as f64 * 0.1).sin()).collect();
        let taps = firwin_bandpass(101, 1.0, 40.0, 250.0);
        let filtered = filtfilt_fir(&signal, &taps);
        assert_eq!(filtered.len(), signal.len());
    }

    #[test]
    fn bandpass_attenuates_out_of_band_tone() {
        let fs = 250.0;
        let n = 2000;
        let in_band: Vec<f64> = (0..n).map(|i| (2.0 * std::f64::consts::PI * 10.0 * i as f64 / fs).sin()).collect();
        let out_of_band: Vec<f64> = (0..n).map(|i| (2.0 * std::f64::consts::PI * 80.0 * i as f64 / fs).sin()).collect();
        let taps = firwin_bandpass(201, 1.0, 40.0, fs);
        let filtered_in = filtfilt_fir(&in_band, &taps);
        let filtered_out = filtfilt_fir(&out_of_band, &taps);
        let rms = |v: &[f64]| (v.iter().map(|x| x * x).sum::<f64>() / v.len() as f64).sqrt();
        assert!(rms(&filtered_in) > rms(&filtered_out) * 2.0);
    }
}
