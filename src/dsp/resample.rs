//! Anti-alias resampling: zero-phase FIR lowpass at the new Nyquist,
//! followed by polyphase-free linear interpolation onto the new grid.

use super::filters::{filtfilt_fir, firwin_lowpass};

pub fn resample(signal: &[f64], from_fs: f64, to_fs: f64) -> Vec<f64> {
    if (from_fs - to_fs).abs() < 1e-9 {
        return signal.to_vec();
    }
    let cutoff = from_fs.min(to_fs) / 2.0 * 0.9;
    let taps = firwin_lowpass(101, cutoff, from_fs);
    let filtered = filtfilt_fir(signal, &taps);

    let ratio = to_fs / from_fs;
    let out_len = ((filtered.len() as f64) * ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let lo = src_pos.floor() as usize;
        let hi = (lo + 1).min(filtered.len() - 1);
        let frac = src_pos - lo as f64;
        let lo_val = filtered.get(lo).copied().unwrap_or(0.0);
        let hi_val = filtered.get(hi).copied().unwrap_or(lo_val);
        out.push(lo_val + (hi_val - lo_val) * frac);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resampling_scales_length_by_ratio() {
        let signal: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.05).sin()).collect();
        let out = resample(&signal, 500.0, 250.0);
        assert!((out.len() as f64 - 500.0).abs() < 5.0);
    }

    #[test]
    fn same_rate_is_a_no_op() {
        let signal = vec![1.0, 2.0, 3.0];
        assert_eq!(resample(&signal, 250.0, 250.0), signal);
    }
}
