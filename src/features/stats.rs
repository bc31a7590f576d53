//! Time-domain stats, Hjorth parameters, and sample entropy (§4.4).

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeDomainStats {
    pub mean: f64,
    pub std: f64,
    pub skewness: f64,
    pub excess_kurtosis: f64,
    pub rms: f64,
    pub peak_to_peak: f64,
    pub zero_crossings: f64,
}

pub fn time_domain_stats(x: &[f64]) -> TimeDomainStats {
    let n = x.len().max(1) as f64;
    let mean = x.iter().sum::<f64>() / n;
    let var = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    let skewness = if std > 1e-12 {
        x.iter().map(|v| ((v - mean) / std).powi(3)).sum::<f64>() / n
    } else {
        0.0
    };
    let excess_kurtosis = if std > 1e-12 {
        x.iter().map(|v| ((v - mean) / std).powi(4)).sum::<f64>() / n - 3.0
    } else {
        0.0
    };
    let rms = (x.iter().map(|v| v * v).sum::<f64>() / n).sqrt();
    let peak_to_peak = x.iter().cloned().fold(f64::MIN, f64::max) - x.iter().cloned().fold(f64::MAX, f64::min);
    let zero_crossings = x
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count() as f64;

    TimeDomainStats {
        mean,
        std,
        skewness,
        excess_kurtosis,
        rms,
        peak_to_peak,
        zero_crossings,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HjorthParameters {
    pub activity: f64,
    pub mobility: f64,
    pub complexity: f64,
}

const EPS: f64 = 1e-10;

pub fn hjorth_parameters(x: &[f64]) -> HjorthParameters {
    let activity = variance(x);
    let dx = diff(x);
    let ddx = diff(&dx);

    let mobility = (variance(&dx) / (activity + EPS)).sqrt();
    let mobility_dx = (variance(&ddx) / (variance(&dx) + EPS)).sqrt();
    let complexity = mobility_dx / (mobility + EPS);

    HjorthParameters {
        activity,
        mobility,
        complexity,
    }
}

fn variance(x: &[f64]) -> f64 {
    let n = x.len().max(1) as f64;
    let mean = x.iter().sum::<f64>() / n;
    x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

fn diff(x: &[f64]) -> Vec<f64> {
    x.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Sample entropy with embedding `m` and tolerance `r` (absolute, already
/// scaled by the caller as `r_factor * std(x)`).
pub fn sample_entropy(x: &[f64], m: usize, r: f64) -> f64 {
    let n = x.len();
    if n <= m + 1 {
        return 0.0;
    }
    let count_matches = |template_len: usize| -> u64 {
        let mut count = 0u64;
        for i in 0..=(n - template_len - 1) {
            for j in (i + 1)..=(n - template_len - 1) {
                if is_match(x, i, j, template_len, r) {
                    count += 1;
                }
            }
        }
        count
    };

    let b = count_matches(m);
    let a = count_matches(m + 1);

    if b == 0 || a == 0 {
        0.0
    } else {
        -((a as f64) / (b as f64)).ln()
    }
}

fn is_match(x: &[f64], i: usize, j: usize, len: usize, r: f64) -> bool {
    (0..len).all(|k| (x[i + k] - x[j + k]).abs() <= r)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_wave_has_low_entropy() {
        let n = 500;
        let signal: Vec<f64> = (0..n).map(|i| (i as f64 * 0.1).sin()).collect();
        let std: f64 = {
            let mean = signal.iter().sum::<f64>() / signal.len() as f64;
            (signal.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / signal.len() as f64).sqrt()
        };
        let entropy = sample_entropy(&signal, 2, 0.2 * std);
        assert!(entropy < 1.0);
    }

    #[test]
    fn empty_match_count_yields_zero() {
        let signal = vec![0.0, 1.0, 2.0];
        assert_eq!(sample_entropy(&signal, 2, 1e-12), 0.0);
    }

    #[test]
    fn hjorth_parameters_are_finite_on_constant_signal() {
        let signal = vec![1.0; 100];
        let params = hjorth_parameters(&signal);
        assert!(params.activity.is_finite());
        assert!(params.mobility.is_finite());
        assert!(params.complexity.is_finite());
    }
}
