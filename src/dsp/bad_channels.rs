//! Bad-channel detection (§4.3 stage 4): flat, high-kurtosis, and
//! high-variance-outlier channels.

use crate::config::ArtifactConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct BadChannelReport {
    pub bad_channels: Vec<String>,
    pub needs_review: bool,
}

pub fn detect_bad_channels(
    labels: &[String],
    data: &[Vec<f64>],
    config: &ArtifactConfig,
) -> BadChannelReport {
    let variances: Vec<f64> = data.iter().map(|ch| variance(ch)).collect();
    let var_mean = mean(&variances);
    let var_std = std_dev(&variances, var_mean).max(1e-12);

    let mut bad = std::collections::BTreeSet::new();
    for (i, channel) in data.iter().enumerate() {
        let std = variances[i].sqrt();
        if std < config.flat_threshold {
            bad.insert(labels[i].clone());
        }
        let kurt = excess_kurtosis(channel);
        if kurt.abs() > config.kurtosis_threshold {
            bad.insert(labels[i].clone());
        }
        let z = (variances[i] - var_mean) / var_std;
        if z.abs() > config.high_variance_zscore {
            bad.insert(labels[i].clone());
        }
    }

    let fraction = bad.len() as f64 / labels.len().max(1) as f64;
    BadChannelReport {
        bad_channels: bad.into_iter().collect(),
        needs_review: fraction > config.max_bad_channels_pct,
    }
}

fn mean(v: &[f64]) -> f64 {
    if v.is_empty() {
        0.0
    } else {
        v.iter().sum::<f64>() / v.len() as f64
    }
}

fn variance(v: &[f64]) -> f64 {
    let m = mean(v);
    mean(&v.iter().map(|x| (x - m).powi(2)).collect::<Vec<_>>())
}

fn std_dev(v: &[f64], m: f64) -> f64 {
    mean(&v.iter().map(|x| (x - m).powi(2)).collect::<Vec<_>>()).sqrt()
}

fn excess_kurtosis(v: &[f64]) -> f64 {
    let m = mean(v);
    let var = variance(v).max(1e-12);
    let fourth = mean(&v.iter().map(|x| (x - m).powi(4)).collect::<Vec<_>>());
    fourth / var.powi(2) - 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ArtifactConfig {
        ArtifactConfig::default()
    }

    #[test]
    fn flat_channel_is_flagged() {
        let labels = vec!["Fz".to_string(), "Pz".to_string()];
        let data = vec![
            vec![0.0; 1000],
            (0..1000).map(|i| (i as f64 * 0.1).sin()).collect(),
        ];
        let report = detect_bad_channels(&labels, &data, &cfg());
        assert!(report.bad_channels.contains(&"Fz".to_string()));
        assert!(!report.bad_channels.contains(&"Pz".to_string()));
    }

    #[test]
    fn needs_review_when_bad_fraction_exceeds_threshold() {
        let labels: Vec<String> = (0..4).map(|i| format!("Ch{i}")).collect();
        let data = vec![vec![0.0; 500], vec![0.0; 500], vec![0.0; 500], (0..500).map(|i| (i as f64 * 0.1).sin()).collect()];
        let report = detect_bad_channels(&labels, &data, &cfg());
        assert!(report.needs_review);
    }
}
