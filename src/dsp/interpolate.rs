//! Bad-channel interpolation (§4.3 stage 5): average of nearest montage
//! neighbours, or exclusion if no montage is available.

use crate::signal::Montage;

pub enum InterpolationOutcome {
    Interpolated,
    Excluded,
}

/// Replace each bad channel's data with the mean of its nearest montage
/// neighbours that are themselves not bad. Channels with no montage entry
/// (or no montage at all) are left untouched and reported as excluded so
/// callers can drop them from feature computation.
pub fn interpolate_bad_channels(
    labels: &[String],
    data: &mut [Vec<f64>],
    bad_channels: &[String],
    montage: Option<&Montage>,
) -> Vec<(String, InterpolationOutcome)> {
    let mut outcomes = Vec::new();
    let Some(montage) = montage else {
        for bad in bad_channels {
            outcomes.push((bad.clone(), InterpolationOutcome::Excluded));
        }
        return outcomes;
    };

    let index_of = |label: &str| labels.iter().position(|l| l == label);
    let good_set: std::collections::HashSet<&String> = labels
        .iter()
        .filter(|l| !bad_channels.contains(l))
        .collect();

    for bad in bad_channels {
        let neighbours: Vec<String> = montage
            .neighbours(bad, 4)
            .into_iter()
            .filter(|n| good_set.contains(n))
            .collect();

        if neighbours.is_empty() {
            outcomes.push((bad.clone(), InterpolationOutcome::Excluded));
            continue;
        }

        let Some(bad_idx) = index_of(bad) else {
            continue;
        };
        let n_samples = data[bad_idx].len();
        let mut averaged = vec![0.0; n_samples];
        for neighbour in &neighbours {
            if let Some(idx) = index_of(neighbour) {
                for (s, value) in averaged.iter_mut().zip(data[idx].iter()) {
                    *s += value / neighbours.len() as f64;
                }
            }
        }
        data[bad_idx] = averaged;
        outcomes.push((bad.clone(), InterpolationOutcome::Interpolated));
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn without_montage_all_bad_channels_are_excluded() {
        let labels = vec!["Fz".to_string(), "Pz".to_string()];
        let mut data = vec![vec![0.0; 10], vec![1.0; 10]];
        let outcomes = interpolate_bad_channels(&labels, &mut data, &["Fz".to_string()], None);
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0].1, InterpolationOutcome::Excluded));
    }

    #[test]
    fn with_montage_bad_channel_is_replaced_by_neighbour_average() {
        let labels = vec!["Fz".to_string(), "Cz".to_string(), "Pz".to_string()];
        let mut data = vec![vec![0.0; 4], vec![2.0; 4], vec![4.0; 4]];
        let mut positions = HashMap::new();
        positions.insert("Fz".to_string(), (0.0, 1.0, 0.0));
        positions.insert("Cz".to_string(), (0.0, 0.0, 1.0));
        positions.insert("Pz".to_string(), (0.0, -1.0, 0.0));
        let montage = Montage { positions };

        let outcomes = interpolate_bad_channels(&labels, &mut data, &["Fz".to_string()], Some(&montage));
        assert!(matches!(outcomes[0].1, InterpolationOutcome::Interpolated));
        assert!(data[0][0] > 0.0);
    }
}
