//! Channel-name normalization and the scalp-electrode montage.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Case-insensitive mapping from canonical 10-20 channel name (as folded by
/// [`normalize_channel_name`]) to scalp position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Montage {
    pub positions: HashMap<String, (f64, f64, f64)>,
}

impl Montage {
    pub fn neighbours(&self, channel: &str, k: usize) -> Vec<String> {
        let Some(&origin) = self.positions.get(channel) else {
            return Vec::new();
        };
        let mut distances: Vec<(String, f64)> = self
            .positions
            .iter()
            .filter(|(label, _)| label.as_str() != channel)
            .map(|(label, &pos)| (label.clone(), euclidean(origin, pos)))
            .collect();
        distances.sort_by(|a, b| a.1.total_cmp(&b.1));
        distances.into_iter().take(k).map(|(label, _)| label).collect()
    }
}

fn euclidean(a: (f64, f64, f64), b: (f64, f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2) + (a.2 - b.2).powi(2)).sqrt()
}

/// Canonical 10-20 channel labels, keyed by their case/separator-folded
/// form. Folding strips `-`, ` `, `_` and uppercases before lookup.
fn canonical_10_20() -> &'static [(&'static str, &'static str)] {
    &[
        ("FP1", "Fp1"), ("FP2", "Fp2"), ("FPZ", "Fpz"),
        ("F7", "F7"), ("F3", "F3"), ("FZ", "Fz"), ("F4", "F4"), ("F8", "F8"),
        ("T7", "T7"), ("T3", "T7"), ("C3", "C3"), ("CZ", "Cz"), ("C4", "C4"),
        ("T8", "T8"), ("T4", "T8"),
        ("P7", "P7"), ("T5", "P7"), ("P3", "P3"), ("PZ", "Pz"), ("P4", "P4"),
        ("P8", "P8"), ("T6", "P8"),
        ("O1", "O1"), ("OZ", "Oz"), ("O2", "O2"),
        ("A1", "A1"), ("A2", "A2"),
    ]
}

fn fold(name: &str) -> String {
    name.to_uppercase()
        .chars()
        .filter(|c| !matches!(c, '-' | ' ' | '_'))
        .collect()
}

/// Fold case/separators and map to the canonical 10-20 label; names with
/// no canonical match are returned unchanged (sans folding applied only
/// for lookup, not for the returned value).
pub fn normalize_channel_name(name: &str) -> String {
    let folded = fold(name);
    canonical_10_20()
        .iter()
        .find(|(key, _)| *key == folded)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_case_and_separators_before_mapping() {
        assert_eq!(normalize_channel_name("fp1"), "Fp1");
        assert_eq!(normalize_channel_name("FP-1"), "Fp1");
        assert_eq!(normalize_channel_name("fp_1"), "Fp1");
        assert_eq!(normalize_channel_name("Fp 1"), "Fp1");
    }

    #[test]
    fn unmapped_names_are_left_unchanged() {
        assert_eq!(normalize_channel_name("EOG-left"), "EOG-left");
    }

    #[test]
    fn neighbours_ranks_by_distance() {
        let mut positions = HashMap::new();
        positions.insert("Fz".to_string(), (0.0, 1.0, 0.0));
        positions.insert("Cz".to_string(), (0.0, 0.0, 1.0));
        positions.insert("Pz".to_string(), (0.0, -1.0, 0.0));
        let montage = Montage { positions };
        let nearest = montage.neighbours("Cz", 1);
        assert_eq!(nearest.len(), 1);
    }
}
