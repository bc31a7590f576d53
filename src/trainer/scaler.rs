//! StandardScaler: zero mean, unit variance per feature.
//!
//! Kept as closed-form arithmetic rather than delegated to a fitted ML
//! estimator: it has no iterative optimizer or decision boundary to get
//! wrong, unlike the PCA/logistic/random-forest steps next to it in this
//! pipeline.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let n_features = rows.first().map_or(0, |r| r.len());
        let n = rows.len().max(1) as f64;

        let mut mean = vec![0.0; n_features];
        for row in rows {
            for (i, &v) in row.iter().enumerate() {
                mean[i] += v / n;
            }
        }

        let mut variance = vec![0.0; n_features];
        for row in rows {
            for (i, &v) in row.iter().enumerate() {
                variance[i] += (v - mean[i]).powi(2) / n;
            }
        }
        let scale = variance.iter().map(|v| v.sqrt().max(1e-12)).collect();

        Self { mean, scale }
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .enumerate()
            .map(|(i, &v)| (v - self.mean[i]) / self.scale[i])
            .collect()
    }

    pub fn transform_all(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fitted_scaler_produces_zero_mean_unit_variance() {
        let rows = vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]];
        let scaler = StandardScaler::fit(&rows);
        let transformed = scaler.transform_all(&rows);
        let mean0: f64 = transformed.iter().map(|r| r[0]).sum::<f64>() / 3.0;
        assert!(mean0.abs() < 1e-9);
    }
}
