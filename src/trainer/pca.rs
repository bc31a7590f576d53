//! PCA, fit by `linfa_reduction`'s eigendecomposition of the covariance
//! matrix rather than a hand-rolled solver. Only the resulting rotation
//! matrix and feature mean are kept on [`Pca`] - the fitted `linfa`
//! estimator itself isn't part of the persisted model artifact, so
//! `transform` stays a plain dot product against those two fields.

use crate::error::{PipelineError, Result};
use linfa::dataset::DatasetBase;
use linfa::traits::Fit;
use linfa_reduction::Pca as LinfaPca;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pca {
    pub components: Vec<Vec<f64>>,
    pub mean: Vec<f64>,
}

impl Pca {
    pub fn fit(rows: &[Vec<f64>], n_components: usize) -> Result<Self> {
        let n_samples = rows.len();
        let n_features = rows.first().map_or(0, |r| r.len());
        let k = n_components.min(n_features).min(n_samples.max(1)).max(1);

        let records = Array2::from_shape_fn((n_samples, n_features), |(i, j)| rows[i][j]);
        let dataset = DatasetBase::from(records);

        let fitted = LinfaPca::params(k)
            .fit(&dataset)
            .map_err(|e| PipelineError::Model(format!("PCA fit failed: {e}")))?;

        let mean = fitted.mean().to_vec();
        let components: Vec<Vec<f64>> = fitted
            .components()
            .axis_iter(Axis(0))
            .map(|row| row.to_vec())
            .collect();

        Ok(Pca { components, mean })
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        self.components
            .iter()
            .map(|component| {
                component
                    .iter()
                    .zip(row.iter())
                    .zip(self.mean.iter())
                    .map(|((&c, &x), &m)| c * (x - m))
                    .sum()
            })
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
    fn reduces_dimensionality_to_requested_components() {
        let rows: Vec<Vec<f64>> = (0..50)
            .map(|i| vec![i as f64, (i * 2) as f64, (i as f64).sin()])
            .collect();
        let pca = Pca::fit(&rows, 2).unwrap();
        let transformed = pca.transform(&rows[0]);
        assert_eq!(transformed.len(), 2);
    }
}
