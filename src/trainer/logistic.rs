//! Binary/one-vs-rest logistic regression, fit by `linfa_logistic` with
//! L2 regularization `C=1` (i.e. `alpha = 1/C = 1`) and `max_iter=1000`,
//! matching the hyperparameters named for the logistic family. Only the
//! fitted coefficients and intercept are kept on [`LogisticRegression`] -
//! `predict` re-applies them with a plain sigmoid, the same way the
//! realtime inference path has no `linfa` dependency of its own.

use crate::error::{PipelineError, Result};
use linfa::dataset::Dataset;
use linfa::traits::Fit;
use linfa_logistic::LogisticRegression as LinfaLogisticRegression;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogisticRegression {
    /// One weight vector (coefficients, then bias as the last element)
    /// per class, for one-vs-rest. A binary problem has exactly one.
    pub weights: Vec<Vec<f64>>,
    pub classes: Vec<i64>,
}

pub struct LogisticHyperparameters {
    pub c: f64,
    pub max_iter: usize,
}

impl Default for LogisticHyperparameters {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
        }
    }
}

impl LogisticRegression {
    pub fn fit(rows: &[Vec<f64>], labels: &[i64], params: &LogisticHyperparameters) -> Result<Self> {
        let mut classes: Vec<i64> = labels.iter().cloned().collect::<std::collections::BTreeSet<_>>().into_iter().collect();
        classes.sort_unstable();

        let n_samples = rows.len();
        let n_features = rows.first().map_or(0, |r| r.len());
        let records = Array2::from_shape_fn((n_samples, n_features), |(i, j)| rows[i][j]);

        let fit_one_vs_rest = |positive_class: i64| -> Result<Vec<f64>> {
            let targets: Array1<bool> = labels.iter().map(|&y| y == positive_class).collect();
            let dataset = Dataset::new(records.clone(), targets);
            let fitted = LinfaLogisticRegression::default()
                .alpha(1.0 / params.c)
                .max_iterations(params.max_iter as u64)
                .fit(&dataset)
                .map_err(|e| PipelineError::Model(format!("logistic regression fit failed: {e}")))?;
            let mut w = fitted.params().to_vec();
            w.push(fitted.intercept());
            Ok(w)
        };

        let weights = if classes.len() <= 2 {
            let positive = classes.last().copied().unwrap_or(1);
            vec![fit_one_vs_rest(positive)?]
        } else {
            classes.iter().map(|&c| fit_one_vs_rest(c)).collect::<Result<Vec<_>>>()?
        };

        Ok(Self { weights, classes })
    }

    /// Returns `(predicted_class, positive_class_probability, all_probabilities)`.
    pub fn predict(&self, row: &[f64]) -> (i64, f64, Vec<f64>) {
        if self.weights.len() == 1 {
            let p = sigmoid(dot_with_bias(&self.weights[0], row));
            let predicted = if p >= 0.5 { self.classes[self.classes.len() - 1] } else { self.classes[0] };
            return (predicted, p, vec![1.0 - p, p]);
        }

        let scores: Vec<f64> = self.weights.iter().map(|w| sigmoid(dot_with_bias(w, row))).collect();
        let sum: f64 = scores.iter().sum::<f64>().max(1e-12);
        let probabilities: Vec<f64> = scores.iter().map(|s| s / sum).collect();
        let (best_idx, _) = probabilities
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |acc, (i, &p)| if p > acc.1 { (i, p) } else { acc });
        (self.classes[best_idx], probabilities[best_idx], probabilities)
    }
}

fn dot_with_bias(weights: &[f64], row: &[f64]) -> f64 {
    let bias = weights[row.len()];
    row.iter().zip(weights.iter()).map(|(&x, &w)| x * w).sum::<f64>() + bias
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separates_linearly_separable_classes() {
        let rows = vec![
            vec![0.0, 0.0], vec![0.1, 0.1], vec![0.2, -0.1],
            vec![5.0, 5.0], vec![5.1, 4.9], vec![4.9, 5.2],
        ];
        let labels = vec![0, 0, 0, 1, 1, 1];
        let model = LogisticRegression::fit(&rows, &labels, &LogisticHyperparameters::default()).unwrap();
        let (pred_low, ..) = model.predict(&[0.05, 0.0]);
        let (pred_high, ..) = model.predict(&[5.0, 5.0]);
        assert_eq!(pred_low, 0);
        assert_eq!(pred_high, 1);
    }
}
