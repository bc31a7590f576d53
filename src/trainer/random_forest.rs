//! Random forest: a bagging ensemble of `linfa_trees::DecisionTree`s,
//! each fit by `linfa` on its own bootstrap resample, with prediction by
//! majority vote and an importance score from permutation importance.
//!
//! `linfa_trees` fits each tree on the full feature set per split rather
//! than a random per-split candidate subset, so `max_features` is kept on
//! [`RandomForestHyperparameters`] for config/API compatibility but isn't
//! applied - this ensemble is closer to bootstrap aggregating over
//! full-feature trees than to a per-split-randomized random forest.
//! TODO: apply `max_features` once `linfa_trees` exposes a feature mask
//! at fit time, or wrap its split search to restrict candidate features.

use crate::error::{PipelineError, Result};
use linfa::dataset::Dataset;
use linfa::traits::{Fit, Predict};
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RandomForestHyperparameters {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub max_features: MaxFeatures,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum MaxFeatures {
    Sqrt,
    Fraction(f64),
}

impl Default for RandomForestHyperparameters {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: None,
            max_features: MaxFeatures::Sqrt,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree<f64, usize>>,
    pub classes: Vec<i64>,
    feature_importance_raw: Vec<f64>,
}

impl RandomForest {
    pub fn fit(rows: &[Vec<f64>], labels: &[i64], params: &RandomForestHyperparameters) -> Result<Self> {
        let mut classes: Vec<i64> = labels.iter().cloned().collect::<std::collections::BTreeSet<_>>().into_iter().collect();
        classes.sort_unstable();
        let class_index: BTreeMap<i64, usize> = classes.iter().enumerate().map(|(i, &c)| (c, i)).collect();

        let n_features = rows.first().map_or(0, |r| r.len());
        let mut rng = StdRng::seed_from_u64(params.seed);

        let mut trees = Vec::with_capacity(params.n_estimators);
        for _ in 0..params.n_estimators {
            let (bag_rows, bag_labels) = bootstrap_sample(rows, labels, &mut rng);
            let records = Array2::from_shape_fn((bag_rows.len(), n_features), |(i, j)| bag_rows[i][j]);
            let targets: ndarray::Array1<usize> = bag_labels.iter().map(|l| class_index[l]).collect();
            let dataset = Dataset::new(records, targets);
            let tree = DecisionTree::params()
                .split_quality(SplitQuality::Gini)
                .max_depth(params.max_depth)
                .fit(&dataset)
                .map_err(|e| PipelineError::Model(format!("decision tree fit failed: {e}")))?;
            trees.push(tree);
        }

        let feature_importance_raw = permutation_importance(&trees, rows, labels, &classes, params.seed);

        Ok(Self {
            trees,
            classes,
            feature_importance_raw,
        })
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importance_raw
    }

    pub fn predict(&self, row: &[f64]) -> (i64, f64, Vec<f64>) {
        predict_with_trees(&self.trees, &self.classes, row)
    }
}

fn bootstrap_sample(rows: &[Vec<f64>], labels: &[i64], rng: &mut StdRng) -> (Vec<Vec<f64>>, Vec<i64>) {
    let n = rows.len();
    let mut bag_rows = Vec::with_capacity(n);
    let mut bag_labels = Vec::with_capacity(n);
    for _ in 0..n {
        let idx = rng.gen_range(0..n);
        bag_rows.push(rows[idx].clone());
        bag_labels.push(labels[idx]);
    }
    (bag_rows, bag_labels)
}

fn predict_with_trees(trees: &[DecisionTree<f64, usize>], classes: &[i64], row: &[f64]) -> (i64, f64, Vec<f64>) {
    let records = Array2::from_shape_vec((1, row.len()), row.to_vec()).expect("row length matches the fitted feature count");
    let mut votes: BTreeMap<usize, usize> = BTreeMap::new();
    for tree in trees {
        let predicted: ndarray::Array1<usize> = tree.predict(&records);
        *votes.entry(predicted[0]).or_insert(0) += 1;
    }
    let total = trees.len().max(1) as f64;
    let probabilities: Vec<f64> = (0..classes.len())
        .map(|idx| *votes.get(&idx).unwrap_or(&0) as f64 / total)
        .collect();
    let (best_idx, _) = probabilities
        .iter()
        .enumerate()
        .fold((0, f64::MIN), |acc, (i, &p)| if p > acc.1 { (i, p) } else { acc });
    (classes[best_idx], probabilities[best_idx], probabilities)
}

/// Feature importance by permutation: the accuracy drop from shuffling
/// one feature column at a time across the already-fitted ensemble, the
/// way `sklearn.inspection.permutation_importance` scores a fitted model
/// rather than reading splits out of the trees themselves.
fn permutation_importance(
    trees: &[DecisionTree<f64, usize>],
    rows: &[Vec<f64>],
    labels: &[i64],
    classes: &[i64],
    seed: u64,
) -> Vec<f64> {
    let n_features = rows.first().map_or(0, |r| r.len());
    if rows.is_empty() || n_features == 0 || trees.is_empty() {
        return vec![0.0; n_features];
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let baseline = forest_accuracy(trees, rows, labels, classes);

    let mut importance = vec![0.0; n_features];
    for feature in 0..n_features {
        let mut permuted_rows = rows.to_vec();
        let mut column: Vec<f64> = permuted_rows.iter().map(|r| r[feature]).collect();
        column.shuffle(&mut rng);
        for (row, &value) in permuted_rows.iter_mut().zip(column.iter()) {
            row[feature] = value;
        }
        let permuted_accuracy = forest_accuracy(trees, &permuted_rows, labels, classes);
        importance[feature] = (baseline - permuted_accuracy).max(0.0);
    }

    let total: f64 = importance.iter().sum::<f64>().max(1e-12);
    for v in &mut importance {
        *v /= total;
    }
    importance
}

fn forest_accuracy(trees: &[DecisionTree<f64, usize>], rows: &[Vec<f64>], labels: &[i64], classes: &[i64]) -> f64 {
    let n = rows.len().max(1) as f64;
    let correct = rows
        .iter()
        .zip(labels.iter())
        .filter(|(row, &label)| predict_with_trees(trees, classes, row).0 == label)
        .count();
    correct as f64 / n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separates_two_well_clustered_classes() {
        let rows = vec![
            vec![0.0, 0.0], vec![0.2, 0.1], vec![0.1, -0.1], vec![-0.1, 0.2],
            vec![5.0, 5.0], vec![5.2, 4.8], vec![4.9, 5.1], vec![5.1, 4.9],
        ];
        let labels = vec![0, 0, 0, 0, 1, 1, 1, 1];
        let params = RandomForestHyperparameters { n_estimators: 20, ..Default::default() };
        let forest = RandomForest::fit(&rows, &labels, &params).unwrap();
        let (pred_low, ..) = forest.predict(&[0.0, 0.05]);
        let (pred_high, ..) = forest.predict(&[5.0, 5.0]);
        assert_eq!(pred_low, 0);
        assert_eq!(pred_high, 1);
    }

    #[test]
    fn feature_importances_sum_to_one() {
        let rows = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.0, 0.0], vec![1.0, 1.0]];
        let labels = vec![0, 1, 0, 1];
        let params = RandomForestHyperparameters { n_estimators: 5, ..Default::default() };
        let forest = RandomForest::fit(&rows, &labels, &params).unwrap();
        let sum: f64 = forest.feature_importances().iter().sum();
        assert!((sum - 1.0).abs() < 1e-6 || sum == 0.0);
    }
}
