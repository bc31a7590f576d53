//! Accuracy / precision / recall / F1 (weighted) / ROC-AUC, matching the
//! metrics taxonomy named in §4.7.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metrics {
    pub accuracy: f64,
    pub precision_weighted: f64,
    pub recall_weighted: f64,
    pub f1_weighted: f64,
    pub roc_auc: f64,
}

/// `probabilities[i]` is the model's per-class probability vector for
/// sample `i`, in the same class order as `classes`.
pub fn compute_metrics(
    y_true: &[i64],
    y_pred: &[i64],
    probabilities: &[Vec<f64>],
    classes: &[i64],
) -> Metrics {
    let accuracy = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(a, b)| a == b)
        .count() as f64
        / y_true.len().max(1) as f64;

    let mut precision_sum = 0.0;
    let mut recall_sum = 0.0;
    let mut f1_sum = 0.0;
    let mut weight_total = 0.0;

    for &class in classes {
        let tp = y_true.iter().zip(y_pred.iter()).filter(|(&t, &p)| t == class && p == class).count() as f64;
        let fp = y_true.iter().zip(y_pred.iter()).filter(|(&t, &p)| t != class && p == class).count() as f64;
        let fn_ = y_true.iter().zip(y_pred.iter()).filter(|(&t, &p)| t == class && p != class).count() as f64;
        let support = y_true.iter().filter(|&&t| t == class).count() as f64;

        let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        let recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
        let f1 = if precision + recall > 0.0 { 2.0 * precision * recall / (precision + recall) } else { 0.0 };

        precision_sum += precision * support;
        recall_sum += recall * support;
        f1_sum += f1 * support;
        weight_total += support;
    }

    let weight_total = weight_total.max(1.0);
    let roc_auc = roc_auc_score(y_true, probabilities, classes);

    Metrics {
        accuracy,
        precision_weighted: precision_sum / weight_total,
        recall_weighted: recall_sum / weight_total,
        f1_weighted: f1_sum / weight_total,
        roc_auc,
    }
}

/// Binary: positive-class probability AUC. Multiclass: macro-averaged
/// one-vs-rest AUC, per §4.7.
pub fn roc_auc_score(y_true: &[i64], probabilities: &[Vec<f64>], classes: &[i64]) -> f64 {
    if classes.len() <= 2 {
        let positive = *classes.last().unwrap_or(&1);
        let scores: Vec<f64> = probabilities
            .iter()
            .map(|p| p.last().copied().unwrap_or(0.0))
            .collect();
        let labels: Vec<bool> = y_true.iter().map(|&y| y == positive).collect();
        return binary_auc(&labels, &scores);
    }

    let aucs: Vec<f64> = classes
        .iter()
        .enumerate()
        .map(|(idx, &class)| {
            let labels: Vec<bool> = y_true.iter().map(|&y| y == class).collect();
            let scores: Vec<f64> = probabilities.iter().map(|p| p.get(idx).copied().unwrap_or(0.0)).collect();
            binary_auc(&labels, &scores)
        })
        .collect();
    aucs.iter().sum::<f64>() / aucs.len().max(1) as f64
}

fn binary_auc(labels: &[bool], scores: &[f64]) -> f64 {
    let n_pos = labels.iter().filter(|&&l| l).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut ranked: Vec<(f64, bool)> = scores.iter().cloned().zip(labels.iter().cloned()).collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < ranked.len() {
        let mut j = i;
        while j + 1 < ranked.len() && ranked[j + 1].0 == ranked[i].0 {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            if ranked[k].1 {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    (rank_sum_pos - n_pos as f64 * (n_pos as f64 + 1.0) / 2.0) / (n_pos as f64 * n_neg as f64)
}

/// Points on the ROC curve, for the visualization artifact (§4.11).
pub fn roc_curve_points(labels_binary: &[bool], scores: &[f64]) -> Vec<(f64, f64)> {
    let n_pos = labels_binary.iter().filter(|&&l| l).count().max(1) as f64;
    let n_neg = (labels_binary.len() - labels_binary.iter().filter(|&&l| l).count()).max(1) as f64;

    let mut ranked: Vec<(f64, bool)> = scores.iter().cloned().zip(labels_binary.iter().cloned()).collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut points = vec![(0.0, 0.0)];
    let mut tp = 0.0;
    let mut fp = 0.0;
    for (_, is_positive) in ranked {
        if is_positive {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        points.push((fp / n_neg, tp / n_pos));
    }
    points
}

/// `(true_class, predicted_class)` counts, for the confusion-matrix
/// visualization artifact.
pub fn confusion_matrix(y_true: &[i64], y_pred: &[i64], classes: &[i64]) -> Vec<Vec<usize>> {
    let index_of = |c: i64| classes.iter().position(|&x| x == c).unwrap_or(0);
    let mut matrix = vec![vec![0usize; classes.len()]; classes.len()];
    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        matrix[index_of(t)][index_of(p)] += 1;
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_classifier_has_auc_one() {
        let labels = vec![false, false, true, true];
        let scores = vec![0.1, 0.2, 0.8, 0.9];
        assert!((binary_auc(&labels, &scores) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn random_classifier_has_auc_near_half() {
        let labels = vec![true, false, true, false];
        let scores = vec![0.5, 0.5, 0.5, 0.5];
        let auc = binary_auc(&labels, &scores);
        assert!((auc - 0.5).abs() < 1e-9);
    }

    #[test]
    fn confusion_matrix_diagonal_counts_correct_predictions() {
        let matrix = confusion_matrix(&[0, 0, 1, 1], &[0, 0, 1, 0], &[0, 1]);
        assert_eq!(matrix[0][0], 2);
        assert_eq!(matrix[1][1], 1);
        assert_eq!(matrix[1][0], 1);
    }
}
