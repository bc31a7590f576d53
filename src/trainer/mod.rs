//! Trainer (C7): scaler + (PCA?) + classifier pipeline with CV and
//! holdout evaluation.

mod logistic;
mod metrics;
mod pca;
mod random_forest;
mod scaler;
mod visualize;

pub use logistic::{LogisticHyperparameters, LogisticRegression};
pub use metrics::Metrics;
pub use pca::Pca;
pub use random_forest::{MaxFeatures, RandomForest, RandomForestHyperparameters};
pub use scaler::StandardScaler;
pub use visualize::{confusion_matrix_png, feature_importance_png, roc_curve_png};

use crate::error::{PipelineError, Result};
use crate::features::FeatureTable;
use crate::model::ModelFamily;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Classifier {
    Logistic(LogisticRegression),
    RandomForest(RandomForest),
}

impl Classifier {
    pub fn predict(&self, row: &[f64]) -> (i64, f64, Vec<f64>) {
        match self {
            Classifier::Logistic(model) => model.predict(row),
            Classifier::RandomForest(model) => model.predict(row),
        }
    }
}

/// The fitted pipeline, persisted to `models/{id}/model.bin` via
/// `bincode` - a portable pickle-equivalent readable by the realtime
/// inference path (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub scaler: StandardScaler,
    pub pca: Option<Pca>,
    pub classifier: Classifier,
    pub feature_names: Vec<String>,
}

impl ModelArtifact {
    pub fn predict(&self, feature_vector: &[f64]) -> (i64, f64, Vec<f64>) {
        let scaled = self.scaler.transform(feature_vector);
        let reduced = match &self.pca {
            Some(pca) => pca.transform(&scaled),
            None => scaled,
        };
        self.classifier.predict(&reduced)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| PipelineError::Model(format!("failed to serialize model: {e}")))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| PipelineError::Model(format!("failed to deserialize model: {e}")))
    }
}

/// A model loaded for inference: metadata plus its fitted artifact.
pub struct LoadedModel {
    pub feature_names: Vec<String>,
    pub artifact: ModelArtifact,
}

/// Reconstructs a [`LoadedModel`] from a persisted `ml_models` row plus the
/// bincode-serialized artifact fetched from `artifact_path`.
pub fn load_model(model: &crate::model::MLModel, artifact_bytes: &[u8]) -> Result<LoadedModel> {
    Ok(LoadedModel {
        feature_names: model.feature_names.clone(),
        artifact: ModelArtifact::from_bytes(artifact_bytes)?,
    })
}

pub fn predict_with_model(model: &LoadedModel, vector: &[f64]) -> Result<(i64, f64, Vec<f64>)> {
    if vector.len() != model.feature_names.len() {
        return Err(PipelineError::Model(format!(
            "feature vector length {} does not match model's {} feature names",
            vector.len(),
            model.feature_names.len()
        )));
    }
    Ok(model.artifact.predict(vector))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvFoldResult {
    pub fold: usize,
    pub accuracy: f64,
    pub f1_weighted: f64,
    pub roc_auc: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingOutput {
    pub artifact: ModelArtifact,
    pub holdout_metrics: Metrics,
    pub cv_fold_results: Vec<CvFoldResult>,
    pub confusion_matrix: Vec<Vec<usize>>,
    pub roc_curve_points: Vec<(f64, f64)>,
    pub feature_importances: Option<Vec<f64>>,
    pub classes: Vec<i64>,
}

pub struct TrainingInput<'a> {
    pub recording_tables: &'a [(Uuid, FeatureTable)],
    pub labels: &'a HashMap<Uuid, i64>,
    pub family: ModelFamily,
    pub cv_folds: usize,
    pub test_split: f64,
    pub seed: u64,
}

/// Runs §4.7 steps 1-6: assemble rows, split, cross-validate, refit,
/// evaluate. Step 7 (persistence/plots) and step 8 (promotion gating)
/// are the caller's concern - see [`ModelArtifact::to_bytes`] and
/// `crate::orchestrator`.
pub fn train(input: TrainingInput) -> Result<TrainingOutput> {
    let mut rows = Vec::new();
    let mut labels = Vec::new();
    let mut feature_names = Vec::new();
    let mut contributing = 0;

    for (recording_id, table) in input.recording_tables {
        let Some(&label) = input.labels.get(recording_id) else {
            continue;
        };
        if table.rows.is_empty() {
            continue;
        }
        if feature_names.is_empty() {
            feature_names = table.column_names.clone();
        }
        for row in &table.rows {
            rows.push(row.values.clone());
            labels.push(label);
        }
        contributing += 1;
    }

    if contributing < 2 {
        return Err(PipelineError::Data(format!(
            "training requires at least two contributing recordings, got {contributing}"
        )));
    }

    let (train_rows, train_labels, test_rows, test_labels) =
        stratified_split(&rows, &labels, input.test_split, input.seed);

    let cv_fold_results = cross_validate(&train_rows, &train_labels, &input.family, input.cv_folds, input.seed);

    let scaler = StandardScaler::fit(&train_rows);
    let scaled_train = scaler.transform_all(&train_rows);
    let scaled_test = scaler.transform_all(&test_rows);

    let (pca, reduced_train, reduced_test) = match input.family {
        ModelFamily::Logistic => {
            let pca = Pca::fit(&scaled_train, 20)?;
            let reduced_train = pca.transform_all(&scaled_train);
            let reduced_test = pca.transform_all(&scaled_test);
            (Some(pca), reduced_train, reduced_test)
        }
        ModelFamily::RandomForest => (None, scaled_train, scaled_test),
    };

    let classifier = fit_classifier(&input.family, &reduced_train, &train_labels, input.seed)?;

    let predictions: Vec<(i64, f64, Vec<f64>)> = reduced_test.iter().map(|row| classifier.predict(row)).collect();
    let y_pred: Vec<i64> = predictions.iter().map(|p| p.0).collect();
    let probabilities: Vec<Vec<f64>> = predictions.iter().map(|p| p.2.clone()).collect();
    let classes: Vec<i64> = {
        let mut c: Vec<i64> = train_labels.iter().cloned().collect::<std::collections::BTreeSet<_>>().into_iter().collect();
        c.sort_unstable();
        c
    };

    let holdout_metrics = metrics::compute_metrics(&test_labels, &y_pred, &probabilities, &classes);
    let confusion = metrics::confusion_matrix(&test_labels, &y_pred, &classes);

    let roc_points = if classes.len() <= 2 {
        let positive = *classes.last().unwrap_or(&1);
        let binary_labels: Vec<bool> = test_labels.iter().map(|&y| y == positive).collect();
        let scores: Vec<f64> = probabilities.iter().map(|p| p.last().copied().unwrap_or(0.0)).collect();
        metrics::roc_curve_points(&binary_labels, &scores)
    } else {
        Vec::new()
    };

    let feature_importances = match &classifier {
        Classifier::RandomForest(forest) => Some(forest.feature_importances().to_vec()),
        Classifier::Logistic(_) => None,
    };

    Ok(TrainingOutput {
        artifact: ModelArtifact {
            scaler,
            pca,
            classifier,
            feature_names,
        },
        holdout_metrics,
        cv_fold_results,
        confusion_matrix: confusion,
        roc_curve_points: roc_points,
        feature_importances,
        classes,
    })
}

fn fit_classifier(family: &ModelFamily, rows: &[Vec<f64>], labels: &[i64], seed: u64) -> Result<Classifier> {
    match family {
        ModelFamily::Logistic => Ok(Classifier::Logistic(LogisticRegression::fit(
            rows,
            labels,
            &LogisticHyperparameters::default(),
        )?)),
        ModelFamily::RandomForest => Ok(Classifier::RandomForest(RandomForest::fit(
            rows,
            labels,
            &RandomForestHyperparameters { seed, ..Default::default() },
        )?)),
    }
}

fn stratified_split(
    rows: &[Vec<f64>],
    labels: &[i64],
    test_fraction: f64,
    seed: u64,
) -> (Vec<Vec<f64>>, Vec<i64>, Vec<Vec<f64>>, Vec<i64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut by_class: HashMap<i64, Vec<usize>> = HashMap::new();
    for (i, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(i);
    }

    let mut train_idx = Vec::new();
    let mut test_idx = Vec::new();
    for indices in by_class.values_mut() {
        indices.shuffle(&mut rng);
        let n_test = ((indices.len() as f64) * test_fraction).round() as usize;
        test_idx.extend(&indices[..n_test]);
        train_idx.extend(&indices[n_test..]);
    }

    let gather = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<i64>) {
        (idx.iter().map(|&i| rows[i].clone()).collect(), idx.iter().map(|&i| labels[i]).collect())
    };
    let (train_rows, train_labels) = gather(&train_idx);
    let (test_rows, test_labels) = gather(&test_idx);
    (train_rows, train_labels, test_rows, test_labels)
}

fn cross_validate(
    rows: &[Vec<f64>],
    labels: &[i64],
    family: &ModelFamily,
    k: usize,
    seed: u64,
) -> Vec<CvFoldResult> {
    if rows.len() < k.max(2) {
        return Vec::new();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut by_class: HashMap<i64, Vec<usize>> = HashMap::new();
    for (i, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(i);
    }
    for indices in by_class.values_mut() {
        indices.shuffle(&mut rng);
    }

    let mut folds: Vec<Vec<usize>> = vec![Vec::new(); k];
    for indices in by_class.values() {
        for (i, &idx) in indices.iter().enumerate() {
            folds[i % k].push(idx);
        }
    }

    let mut results = Vec::with_capacity(k);
    for (fold_idx, fold) in folds.iter().enumerate() {
        let test_set: std::collections::HashSet<usize> = fold.iter().cloned().collect();
        let train_rows: Vec<Vec<f64>> = (0..rows.len()).filter(|i| !test_set.contains(i)).map(|i| rows[i].clone()).collect();
        let train_labels: Vec<i64> = (0..rows.len()).filter(|i| !test_set.contains(i)).map(|i| labels[i]).collect();
        let test_rows: Vec<Vec<f64>> = fold.iter().map(|&i| rows[i].clone()).collect();
        let test_labels: Vec<i64> = fold.iter().map(|&i| labels[i]).collect();

        if train_rows.is_empty() || test_rows.is_empty() {
            continue;
        }

        let Ok(classifier) = fit_classifier(family, &train_rows, &train_labels, seed) else {
            continue;
        };
        let predictions: Vec<(i64, f64, Vec<f64>)> = test_rows.iter().map(|r| classifier.predict(r)).collect();
        let y_pred: Vec<i64> = predictions.iter().map(|p| p.0).collect();
        let probabilities: Vec<Vec<f64>> = predictions.iter().map(|p| p.2.clone()).collect();
        let mut classes: Vec<i64> = train_labels.iter().cloned().collect::<std::collections::BTreeSet<_>>().into_iter().collect();
        classes.sort_unstable();

        let m = metrics::compute_metrics(&test_labels, &y_pred, &probabilities, &classes);
        results.push(CvFoldResult {
            fold: fold_idx,
            accuracy: m.accuracy,
            f1_weighted: m.f1_weighted,
            roc_auc: m.roc_auc,
        });
    }
    results
}

/// Promotion gate (§4.7 step 8): both thresholds must be met.
pub fn meets_promotion_thresholds(metrics: &Metrics, roc_auc_threshold: f64, f1_threshold: f64) -> bool {
    metrics.roc_auc >= roc_auc_threshold && metrics.f1_weighted >= f1_threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureRow;
    use std::collections::HashMap;

    fn table_for(label_bias: f64, n_rows: usize) -> FeatureTable {
        let columns = vec!["f0".to_string(), "f1".to_string()];
        let rows = (0..n_rows)
            .map(|i| FeatureRow {
                epoch_id: i as i64,
                channel: "average".to_string(),
                values: vec![label_bias + i as f64 * 0.01, label_bias * 2.0 + i as f64 * 0.01],
            })
            .collect();
        FeatureTable { column_names: columns, rows }
    }

    #[test]
    fn trains_and_separates_two_well_separated_classes() {
        let ids: Vec<Uuid> = (0..10).map(|_| Uuid::new_v4()).collect();
        let mut labels = HashMap::new();
        let mut tables = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            let class = (i % 2) as i64;
            let bias = if class == 0 { 0.0 } else { 10.0 };
            tables.push((*id, table_for(bias, 20)));
            labels.insert(*id, class);
        }

        let output = train(TrainingInput {
            recording_tables: &tables,
            labels: &labels,
            family: ModelFamily::RandomForest,
            cv_folds: 3,
            test_split: 0.2,
            seed: 42,
        })
        .unwrap();

        assert!(output.holdout_metrics.roc_auc > 0.8);
    }

    #[test]
    fn fewer_than_two_recordings_is_a_data_error() {
        let id = Uuid::new_v4();
        let mut labels = HashMap::new();
        labels.insert(id, 0);
        let tables = vec![(id, table_for(0.0, 20))];

        let result = train(TrainingInput {
            recording_tables: &tables,
            labels: &labels,
            family: ModelFamily::Logistic,
            cv_folds: 5,
            test_split: 0.2,
            seed: 42,
        });
        assert!(matches!(result, Err(PipelineError::Data(_))));
    }

    #[test]
    fn promotion_gate_requires_both_thresholds() {
        let passing = Metrics { accuracy: 0.9, precision_weighted: 0.9, recall_weighted: 0.9, f1_weighted: 0.7, roc_auc: 0.8 };
        let failing = Metrics { accuracy: 0.6, precision_weighted: 0.6, recall_weighted: 0.6, f1_weighted: 0.5, roc_auc: 0.6 };
        assert!(meets_promotion_thresholds(&passing, 0.75, 0.65));
        assert!(!meets_promotion_thresholds(&failing, 0.75, 0.65));
    }
}
