//! Stratified k-fold cross-validation on the training split.

use crate::ml::booster::{BoostParams, GradientBoostedClassifier};
use crate::ml::metrics::accuracy;
use crate::utils::error::{Result, TrainError};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CvSummary {
    pub folds: usize,
    pub scores: Vec<f64>,
    pub mean: f64,
    /// 母體標準差
    pub std: f64,
}

impl CvSummary {
    fn from_scores(scores: Vec<f64>) -> Self {
        let n = scores.len().max(1) as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let var = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        Self {
            folds: scores.len(),
            scores,
            mean,
            std: var.sqrt(),
        }
    }
}

/// Test-fold indices, without shuffling.
///
/// Classes are numbered by first appearance. Per-fold class counts come from
/// dealing the class-sorted labels round-robin over the folds, so fold sizes
/// differ by at most one. Each class then fills its folds with contiguous runs
/// of its members in dataset order.
pub fn stratified_folds(labels: &Array1<f64>, k: usize) -> Vec<Vec<usize>> {
    if k == 0 {
        return Vec::new();
    }

    let mut classes: Vec<f64> = Vec::new();
    let encoded: Vec<usize> = labels
        .iter()
        .map(|&y| match classes.iter().position(|&c| c == y) {
            Some(class) => class,
            None => {
                classes.push(y);
                classes.len() - 1
            }
        })
        .collect();

    let mut sorted = encoded.clone();
    sorted.sort_unstable();

    // allocation[fold][class]
    let allocation: Vec<Vec<usize>> = (0..k)
        .map(|fold| {
            let mut counts = vec![0; classes.len()];
            sorted
                .iter()
                .skip(fold)
                .step_by(k)
                .for_each(|&class| counts[class] += 1);
            counts
        })
        .collect();

    let mut folds = vec![Vec::new(); k];
    for class in 0..classes.len() {
        let mut members = (0..labels.len()).filter(|&i| encoded[i] == class);
        for (fold, test) in folds.iter_mut().enumerate() {
            test.extend(members.by_ref().take(allocation[fold][class]));
        }
    }
    for fold in folds.iter_mut() {
        fold.sort_unstable();
    }
    folds
}

/// Accuracy of a freshly trained booster on each held-out fold. Folds run in parallel.
pub fn cross_val_accuracy(
    params: &BoostParams,
    features: &Array2<f64>,
    labels: &Array1<f64>,
    k: usize,
) -> Result<CvSummary> {
    if k < 2 {
        return Err(TrainError::InvalidConfigValueError {
            field: "cross_validation.folds".to_string(),
            value: k.to_string(),
            reason: "Need at least 2 folds".to_string(),
        });
    }
    if k > labels.len() {
        return Err(TrainError::training(format!(
            "cannot split {} samples into {} folds",
            labels.len(),
            k
        )));
    }

    let folds = stratified_folds(labels, k);
    let scores = folds
        .par_iter()
        .enumerate()
        .map(|(i, test_idx)| {
            let mut in_test = vec![false; labels.len()];
            test_idx.iter().for_each(|&t| in_test[t] = true);
            let train_idx: Vec<usize> = (0..labels.len()).filter(|&r| !in_test[r]).collect();

            let train_x = features.select(Axis(0), &train_idx);
            let train_y = labels.select(Axis(0), &train_idx);
            let test_x = features.select(Axis(0), test_idx);
            let test_y = labels.select(Axis(0), test_idx);

            let model =
                GradientBoostedClassifier::fit(params.clone(), train_x.view(), train_y.view(), &[])?;
            let score = accuracy(&test_y, &model.predict(test_x.view()));
            tracing::debug!("CV fold {}/{}: accuracy {:.4}", i + 1, k, score);
            Ok(score)
        })
        .collect::<Result<Vec<f64>>>()?;

    Ok(CvSummary::from_scores(scores))
}
