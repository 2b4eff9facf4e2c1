//! Gradient-boosted tree classifier with a logistic objective.

use crate::ml::histogram::{BinnedMatrix, FeatureCuts};
use crate::ml::tree::{RegressionTree, TreeParams};
use crate::utils::error::{Result, TrainError};
use ndarray::{Array1, ArrayView1, ArrayView2, Zip};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Booster hyperparameters. Defaults are the values the production model is trained with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoostParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub min_child_weight: f64,
    pub gamma: f64,
    /// L1 regularization
    pub reg_alpha: f64,
    /// L2 regularization
    pub reg_lambda: f64,
    pub scale_pos_weight: f64,
    pub early_stopping_rounds: Option<usize>,
    pub random_state: u64,
    pub max_bin: usize,
    pub base_score: f64,
    pub objective: String,
    pub eval_metric: String,
    pub tree_method: String,
    /// 每幾輪輸出一次 logloss，0 表示不輸出
    pub verbose_every: usize,
}

impl Default for BoostParams {
    fn default() -> Self {
        Self {
            n_estimators: 500,
            max_depth: 6,
            learning_rate: 0.05,
            subsample: 0.8,
            colsample_bytree: 0.8,
            min_child_weight: 5.0,
            gamma: 0.1,
            reg_alpha: 0.1,
            reg_lambda: 1.0,
            scale_pos_weight: 1.0,
            early_stopping_rounds: Some(30),
            random_state: 42,
            max_bin: 256,
            base_score: 0.5,
            objective: "binary:logistic".to_string(),
            eval_metric: "logloss".to_string(),
            tree_method: "hist".to_string(),
            verbose_every: 50,
        }
    }
}

impl BoostParams {
    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_child_weight: self.min_child_weight,
            gamma: self.gamma,
            reg_alpha: self.reg_alpha,
            reg_lambda: self.reg_lambda,
            learning_rate: self.learning_rate,
        }
    }
}

/// A named evaluation set watched during training.
pub struct EvalSet<'a> {
    pub name: &'a str,
    pub features: ArrayView2<'a, f64>,
    pub labels: ArrayView1<'a, f64>,
}

/// Logloss of every eval set at one logged round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalRound {
    pub round: usize,
    /// 與 eval set 順序相同
    pub logloss: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostedClassifier {
    pub params: BoostParams,
    pub trees: Vec<RegressionTree>,
    pub num_features: usize,
    pub best_iteration: usize,
    pub best_score: Option<f64>,
    pub training_seconds: f64,
    /// 有輸出到日誌的輪次
    #[serde(default)]
    pub eval_log: Vec<EvalRound>,
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub fn logloss(labels: ArrayView1<'_, f64>, margins: &Array1<f64>) -> f64 {
    const EPS: f64 = 1e-16;
    if labels.is_empty() {
        return 0.0;
    }
    let total: f64 = labels
        .iter()
        .zip(margins.iter())
        .map(|(&y, &m)| {
            let p = sigmoid(m).clamp(EPS, 1.0 - EPS);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum();
    total / labels.len() as f64
}

/// 每 `every` 輪、最後一輪以及提前停止的那一輪都要輸出
fn eval_line_due(round: usize, every: usize, is_last: bool, stopping: bool) -> bool {
    every > 0 && (round % every == 0 || is_last || stopping)
}

impl GradientBoostedClassifier {
    /// Fits the ensemble. When `early_stopping_rounds` is set, the last eval set
    /// drives early stopping and the ensemble is cut back to the best round.
    pub fn fit(
        params: BoostParams,
        features: ArrayView2<'_, f64>,
        labels: ArrayView1<'_, f64>,
        eval_sets: &[EvalSet<'_>],
    ) -> Result<Self> {
        let n = features.nrows();
        if n == 0 {
            return Err(TrainError::training("cannot fit on an empty training set"));
        }
        if n != labels.len() {
            return Err(TrainError::training(format!(
                "{} rows but {} labels",
                n,
                labels.len()
            )));
        }
        if !(params.base_score > 0.0 && params.base_score < 1.0) {
            return Err(TrainError::training("base_score must be in (0, 1)"));
        }

        let start = Instant::now();
        let num_features = features.ncols();
        let tree_params = params.tree_params();
        let base_margin = (params.base_score / (1.0 - params.base_score)).ln();

        let cuts = FeatureCuts::from_rows(features, params.max_bin);
        let binned = BinnedMatrix::new(features, &cuts);
        let mut rng = ChaCha8Rng::seed_from_u64(params.random_state);

        let mut train_margin = Array1::from_elem(n, base_margin);
        let mut eval_margins: Vec<Array1<f64>> = eval_sets
            .iter()
            .map(|set| Array1::from_elem(set.features.nrows(), base_margin))
            .collect();
        let mut grad = Array1::zeros(n);
        let mut hess = Array1::zeros(n);

        let watch_index = eval_sets.len().checked_sub(1);
        let mut best_iteration = 0;
        let mut best_score: Option<f64> = None;
        let mut eval_log = Vec::new();
        let mut trees: Vec<RegressionTree> = Vec::with_capacity(params.n_estimators);

        for round in 0..params.n_estimators {
            Zip::from(&mut grad)
                .and(&mut hess)
                .and(&train_margin)
                .and(labels)
                .for_each(|g, h, &m, &y| {
                    let p = sigmoid(m);
                    let w = if y == 1.0 { params.scale_pos_weight } else { 1.0 };
                    *g = w * (p - y);
                    *h = (w * p * (1.0 - p)).max(1e-16);
                });

            let rows = sample_rows(&mut rng, n, params.subsample);
            let columns = sample_columns(&mut rng, num_features, params.colsample_bytree);
            let tree = RegressionTree::grow(&binned, &cuts, &grad, &hess, rows, &columns, &tree_params);

            train_margin += &tree.predict_batch(features);
            for (margins, set) in eval_margins.iter_mut().zip(eval_sets) {
                *margins += &tree.predict_batch(set.features);
            }
            trees.push(tree);

            let scores: Vec<f64> = eval_margins
                .iter()
                .zip(eval_sets)
                .map(|(m, set)| logloss(set.labels, m))
                .collect();

            let mut stopping = false;
            if let Some(watch) = watch_index {
                let score = scores[watch];
                if best_score.map_or(true, |best| score < best) {
                    best_score = Some(score);
                    best_iteration = round;
                }
                if let Some(patience) = params.early_stopping_rounds {
                    stopping = round - best_iteration >= patience;
                }
            }

            let is_last = round + 1 == params.n_estimators;
            if !eval_sets.is_empty() && eval_line_due(round, params.verbose_every, is_last, stopping) {
                let line = eval_sets
                    .iter()
                    .zip(&scores)
                    .map(|(set, s)| format!("{}-logloss:{:.5}", set.name, s))
                    .collect::<Vec<_>>()
                    .join("\t");
                tracing::info!("[{}]\t{}", round, line);
                eval_log.push(EvalRound {
                    round,
                    logloss: scores,
                });
            }

            if stopping {
                if let (Some(watch), Some(best)) = (watch_index, best_score) {
                    tracing::info!(
                        "⏹️  Early stopping at round {} (best round {}, {}-logloss {:.5})",
                        round,
                        best_iteration,
                        eval_sets[watch].name,
                        best
                    );
                }
                break;
            }
        }

        if watch_index.is_some() && params.early_stopping_rounds.is_some() {
            trees.truncate(best_iteration + 1);
        } else {
            best_iteration = trees.len().saturating_sub(1);
        }

        Ok(Self {
            params,
            trees,
            num_features,
            best_iteration,
            best_score,
            training_seconds: start.elapsed().as_secs_f64(),
            eval_log,
        })
    }

    pub fn base_margin(&self) -> f64 {
        (self.params.base_score / (1.0 - self.params.base_score)).ln()
    }

    /// Raw scores, accumulated tree by tree the same way the browser evaluator does.
    pub fn predict_margins(&self, rows: ArrayView2<'_, f64>) -> Array1<f64> {
        let mut margins = Array1::from_elem(rows.nrows(), self.base_margin());
        for tree in &self.trees {
            margins += &tree.predict_batch(rows);
        }
        margins
    }

    /// P(UP) 每一列
    pub fn predict_proba(&self, rows: ArrayView2<'_, f64>) -> Array1<f64> {
        self.predict_margins(rows).mapv(sigmoid)
    }

    pub fn predict(&self, rows: ArrayView2<'_, f64>) -> Array1<f64> {
        self.predict_proba(rows)
            .mapv(|p| if p > 0.5 { 1.0 } else { 0.0 })
    }

    /// Average split gain per feature, normalized to sum to 1.
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut total_gain = vec![0.0; self.num_features];
        let mut splits = vec![0usize; self.num_features];
        for node in self.trees.iter().flat_map(|t| &t.nodes) {
            if let Some(split) = node.split {
                total_gain[split.feature] += node.gain;
                splits[split.feature] += 1;
            }
        }

        let average: Vec<f64> = total_gain
            .iter()
            .zip(&splits)
            .map(|(&g, &c)| if c > 0 { g / c as f64 } else { 0.0 })
            .collect();
        let sum: f64 = average.iter().sum();
        if sum > 0.0 {
            average.iter().map(|a| a / sum).collect()
        } else {
            average
        }
    }
}

fn sample_rows(rng: &mut ChaCha8Rng, n: usize, rate: f64) -> Vec<usize> {
    if rate >= 1.0 {
        return (0..n).collect();
    }
    (0..n).filter(|_| rng.gen::<f64>() < rate).collect()
}

fn sample_columns(rng: &mut ChaCha8Rng, n: usize, rate: f64) -> Vec<usize> {
    let all: Vec<usize> = (0..n).collect();
    if rate >= 1.0 {
        return all;
    }
    let k = ((rate * n as f64).round() as usize).clamp(1, n);
    let mut picked: Vec<usize> = all.choose_multiple(rng, k).copied().collect();
    picked.sort_unstable();
    picked
}
