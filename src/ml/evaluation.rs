//! Test-set evaluation: classification metrics plus the confidence-based
//! views the trading side cares about.

use crate::ml::booster::GradientBoostedClassifier;
use crate::ml::metrics::ClassificationMetrics;
use ndarray::{Array1, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

/// `[lo, hi)` 信心區間，最後一格上界 1.01 以包含 p = 1.0
pub const CONFIDENCE_BUCKETS: [(&str, f64, f64); 7] = [
    ("50-55%", 0.50, 0.55),
    ("55-60%", 0.55, 0.60),
    ("60-65%", 0.60, 0.65),
    ("65-70%", 0.65, 0.70),
    ("70-80%", 0.70, 0.80),
    ("80-90%", 0.80, 0.90),
    ("90%+", 0.90, 1.01),
];

pub const TRADING_THRESHOLDS: [f64; 8] = [0.55, 0.60, 0.65, 0.70, 0.75, 0.80, 0.85, 0.90];

pub const TOP_FEATURES: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalibrationBucket {
    pub range: String,
    pub total: usize,
    pub correct: usize,
    /// 百分比
    pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradingResult {
    pub threshold: f64,
    pub trades: usize,
    pub wins: usize,
    pub accuracy: f64,
    /// 佔測試樣本的百分比
    pub coverage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureImportance {
    pub name: String,
    pub importance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    #[serde(flatten)]
    pub classification: ClassificationMetrics,
    pub calibration: Vec<CalibrationBucket>,
    pub trading_simulation: Vec<TradingResult>,
    pub feature_importance: Vec<FeatureImportance>,
}

/// The model's confidence in whichever side it picked.
fn confidence(p: f64) -> f64 {
    p.max(1.0 - p)
}

pub fn calibration_buckets(
    y_true: &Array1<f64>,
    y_pred: &Array1<f64>,
    y_proba: &Array1<f64>,
) -> Vec<CalibrationBucket> {
    CONFIDENCE_BUCKETS
        .iter()
        .filter_map(|&(label, lo, hi)| {
            let (total, correct) = count_where(y_true, y_pred, y_proba, |c| c >= lo && c < hi);
            (total > 0).then(|| CalibrationBucket {
                range: label.to_string(),
                total,
                correct,
                accuracy: correct as f64 / total as f64 * 100.0,
            })
        })
        .collect()
}

pub fn simulate_trading(
    y_true: &Array1<f64>,
    y_pred: &Array1<f64>,
    y_proba: &Array1<f64>,
) -> Vec<TradingResult> {
    TRADING_THRESHOLDS
        .iter()
        .filter_map(|&threshold| {
            let (trades, wins) = count_where(y_true, y_pred, y_proba, |c| c >= threshold);
            (trades > 0).then(|| TradingResult {
                threshold,
                trades,
                wins,
                accuracy: wins as f64 / trades as f64 * 100.0,
                coverage: trades as f64 / y_true.len() as f64 * 100.0,
            })
        })
        .collect()
}

fn count_where(
    y_true: &Array1<f64>,
    y_pred: &Array1<f64>,
    y_proba: &Array1<f64>,
    keep: impl Fn(f64) -> bool,
) -> (usize, usize) {
    Zip::from(y_true)
        .and(y_pred)
        .and(y_proba)
        .fold((0, 0), |(total, correct), t, pred, &p| {
            if keep(confidence(p)) {
                (total + 1, correct + usize::from(t == pred))
            } else {
                (total, correct)
            }
        })
}

/// Highest-importance features first, at most `limit` of them.
pub fn top_features(importances: &[f64], names: &[String], limit: usize) -> Vec<FeatureImportance> {
    let mut order: Vec<usize> = (0..importances.len()).collect();
    order.sort_by(|&a, &b| importances[b].total_cmp(&importances[a]).then(a.cmp(&b)));
    order
        .into_iter()
        .take(limit)
        .map(|i| FeatureImportance {
            name: names.get(i).cloned().unwrap_or_else(|| format!("f{}", i)),
            importance: importances[i],
        })
        .collect()
}

impl EvaluationReport {
    pub fn evaluate(
        model: &GradientBoostedClassifier,
        features: ArrayView2<'_, f64>,
        labels: &Array1<f64>,
        feature_names: &[String],
    ) -> Self {
        let y_proba = model.predict_proba(features);
        let y_pred = y_proba.mapv(|p| if p > 0.5 { 1.0 } else { 0.0 });

        Self {
            classification: ClassificationMetrics::compute(labels, &y_pred, &y_proba),
            calibration: calibration_buckets(labels, &y_pred, &y_proba),
            trading_simulation: simulate_trading(labels, &y_pred, &y_proba),
            feature_importance: top_features(&model.feature_importances(), feature_names, TOP_FEATURES),
        }
    }

    pub fn print_summary(&self) {
        let m = &self.classification;
        println!();
        println!("╔══════════════════════════════════════╗");
        println!("║        TEST SET EVALUATION           ║");
        println!("╠══════════════════════════════════════╣");
        println!("║  Accuracy:  {:.2}%", m.accuracy * 100.0);
        println!("║  Precision: {:.2}%", m.precision * 100.0);
        println!("║  Recall:    {:.2}%", m.recall * 100.0);
        println!("║  F1 Score:  {:.2}%", m.f1 * 100.0);
        match m.auc_roc {
            Some(auc) => println!("║  AUC-ROC:   {:.4}", auc),
            None => println!("║  AUC-ROC:   n/a (single class in test set)"),
        }
        println!("╠══════════════════════════════════════╣");
        println!("║  Confusion Matrix:");
        println!("║    Pred UP   → TP: {}, FP: {}", m.true_positives(), m.false_positives());
        println!("║    Pred DOWN → TN: {}, FN: {}", m.true_negatives(), m.false_negatives());
        println!("╚══════════════════════════════════════╝");

        println!("\n📊 ACCURACY BY ML CONFIDENCE:");
        for bucket in &self.calibration {
            let bar = "█".repeat((bucket.accuracy / 5.0).round() as usize);
            println!(
                "   {:<6}: {:>5}/{:>5} = {:>5.1}% {}",
                bucket.range, bucket.correct, bucket.total, bucket.accuracy, bar
            );
        }

        println!("\n🎯 SIMULATED TRADING (only trade when ML confident):");
        for result in &self.trading_simulation {
            println!(
                "   Threshold {:.0}%: {}/{} = {:.1}% ({:.0}% of opportunities)",
                result.threshold * 100.0,
                result.wins,
                result.trades,
                result.accuracy,
                result.coverage
            );
        }

        println!("\n📊 TOP {} FEATURE IMPORTANCE:", TOP_FEATURES);
        for (rank, feature) in self.feature_importance.iter().enumerate() {
            println!(
                "   {:>2}. {:.<25} {:.4}",
                rank + 1,
                feature.name,
                feature.importance
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_calibration_buckets_skip_empty_ranges() {
        let y_true = array![1.0, 0.0, 1.0, 0.0];
        let y_proba = array![0.52, 0.46, 0.95, 0.3];
        let y_pred = array![1.0, 0.0, 1.0, 0.0];
        let buckets = calibration_buckets(&y_true, &y_pred, &y_proba);

        // 0.52 與 0.54(=1-0.46) 在 50-55，0.95 在 90%+，0.7 在 70-80
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].range, "50-55%");
        assert_eq!(buckets[0].total, 2);
        assert_eq!(buckets[0].accuracy, 100.0);
        assert_eq!(buckets[2].range, "90%+");
        let total: usize = buckets.iter().map(|b| b.total).sum();
        assert_eq!(total, y_true.len());
    }

    #[test]
    fn test_certain_prediction_lands_in_top_bucket() {
        let buckets = calibration_buckets(&array![1.0], &array![1.0], &array![1.0]);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].range, "90%+");
    }

    #[test]
    fn test_trading_simulation_counts() {
        let y_true = array![1.0, 0.0, 1.0, 0.0];
        let y_pred = array![1.0, 1.0, 1.0, 0.0];
        let y_proba = array![0.9, 0.6, 0.7, 0.2];
        let results = simulate_trading(&y_true, &y_pred, &y_proba);

        assert_eq!(results[0].threshold, 0.55);
        assert_eq!(results[0].trades, 4);
        assert_eq!(results[0].wins, 3);
        assert_eq!(results[0].coverage, 100.0);

        let at_80 = results.iter().find(|r| r.threshold == 0.80).unwrap();
        assert_eq!(at_80.trades, 2);
        assert_eq!(at_80.wins, 2);
        assert_eq!(at_80.coverage, 50.0);

        // 0.90 仍有一筆 (p = 0.9)
        assert_eq!(results.last().unwrap().threshold, 0.90);
        assert_eq!(results.last().unwrap().trades, 1);
    }

    #[test]
    fn test_trading_simulation_omits_empty_thresholds() {
        let results = simulate_trading(&array![1.0, 0.0], &array![1.0, 0.0], &array![0.56, 0.42]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].threshold, 0.55);
    }

    #[test]
    fn test_top_features_order_and_limit() {
        let names: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let top = top_features(&[0.2, 0.5, 0.3], &names, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].name, "b");
        assert_eq!(top[1].name, "c");
    }
}
