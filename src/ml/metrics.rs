use ndarray::{Array1, Zip};
use serde::{Deserialize, Serialize};

/// Binary classification metrics on a labelled split. Ratios are in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// 測試集只有單一類別時無法定義
    pub auc_roc: Option<f64>,
    /// `[[TN, FP], [FN, TP]]`
    pub confusion_matrix: [[usize; 2]; 2],
}

impl ClassificationMetrics {
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>, y_proba: &Array1<f64>) -> Self {
        let cm = confusion_matrix(y_true, y_pred);
        let [[tn, fp], [fn_, tp]] = cm;
        let total = tn + fp + fn_ + tp;

        let precision = safe_ratio(tp, tp + fp);
        let recall = safe_ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            accuracy: safe_ratio(tp + tn, total),
            precision,
            recall,
            f1,
            auc_roc: roc_auc(y_true, y_proba),
            confusion_matrix: cm,
        }
    }

    pub fn true_positives(&self) -> usize {
        self.confusion_matrix[1][1]
    }

    pub fn false_positives(&self) -> usize {
        self.confusion_matrix[0][1]
    }

    pub fn true_negatives(&self) -> usize {
        self.confusion_matrix[0][0]
    }

    pub fn false_negatives(&self) -> usize {
        self.confusion_matrix[1][0]
    }
}

fn safe_ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

pub fn accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let correct = Zip::from(y_true)
        .and(y_pred)
        .fold(0, |acc, t, p| acc + usize::from(t == p));
    safe_ratio(correct, y_true.len())
}

pub fn confusion_matrix(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> [[usize; 2]; 2] {
    let mut cm = [[0usize; 2]; 2];
    Zip::from(y_true).and(y_pred).for_each(|&t, &p| {
        cm[usize::from(t == 1.0)][usize::from(p == 1.0)] += 1;
    });
    cm
}

/// ROC AUC via the rank-sum statistic, averaging ranks over tied scores.
pub fn roc_auc(y_true: &Array1<f64>, scores: &Array1<f64>) -> Option<f64> {
    let positives = y_true.iter().filter(|&&y| y == 1.0).count();
    let negatives = y_true.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // 名次從 1 開始，平手取平均
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if y_true[idx] == 1.0 {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Some((rank_sum_pos - p * (p + 1.0) / 2.0) / (p * n))
}
