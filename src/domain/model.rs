use crate::ml::{CvSummary, EvaluationReport, GradientBoostedClassifier, StandardScaler};
use crate::utils::error::{Result, TrainError};
use ndarray::{Array1, Array2};
use serde::Deserialize;

/// 上游特徵產生器輸出的 28 個特徵，順序必須與前端推論一致
pub const DEFAULT_FEATURE_NAMES: [&str; 28] = [
    "ptb_distance_pct",
    "rsi",
    "rsi_slope",
    "macd_histogram",
    "macd_line",
    "vwap_distance_pct",
    "vwap_slope",
    "ha_consecutive",
    "delta_1m_pct",
    "delta_3m_pct",
    "volume_ratio",
    "minutes_left",
    "rule_prob_up",
    "rule_confidence",
    "vwap_cross_count",
    "edge_best",
    "regime_trending",
    "regime_choppy",
    "regime_mean_rev",
    "regime_moderate",
    "session_asia",
    "session_europe",
    "session_us",
    "session_overlap",
    "session_off",
    "ha_color_green",
    "multi_tf_agree",
    "failed_vwap",
];

/// 特徵檔的原始 JSON 形狀
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDataset {
    train_features: Vec<Vec<f64>>,
    train_labels: Vec<f64>,
    test_features: Vec<Vec<f64>>,
    test_labels: Vec<f64>,
    #[serde(default)]
    feature_names: Option<Vec<String>>,
}

/// One split of the dataset: a samples × features matrix plus 0/1 labels.
#[derive(Debug, Clone)]
pub struct Split {
    pub features: Array2<f64>,
    pub labels: Array1<f64>,
}

impl Split {
    pub fn new(features: Array2<f64>, labels: Array1<f64>) -> Self {
        Self { features, labels }
    }

    /// 由 JSON 的逐列特徵組成矩陣，每列長度必須一致
    pub fn from_rows(name: &str, rows: Vec<Vec<f64>>, labels: Vec<f64>) -> Result<Self> {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if let Some(i) = rows.iter().position(|row| row.len() != width) {
            return Err(TrainError::dataset(format!(
                "{} row {} has {} features, expected {}",
                name,
                i,
                rows[i].len(),
                width
            )));
        }

        let n = rows.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let features = Array2::from_shape_vec((n, width), flat)
            .map_err(|e| TrainError::dataset(format!("{} features: {}", name, e)))?;
        Ok(Self::new(features, Array1::from(labels)))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&y| y == 1.0).count()
    }

    fn validate(&self, name: &str, width: usize) -> Result<()> {
        if self.features.nrows() == 0 {
            return Err(TrainError::dataset(format!("{} split has no samples", name)));
        }
        if self.features.nrows() != self.labels.len() {
            return Err(TrainError::dataset(format!(
                "{} split has {} rows but {} labels",
                name,
                self.features.nrows(),
                self.labels.len()
            )));
        }
        if self.num_features() != width {
            return Err(TrainError::dataset(format!(
                "{} split has {} features, expected {}",
                name,
                self.num_features(),
                width
            )));
        }
        if let Some(((i, j), _)) = self.features.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(TrainError::dataset(format!(
                "{} row {} feature {} is not finite",
                name, i, j
            )));
        }
        if let Some(i) = self.labels.iter().position(|&y| y != 0.0 && y != 1.0) {
            return Err(TrainError::dataset(format!(
                "{} label {} is {}, expected 0 or 1",
                name, i, self.labels[i]
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub train: Split,
    pub test: Split,
    pub feature_names: Vec<String>,
}

impl Dataset {
    pub fn new(train: Split, test: Split, feature_names: Option<Vec<String>>) -> Result<Self> {
        let width = train.num_features();
        train.validate("train", width)?;
        test.validate("test", width)?;
        if width == 0 {
            return Err(TrainError::dataset("feature rows are empty"));
        }

        let feature_names = match feature_names {
            Some(names) if names.len() != width => {
                return Err(TrainError::dataset(format!(
                    "featureNames has {} entries but rows have {} features",
                    names.len(),
                    width
                )));
            }
            Some(names) => names,
            None => default_feature_names(width),
        };

        Ok(Self {
            train,
            test,
            feature_names,
        })
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: RawDataset = serde_json::from_slice(bytes)?;
        Self::new(
            Split::from_rows("train", raw.train_features, raw.train_labels)?,
            Split::from_rows("test", raw.test_features, raw.test_labels)?,
            raw.feature_names,
        )
    }

    pub fn num_features(&self) -> usize {
        self.feature_names.len()
    }

    /// (UP, DOWN) 樣本數，以訓練集計算
    pub fn class_balance(&self) -> (usize, usize) {
        let up = self.train.positives();
        (up, self.train.len() - up)
    }
}

/// Everything the load step needs to write the model artifacts.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: GradientBoostedClassifier,
    pub scaler: StandardScaler,
    pub evaluation: EvaluationReport,
    pub cv: Option<CvSummary>,
    pub feature_names: Vec<String>,
    pub train_samples: usize,
    pub test_samples: usize,
}

impl TrainingOutcome {
    pub fn print_completion_summary(&self) {
        let m = &self.evaluation.classification;
        println!("\n{}", "=".repeat(50));
        println!("✅ TRAINING COMPLETE!");
        println!("   Test Accuracy: {:.2}%", m.accuracy * 100.0);
        match m.auc_roc {
            Some(auc) => println!("   AUC-ROC: {:.4}", auc),
            None => println!("   AUC-ROC: n/a"),
        }
        if let Some(cv) = &self.cv {
            println!("   CV Accuracy: {:.2}% ± {:.2}%", cv.mean * 100.0, cv.std * 100.0);
        }
        println!("{}", "=".repeat(50));
    }
}

pub fn default_feature_names(width: usize) -> Vec<String> {
    if width == DEFAULT_FEATURE_NAMES.len() {
        DEFAULT_FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
    } else {
        (0..width).map(|i| format!("f{}", i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn json(train: &str, train_labels: &str, test: &str, test_labels: &str) -> Vec<u8> {
        format!(
            r#"{{"trainFeatures": {}, "trainLabels": {}, "testFeatures": {}, "testLabels": {}, "meta": {{"symbol": "BTCUSDT"}}}}"#,
            train, train_labels, test, test_labels
        )
        .into_bytes()
    }

    #[test]
    fn test_parse_valid_dataset() {
        let bytes = json("[[1.0, 2.0], [3.0, 4.0]]", "[1, 0]", "[[5.0, 6.0]]", "[1]");
        let dataset = Dataset::from_json_bytes(&bytes).unwrap();

        assert_eq!(dataset.train.len(), 2);
        assert_eq!(dataset.test.len(), 1);
        assert_eq!(dataset.num_features(), 2);
        assert_eq!(dataset.feature_names, vec!["f0", "f1"]);
        assert_eq!(dataset.class_balance(), (1, 1));
    }

    #[test]
    fn test_default_names_for_market_schema() {
        let names = default_feature_names(28);
        assert_eq!(names[0], "ptb_distance_pct");
        assert_eq!(names[27], "failed_vwap");
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let bytes = json("[[1.0, 2.0], [3.0]]", "[1, 0]", "[[5.0, 6.0]]", "[1]");
        let err = Dataset::from_json_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("train row 1"));
    }

    #[test]
    fn test_test_width_must_match_train() {
        let bytes = json("[[1.0, 2.0]]", "[1]", "[[5.0]]", "[0]");
        assert!(Dataset::from_json_bytes(&bytes).is_err());
    }

    #[test]
    fn test_label_count_mismatch_rejected() {
        let bytes = json("[[1.0], [2.0]]", "[1]", "[[5.0]]", "[0]");
        let err = Dataset::from_json_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("2 rows but 1 labels"));
    }

    #[test]
    fn test_non_binary_label_rejected() {
        let bytes = json("[[1.0], [2.0]]", "[1, 2]", "[[5.0]]", "[0]");
        assert!(Dataset::from_json_bytes(&bytes).is_err());
    }

    #[test]
    fn test_missing_key_is_serialization_error() {
        let err = Dataset::from_json_bytes(br#"{"trainFeatures": []}"#).unwrap_err();
        assert!(matches!(err, TrainError::SerializationError(_)));
    }

    #[test]
    fn test_non_finite_feature_rejected() {
        let train = Split::new(array![[1.0, f64::NAN]], array![1.0]);
        let test = Split::new(array![[1.0, 2.0]], array![0.0]);
        let err = Dataset::new(train, test, None).unwrap_err();
        assert!(err.to_string().contains("train row 0 feature 1"));
    }

    #[test]
    fn test_rows_become_matrix() {
        let split = Split::from_rows("train", vec![vec![1.0, 2.0], vec![3.0, 4.0]], vec![0.0, 1.0]).unwrap();
        assert_eq!(split.features, array![[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(split.num_features(), 2);
        assert_eq!(split.positives(), 1);
    }

    #[test]
    fn test_feature_names_length_checked() {
        let train = Split::new(array![[1.0, 2.0]], array![1.0]);
        let test = train.clone();
        let names = Some(vec!["only_one".to_string()]);
        assert!(Dataset::new(train, test, names).is_err());
    }
}
