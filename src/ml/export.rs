//! JSON artifacts consumed by the browser-side evaluator.
//!
//! Trees use the usual boosted-tree JSON dump layout: split nodes carry
//! `split` (`"f<index>"`), `split_condition`, `yes`/`no`/`missing` child ids
//! and `children`; leaves carry `leaf`. A row goes to `yes` when
//! `x[index] < split_condition`.

use crate::ml::booster::{BoostParams, GradientBoostedClassifier};
use crate::ml::cross_validation::CvSummary;
use crate::ml::evaluation::EvaluationReport;
use crate::ml::scaler::StandardScaler;
use crate::ml::tree::RegressionTree;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const MODEL_FILE: &str = "xgboost_model.json";
pub const NORMALIZATION_FILE: &str = "normalization.json";
pub const BROWSER_NORMALIZATION_FILE: &str = "norm_browser.json";
pub const REPORT_FILE: &str = "training_report.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelExport {
    #[serde(rename = "type")]
    pub model_type: String,
    pub version: u32,
    pub num_trees: usize,
    pub num_features: usize,
    pub base_score: f64,
    pub learning_rate: f64,
    pub trees: Vec<Value>,
    pub feature_names: Vec<String>,
    pub exported_at: String,
}

impl ModelExport {
    pub fn new(model: &GradientBoostedClassifier, feature_names: &[String], exported_at: String) -> Self {
        let trees: Vec<Value> = model.trees.iter().map(tree_to_json).collect();
        Self {
            model_type: "xgboost".to_string(),
            version: 1,
            num_trees: trees.len(),
            num_features: model.num_features,
            base_score: model.params.base_score,
            learning_rate: model.params.learning_rate,
            trees,
            feature_names: feature_names.to_vec(),
            exported_at,
        }
    }
}

pub fn tree_to_json(tree: &RegressionTree) -> Value {
    node_to_json(tree, 0)
}

fn node_to_json(tree: &RegressionTree, id: usize) -> Value {
    let node = &tree.nodes[id];
    match node.split {
        Some(split) => json!({
            "nodeid": id,
            "depth": node.depth,
            "split": format!("f{}", split.feature),
            "split_condition": split.threshold,
            "yes": split.left,
            "no": split.right,
            "missing": split.left,
            "gain": node.gain,
            "cover": node.cover,
            "children": [node_to_json(tree, split.left), node_to_json(tree, split.right)],
        }),
        None => json!({
            "nodeid": id,
            "leaf": node.leaf_value,
            "cover": node.cover,
        }),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizationExport {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
    pub feature_names: Vec<String>,
}

/// 前端只需要 means/stds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrowserNormalization {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl NormalizationExport {
    pub fn new(scaler: &StandardScaler, feature_names: &[String]) -> Self {
        Self {
            means: scaler.means.to_vec(),
            stds: scaler.stds.to_vec(),
            feature_names: feature_names.to_vec(),
        }
    }

    pub fn browser(&self) -> BrowserNormalization {
        BrowserNormalization {
            means: self.means.clone(),
            stds: self.stds.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub metrics: EvaluationReport,
    pub cv_accuracy_mean: Option<f64>,
    pub cv_accuracy_std: Option<f64>,
    pub cv_scores: Vec<f64>,
    pub train_samples: usize,
    pub test_samples: usize,
    pub num_features: usize,
    pub num_trees: usize,
    pub best_iteration: usize,
    pub best_score: Option<f64>,
    pub training_seconds: f64,
    pub hyperparameters: BoostParams,
    pub trained_at: String,
}

impl TrainingReport {
    pub fn new(
        model: &GradientBoostedClassifier,
        metrics: EvaluationReport,
        cv: Option<&CvSummary>,
        train_samples: usize,
        test_samples: usize,
        trained_at: String,
    ) -> Self {
        Self {
            metrics,
            cv_accuracy_mean: cv.map(|c| c.mean),
            cv_accuracy_std: cv.map(|c| c.std),
            cv_scores: cv.map(|c| c.scores.clone()).unwrap_or_default(),
            train_samples,
            test_samples,
            num_features: model.num_features,
            num_trees: model.trees.len(),
            best_iteration: model.best_iteration,
            best_score: model.best_score,
            training_seconds: model.training_seconds,
            hyperparameters: model.params.clone(),
            trained_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::tree::{Split, TreeNode};
    use ndarray::array;

    fn stump() -> RegressionTree {
        RegressionTree {
            nodes: vec![
                TreeNode {
                    depth: 0,
                    split: Some(Split {
                        feature: 3,
                        threshold: 0.25,
                        left: 1,
                        right: 2,
                    }),
                    leaf_value: 0.0,
                    gain: 12.5,
                    cover: 40.0,
                },
                TreeNode {
                    depth: 1,
                    split: None,
                    leaf_value: -0.1,
                    gain: 0.0,
                    cover: 25.0,
                },
                TreeNode {
                    depth: 1,
                    split: None,
                    leaf_value: 0.2,
                    gain: 0.0,
                    cover: 15.0,
                },
            ],
        }
    }

    #[test]
    fn test_tree_dump_layout() {
        let dump = tree_to_json(&stump());

        assert_eq!(dump["nodeid"], 0);
        assert_eq!(dump["split"], "f3");
        assert_eq!(dump["split_condition"], 0.25);
        assert_eq!(dump["yes"], 1);
        assert_eq!(dump["no"], 2);
        assert_eq!(dump["missing"], 1);
        assert_eq!(dump["children"][0]["nodeid"], 1);
        assert_eq!(dump["children"][0]["leaf"], -0.1);
        assert_eq!(dump["children"][1]["leaf"], 0.2);
        assert!(dump["children"][1].get("split").is_none());
    }

    #[test]
    fn test_model_export_header() {
        let model = GradientBoostedClassifier {
            params: BoostParams::default(),
            trees: vec![stump(), stump()],
            num_features: 4,
            best_iteration: 1,
            best_score: Some(0.6),
            training_seconds: 0.1,
            eval_log: vec![],
        };
        let names: Vec<String> = (0..4).map(|i| format!("f{}", i)).collect();
        let export = ModelExport::new(&model, &names, "2026-01-01T00:00:00Z".to_string());
        let value = serde_json::to_value(&export).unwrap();

        assert_eq!(value["type"], "xgboost");
        assert_eq!(value["version"], 1);
        assert_eq!(value["num_trees"], 2);
        assert_eq!(value["num_features"], 4);
        assert_eq!(value["base_score"], 0.5);
        assert_eq!(value["learning_rate"], 0.05);
        assert_eq!(value["trees"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_browser_normalization_drops_names() {
        let scaler = StandardScaler {
            means: array![1.0],
            stds: array![2.0],
        };
        let norm = NormalizationExport::new(&scaler, &["rsi".to_string()]);
        let browser = serde_json::to_value(norm.browser()).unwrap();
        assert_eq!(browser, json!({"means": [1.0], "stds": [2.0]}));
    }
}
