//! Boosted-tree training, evaluation and export.

pub mod booster;
pub mod cross_validation;
pub mod evaluation;
pub mod export;
pub mod histogram;
pub mod metrics;
pub mod scaler;
pub mod tree;

pub use booster::{BoostParams, EvalSet, GradientBoostedClassifier};
pub use cross_validation::CvSummary;
pub use evaluation::EvaluationReport;
pub use scaler::StandardScaler;
