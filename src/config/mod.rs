#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

use crate::domain::ports::ConfigProvider;
use crate::ml::BoostParams;
use crate::utils::error::Result;
use crate::utils::validation::{
    validate_file_extension, validate_fraction, validate_path, validate_positive_number,
    validate_range, validate_required_field, Validate,
};
use serde::{Deserialize, Serialize};
use toml_config::TrainConfig;

pub const DEFAULT_MODELS_DIR: &str = "models";
pub const DEFAULT_CV_FOLDS: usize = 5;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Serialize, Deserialize, clap::Parser)]
#[command(name = "boost-train")]
#[command(about = "Train the boosted-tree direction classifier and export it for browser inference")]
pub struct CliConfig {
    /// Features JSON produced by the dataset builder
    #[arg(value_name = "FEATURES_FILE")]
    pub features_file: Option<String>,

    /// Output directory for model, normalization and report files
    #[arg(long)]
    pub models_dir: Option<String>,

    /// Optional TOML file with booster / cross-validation settings
    #[arg(short, long)]
    pub config: Option<String>,

    /// Number of cross-validation folds
    #[arg(long)]
    pub folds: Option<usize>,

    #[arg(long, help = "Skip cross-validation")]
    pub no_cv: bool,

    #[arg(long, help = "Log CPU and memory usage per phase")]
    pub monitor: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub log_json: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// 合併 TOML 設定與命令列參數，命令列優先
    pub fn resolve(&self) -> Result<RunConfig> {
        let features_file = validate_required_field("features_file", &self.features_file)?.clone();
        let file_config = match &self.config {
            Some(path) => TrainConfig::from_file(path)?,
            None => TrainConfig::default(),
        };

        let mut run = RunConfig::from_train_config(features_file, &file_config);
        if let Some(dir) = &self.models_dir {
            run.models_dir = dir.clone();
        }
        if let Some(folds) = self.folds {
            run.cv_folds = Some(folds);
        }
        if self.no_cv {
            run.cv_folds = None;
        }
        run.monitor |= self.monitor;
        Ok(run)
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        let features_file = validate_required_field("features_file", &self.features_file)?;
        validate_path("features_file", features_file)?;
        validate_file_extension("features_file", features_file, &["json"])?;
        if let Some(dir) = &self.models_dir {
            validate_path("models_dir", dir)?;
        }
        if let Some(config) = &self.config {
            validate_file_extension("config", config, &["toml"])?;
        }
        Ok(())
    }
}

/// Fully resolved settings for one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub features_file: String,
    pub models_dir: String,
    pub params: BoostParams,
    pub scale_pos_weight: Option<f64>,
    pub cv_folds: Option<usize>,
    pub monitor: bool,
}

impl RunConfig {
    pub fn new(features_file: impl Into<String>, models_dir: impl Into<String>) -> Self {
        Self {
            features_file: features_file.into(),
            models_dir: models_dir.into(),
            params: BoostParams::default(),
            scale_pos_weight: None,
            cv_folds: Some(DEFAULT_CV_FOLDS),
            monitor: false,
        }
    }

    pub fn from_train_config(features_file: String, file_config: &TrainConfig) -> Self {
        let models_dir = file_config
            .output
            .models_dir
            .clone()
            .unwrap_or_else(|| DEFAULT_MODELS_DIR.to_string());

        let mut run = Self::new(features_file, models_dir);
        file_config.apply_to(&mut run.params);
        run.scale_pos_weight = file_config.booster.scale_pos_weight;
        run.cv_folds = file_config
            .cv_enabled()
            .then(|| file_config.cross_validation.folds.unwrap_or(DEFAULT_CV_FOLDS));
        run.monitor = file_config.monitoring_enabled();
        run
    }

    pub fn monitor_enabled(&self) -> bool {
        self.monitor
    }
}

impl ConfigProvider for RunConfig {
    fn features_file(&self) -> &str {
        &self.features_file
    }

    fn models_dir(&self) -> &str {
        &self.models_dir
    }

    fn booster_params(&self) -> &BoostParams {
        &self.params
    }

    fn scale_pos_weight(&self) -> Option<f64> {
        self.scale_pos_weight
    }

    fn cv_folds(&self) -> Option<usize> {
        self.cv_folds
    }
}

impl Validate for RunConfig {
    fn validate(&self) -> Result<()> {
        let p = &self.params;
        validate_path("features_file", &self.features_file)?;
        validate_path("output.models_dir", &self.models_dir)?;

        validate_positive_number("booster.n_estimators", p.n_estimators, 1)?;
        validate_range("booster.max_depth", p.max_depth, 1, 32)?;
        validate_fraction("booster.learning_rate", p.learning_rate)?;
        validate_fraction("booster.subsample", p.subsample)?;
        validate_fraction("booster.colsample_bytree", p.colsample_bytree)?;
        validate_range("booster.min_child_weight", p.min_child_weight, 0.0, f64::MAX)?;
        validate_range("booster.gamma", p.gamma, 0.0, f64::MAX)?;
        validate_range("booster.reg_alpha", p.reg_alpha, 0.0, f64::MAX)?;
        validate_range("booster.reg_lambda", p.reg_lambda, 0.0, f64::MAX)?;
        validate_range("booster.max_bin", p.max_bin, 2, u16::MAX as usize)?;
        if !(p.base_score > 0.0 && p.base_score < 1.0) {
            return Err(crate::utils::error::TrainError::InvalidConfigValueError {
                field: "booster.base_score".to_string(),
                value: p.base_score.to_string(),
                reason: "Value must be in (0, 1)".to_string(),
            });
        }
        if let Some(rounds) = p.early_stopping_rounds {
            validate_positive_number("booster.early_stopping_rounds", rounds, 1)?;
        }
        if let Some(weight) = self.scale_pos_weight {
            validate_range("booster.scale_pos_weight", weight, f64::MIN_POSITIVE, f64::MAX)?;
        }
        if let Some(folds) = self.cv_folds {
            validate_positive_number("cross_validation.folds", folds, 2)?;
        }
        Ok(())
    }
}
