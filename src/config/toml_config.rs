use crate::ml::BoostParams;
use crate::utils::error::{Result, TrainError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 訓練設定檔，所有欄位皆可省略
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainConfig {
    pub booster: BoosterConfig,
    pub cross_validation: CrossValidationConfig,
    pub output: OutputConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoosterConfig {
    pub n_estimators: Option<usize>,
    pub max_depth: Option<usize>,
    pub learning_rate: Option<f64>,
    pub subsample: Option<f64>,
    pub colsample_bytree: Option<f64>,
    pub min_child_weight: Option<f64>,
    pub gamma: Option<f64>,
    pub reg_alpha: Option<f64>,
    pub reg_lambda: Option<f64>,
    /// 省略時依類別比例自動計算
    pub scale_pos_weight: Option<f64>,
    pub early_stopping_rounds: Option<usize>,
    pub random_state: Option<u64>,
    pub max_bin: Option<usize>,
    pub base_score: Option<f64>,
    pub verbose_every: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrossValidationConfig {
    pub enabled: Option<bool>,
    pub folds: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub models_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitoringConfig {
    pub enabled: Option<bool>,
}

impl TrainConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| TrainError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${MODELS_DIR})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| TrainError::ConfigError {
            message: format!("invalid env substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 把設定檔中有寫的欄位覆蓋到預設超參數上
    pub fn apply_to(&self, params: &mut BoostParams) {
        let b = &self.booster;
        if let Some(v) = b.n_estimators {
            params.n_estimators = v;
        }
        if let Some(v) = b.max_depth {
            params.max_depth = v;
        }
        if let Some(v) = b.learning_rate {
            params.learning_rate = v;
        }
        if let Some(v) = b.subsample {
            params.subsample = v;
        }
        if let Some(v) = b.colsample_bytree {
            params.colsample_bytree = v;
        }
        if let Some(v) = b.min_child_weight {
            params.min_child_weight = v;
        }
        if let Some(v) = b.gamma {
            params.gamma = v;
        }
        if let Some(v) = b.reg_alpha {
            params.reg_alpha = v;
        }
        if let Some(v) = b.reg_lambda {
            params.reg_lambda = v;
        }
        if let Some(v) = b.early_stopping_rounds {
            params.early_stopping_rounds = Some(v);
        }
        if let Some(v) = b.random_state {
            params.random_state = v;
        }
        if let Some(v) = b.max_bin {
            params.max_bin = v;
        }
        if let Some(v) = b.base_score {
            params.base_score = v;
        }
        if let Some(v) = b.verbose_every {
            params.verbose_every = v;
        }
    }

    pub fn cv_enabled(&self) -> bool {
        self.cross_validation.enabled.unwrap_or(true)
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.enabled.unwrap_or(false)
    }
}
