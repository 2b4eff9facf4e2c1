use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    TaskError(#[from] tokio::task::JoinError),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Config validation failed on {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Dataset error: {message}")]
    DatasetError { message: String },

    #[error("Training error: {message}")]
    TrainingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Data,
    Training,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl TrainError {
    pub fn dataset(message: impl Into<String>) -> Self {
        Self::DatasetError {
            message: message.into(),
        }
    }

    pub fn training(message: impl Into<String>) -> Self {
        Self::TrainingError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => ErrorCategory::Configuration,
            Self::SerializationError(_) | Self::DatasetError { .. } => ErrorCategory::Data,
            Self::TrainingError { .. } => ErrorCategory::Training,
            Self::IoError(_) | Self::TaskError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Configuration | ErrorCategory::Data => ErrorSeverity::High,
            ErrorCategory::Training => ErrorSeverity::Medium,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// 程序結束碼，依嚴重程度決定 (Low 視為成功)
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::IoError(_) => "檢查檔案路徑與 models 目錄的寫入權限",
            Self::SerializationError(_) => {
                "確認特徵檔為合法 JSON，並包含 trainFeatures/trainLabels/testFeatures/testLabels"
            }
            Self::TaskError(_) => "訓練執行緒異常結束，請以 -v 重新執行查看詳細日誌",
            Self::ConfigError { .. } | Self::ConfigValidationError { .. } => {
                "檢查 TOML 設定檔格式與欄位名稱"
            }
            Self::MissingConfigError { .. } => "Usage: boost-train <features-file.json>",
            Self::InvalidConfigValueError { .. } => "調整超參數至允許範圍內",
            Self::DatasetError { .. } => "重新產生特徵檔，確認每列特徵數一致且標籤為 0/1",
            Self::TrainingError { .. } => "檢查資料集是否同時包含 UP 與 DOWN 樣本，或調整超參數",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::MissingConfigError { field } => format!("Missing argument: {}", field),
            Self::IoError(e) => format!("File operation failed: {}", e),
            Self::SerializationError(e) => format!("Could not parse JSON: {}", e),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TrainError>;
