use crate::domain::model::{Dataset, TrainingOutcome};
use crate::ml::BoostParams;
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn features_file(&self) -> &str;
    fn models_dir(&self) -> &str;
    /// 已套用設定檔與預設值的超參數
    fn booster_params(&self) -> &BoostParams;
    /// None 時依訓練集類別比例自動計算
    fn scale_pos_weight(&self) -> Option<f64>;
    /// None 表示不做交叉驗證
    fn cv_folds(&self) -> Option<usize>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Dataset>;
    async fn transform(&self, data: Dataset) -> Result<TrainingOutcome>;
    async fn load(&self, outcome: TrainingOutcome) -> Result<String>;
}
