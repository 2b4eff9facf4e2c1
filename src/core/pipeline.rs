use crate::core::{ConfigProvider, Dataset, Pipeline, Storage, TrainingOutcome};
use crate::ml::cross_validation::cross_val_accuracy;
use crate::ml::export::{
    ModelExport, NormalizationExport, TrainingReport, BROWSER_NORMALIZATION_FILE, MODEL_FILE,
    NORMALIZATION_FILE, REPORT_FILE,
};
use crate::ml::{BoostParams, EvalSet, EvaluationReport, GradientBoostedClassifier, StandardScaler};
use crate::utils::error::Result;
use std::path::Path;

pub struct TrainingPipeline<S: Storage, C: ConfigProvider> {
    pub(crate) storage: S,
    pub(crate) config: C,
}

impl<S: Storage, C: ConfigProvider> TrainingPipeline<S, C> {
    pub fn new(storage: S, config: C) -> Self {
        Self { storage, config }
    }

    fn artifact_path(&self, file: &str) -> String {
        Path::new(self.config.models_dir())
            .join(file)
            .to_string_lossy()
            .to_string()
    }

    async fn write_json(&self, file: &str, data: &[u8]) -> Result<String> {
        let path = self.artifact_path(file);
        tracing::debug!("Writing {} ({} bytes)", path, data.len());
        self.storage.write_file(&path, data).await?;
        Ok(path)
    }
}

/// Training settings handed to the blocking worker.
#[derive(Debug, Clone)]
pub struct TrainingPlan {
    pub params: BoostParams,
    /// None 時依類別比例自動計算
    pub scale_pos_weight: Option<f64>,
    pub cv_folds: Option<usize>,
}

/// Runs normalize → fit → evaluate → cross-validate on the current thread.
pub fn train_and_evaluate(dataset: Dataset, plan: TrainingPlan) -> Result<TrainingOutcome> {
    tracing::info!("📐 Normalizing features...");
    let scaler = StandardScaler::fit(&dataset.train.features);
    let train_x = scaler.transform(&dataset.train.features);
    let test_x = scaler.transform(&dataset.test.features);

    // 類別權重：DOWN / UP
    let (n_pos, n_neg) = dataset.class_balance();
    let auto_weight = if n_pos > 0 {
        n_neg as f64 / n_pos as f64
    } else {
        1.0
    };
    let mut params = plan.params.clone();
    params.scale_pos_weight = plan.scale_pos_weight.unwrap_or(auto_weight);

    tracing::info!("🚀 Training boosted trees...");
    tracing::debug!("Hyperparameters: {:?}", params);
    let eval_sets = [
        EvalSet {
            name: "train",
            features: train_x.view(),
            labels: dataset.train.labels.view(),
        },
        EvalSet {
            name: "test",
            features: test_x.view(),
            labels: dataset.test.labels.view(),
        },
    ];
    let model = GradientBoostedClassifier::fit(
        params,
        train_x.view(),
        dataset.train.labels.view(),
        &eval_sets,
    )?;

    tracing::info!("⏱️  Training time: {:.1}s", model.training_seconds);
    tracing::info!("   Best iteration: {}", model.best_iteration);
    if let Some(score) = model.best_score {
        tracing::info!("   Best score: {:.4}", score);
    }

    let evaluation = EvaluationReport::evaluate(
        &model,
        test_x.view(),
        &dataset.test.labels,
        &dataset.feature_names,
    );
    if evaluation.classification.auc_roc.is_none() {
        tracing::warn!("Test labels contain a single class, AUC-ROC is undefined");
    }
    evaluation.print_summary();

    let cv = match plan.cv_folds {
        Some(folds) => {
            tracing::info!("🔄 {}-Fold Cross-Validation on training set...", folds);
            // 不使用 early stopping，樹數固定為最佳輪數
            let cv_params = BoostParams {
                n_estimators: model.best_iteration + 1,
                early_stopping_rounds: None,
                scale_pos_weight: 1.0,
                verbose_every: 0,
                ..model.params.clone()
            };
            let summary = cross_val_accuracy(&cv_params, &train_x, &dataset.train.labels, folds)?;
            tracing::info!(
                "   CV Accuracy: {:.2}% ± {:.2}%",
                summary.mean * 100.0,
                summary.std * 100.0
            );
            Some(summary)
        }
        None => {
            tracing::info!("Cross-validation disabled");
            None
        }
    };

    Ok(TrainingOutcome {
        model,
        scaler,
        evaluation,
        cv,
        train_samples: dataset.train.len(),
        test_samples: dataset.test.len(),
        feature_names: dataset.feature_names,
    })
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for TrainingPipeline<S, C> {
    async fn extract(&self) -> Result<Dataset> {
        let path = self.config.features_file();
        tracing::info!("📂 Loading: {}", path);

        let bytes = self.storage.read_file(path).await?;
        let dataset = Dataset::from_json_bytes(&bytes)?;

        let (up, down) = dataset.class_balance();
        let train_n = dataset.train.len() as f64;
        tracing::info!(
            "   Train: {} samples, {} features",
            dataset.train.len(),
            dataset.num_features()
        );
        tracing::info!("   Test:  {} samples", dataset.test.len());
        tracing::info!(
            "   Class balance (train): UP={} ({:.1}%), DOWN={} ({:.1}%)",
            up,
            up as f64 / train_n * 100.0,
            down,
            down as f64 / train_n * 100.0
        );

        Ok(dataset)
    }

    async fn transform(&self, data: Dataset) -> Result<TrainingOutcome> {
        let plan = TrainingPlan {
            params: self.config.booster_params().clone(),
            scale_pos_weight: self.config.scale_pos_weight(),
            cv_folds: self.config.cv_folds(),
        };

        // 訓練是 CPU 密集工作，移到 blocking thread pool
        tokio::task::spawn_blocking(move || train_and_evaluate(data, plan)).await?
    }

    async fn load(&self, outcome: TrainingOutcome) -> Result<String> {
        let now = chrono::Utc::now().to_rfc3339();

        let model_export = ModelExport::new(&outcome.model, &outcome.feature_names, now.clone());
        let model_json = serde_json::to_vec(&model_export)?;
        let model_path = self.write_json(MODEL_FILE, &model_json).await?;
        tracing::info!(
            "💾 Model exported: {} ({:.1} MB)",
            model_path,
            model_json.len() as f64 / 1024.0 / 1024.0
        );

        let norm = NormalizationExport::new(&outcome.scaler, &outcome.feature_names);
        let norm_path = self
            .write_json(NORMALIZATION_FILE, &serde_json::to_vec_pretty(&norm)?)
            .await?;
        tracing::info!("💾 Normalization saved: {}", norm_path);

        let browser_path = self
            .write_json(BROWSER_NORMALIZATION_FILE, &serde_json::to_vec(&norm.browser())?)
            .await?;
        tracing::info!("💾 Browser normalization saved: {}", browser_path);

        let report = TrainingReport::new(
            &outcome.model,
            outcome.evaluation.clone(),
            outcome.cv.as_ref(),
            outcome.train_samples,
            outcome.test_samples,
            now,
        );
        let report_path = self
            .write_json(REPORT_FILE, &serde_json::to_vec_pretty(&report)?)
            .await?;
        tracing::info!("💾 Training report saved: {}", report_path);

        outcome.print_completion_summary();
        Ok(self.config.models_dir().to_string())
    }
}
