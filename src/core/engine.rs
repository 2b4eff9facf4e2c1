use crate::core::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

pub struct TrainingEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> TrainingEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    /// 載入特徵 → 訓練與評估 → 匯出模型，回傳輸出目錄
    pub async fn run(&self) -> Result<String> {
        println!("{}", "=".repeat(50));
        println!("🧠 Boosted-Tree Direction Model Training");
        println!("{}", "=".repeat(50));
        self.monitor.log_stats("Start");

        let dataset = self.pipeline.extract().await?;
        tracing::info!(
            "Loaded {} train / {} test samples",
            dataset.train.len(),
            dataset.test.len()
        );
        self.monitor.log_stats("Load features");

        let outcome = self.pipeline.transform(dataset).await?;
        tracing::info!(
            "Trained {} trees (best iteration {})",
            outcome.model.trees.len(),
            outcome.model.best_iteration
        );
        self.monitor.log_stats("Train & evaluate");

        let models_dir = self.pipeline.load(outcome).await?;
        tracing::info!("Artifacts written to: {}", models_dir);
        self.monitor.log_stats("Export");

        self.monitor.log_final_stats();
        Ok(models_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Dataset, TrainingOutcome};
    use crate::domain::model::Split;
    use crate::ml::{BoostParams, EvaluationReport, GradientBoostedClassifier, StandardScaler};
    use crate::utils::error::TrainError;
    use ndarray::array;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPipeline {
        loads: AtomicUsize,
        fail_transform: bool,
    }

    fn tiny_dataset() -> Dataset {
        let split = Split::new(array![[0.0], [1.0], [2.0], [3.0]], array![0.0, 0.0, 1.0, 1.0]);
        Dataset::new(split.clone(), split, None).unwrap()
    }

    #[async_trait::async_trait]
    impl Pipeline for CountingPipeline {
        async fn extract(&self) -> Result<Dataset> {
            Ok(tiny_dataset())
        }

        async fn transform(&self, data: Dataset) -> Result<TrainingOutcome> {
            if self.fail_transform {
                return Err(TrainError::training("boom"));
            }
            let params = BoostParams {
                n_estimators: 3,
                min_child_weight: 0.0,
                verbose_every: 0,
                ..BoostParams::default()
            };
            let model = GradientBoostedClassifier::fit(
                params,
                data.train.features.view(),
                data.train.labels.view(),
                &[],
            )?;
            let evaluation = EvaluationReport::evaluate(
                &model,
                data.test.features.view(),
                &data.test.labels,
                &data.feature_names,
            );
            Ok(TrainingOutcome {
                scaler: StandardScaler::fit(&data.train.features),
                model,
                evaluation,
                cv: None,
                train_samples: data.train.len(),
                test_samples: data.test.len(),
                feature_names: data.feature_names,
            })
        }

        async fn load(&self, _outcome: TrainingOutcome) -> Result<String> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok("models".to_string())
        }
    }

    #[tokio::test]
    async fn test_run_executes_all_phases() {
        let engine = TrainingEngine::new(CountingPipeline {
            loads: AtomicUsize::new(0),
            fail_transform: false,
        });
        let dir = engine.run().await.unwrap();
        assert_eq!(dir, "models");
        assert_eq!(engine.pipeline.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transform_failure_skips_load() {
        let engine = TrainingEngine::new_with_monitoring(
            CountingPipeline {
                loads: AtomicUsize::new(0),
                fail_transform: true,
            },
            true,
        );
        let err = engine.run().await.unwrap_err();
        assert!(matches!(err, TrainError::TrainingError { .. }));
        assert_eq!(engine.pipeline.loads.load(Ordering::SeqCst), 0);
    }
}
