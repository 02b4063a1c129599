use std::sync::Arc;

use tracing::{debug, error};

use crate::batch::{self, BatchOutcome};
use crate::dataset::DatasetCatalog;
use crate::error::{ServiceError, ServiceResult};
use crate::inference::{confidence_score, grade_and_level, round2};
use crate::models::{ModelInfo, PredictionRequest, PredictionResult, ServiceStatus};
use crate::recommend::RecommendationEngine;
use crate::registry::ModelRegistry;
use crate::stats::{self, DatasetStats};

pub const SERVICE_NAME: &str = "Student Performance Prediction";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Transport-neutral serving boundary over the active model.
pub struct PredictionService {
    registry: Arc<ModelRegistry>,
    recommender: RecommendationEngine,
    catalog: DatasetCatalog,
}

impl PredictionService {
    pub fn new(
        registry: Arc<ModelRegistry>,
        recommender: RecommendationEngine,
        catalog: DatasetCatalog,
    ) -> Self {
        Self {
            registry,
            recommender,
            catalog,
        }
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            service: SERVICE_NAME,
            version: VERSION,
            model_loaded: self.registry.is_ready(),
        }
    }

    pub async fn predict(&self, request: PredictionRequest) -> ServiceResult<PredictionResult> {
        let artifact = self.registry.require()?;
        request.validate()?;
        let request = request.normalized();

        let raw = artifact
            .predict(&[request.features()])
            .map_err(|err| {
                error!(error = %err, "prediction failed");
                ServiceError::Prediction(err)
            })?
            .first()
            .copied()
            .ok_or_else(|| ServiceError::Prediction("model returned no prediction".into()))?;
        let (grade, level) = grade_and_level(raw);
        let confidence = confidence_score(artifact.metrics().rmse, &request);
        debug!(raw, grade, level = %level, confidence, "scored request");

        let recommendations = self.recommender.recommend(&request, grade, level).await;
        Ok(PredictionResult {
            predicted_grade: round2(grade),
            performance_level: level,
            confidence_score: confidence,
            model_used: artifact.model_name().to_string(),
            recommendations,
        })
    }

    pub fn model_info(&self) -> ServiceResult<ModelInfo> {
        Ok(self.registry.require()?.info())
    }

    pub fn batch_predict(
        &self,
        source: &str,
        save: bool,
        limit: Option<usize>,
    ) -> ServiceResult<BatchOutcome> {
        let artifact = self.registry.require()?;
        batch::run(&artifact, &self.catalog, source, save, limit)
    }

    pub fn dataset_stats(&self) -> ServiceResult<DatasetStats> {
        stats::collect(&self.catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::inference::performance_level;
    use crate::models::PerformanceLevel;
    use crate::recommend::NullProvider;
    use crate::training::tests::{small_config, synthetic_records};
    use crate::training::train;
    use std::time::Duration;

    fn service(trained: bool) -> PredictionService {
        let registry = Arc::new(ModelRegistry::new());
        if trained {
            registry.install(train(&synthetic_records(60), &small_config()).unwrap());
        }
        PredictionService::new(
            registry,
            RecommendationEngine::new(Arc::new(NullProvider), Duration::from_secs(1)),
            DatasetCatalog::new(std::env::temp_dir().join("student-performance-missing")),
        )
    }

    fn request() -> PredictionRequest {
        PredictionRequest {
            age: 17,
            gender: "Female".into(),
            study_time_hours: 0.5,
            absences: 15,
            parental_education: "college".into(),
            previous_grade: 55.0,
            extracurricular: " No".into(),
            sleep_hours: 5.0,
        }
    }

    #[tokio::test]
    async fn untrained_service_is_unavailable() {
        let service = service(false);
        assert!(!service.status().model_loaded);
        let err = service.predict(request()).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::ServiceUnavailable);
        assert!(matches!(service.model_info(), Err(ServiceError::ModelNotReady)));
        assert!(matches!(
            service.batch_predict("all", false, None),
            Err(ServiceError::ModelNotReady)
        ));
    }

    #[tokio::test]
    async fn predicts_with_level_confidence_and_rules() {
        let service = service(true);
        assert!(service.status().model_loaded);
        let result = service.predict(request()).await.unwrap();
        assert!((0.0..=100.0).contains(&result.predicted_grade));
        // level comes from the unrounded grade, at most 0.005 away
        let level = result.performance_level;
        assert!(
            performance_level(result.predicted_grade - 0.005) == level
                || performance_level(result.predicted_grade + 0.005) == level
        );
        assert!((0.5..=0.95).contains(&result.confidence_score));
        assert!(result.model_used == "Random Forest" || result.model_used == "Gradient Boosting");
        assert!(result.recommendations.len() >= 5);
        assert_eq!(
            result.recommendations[0],
            "Increase daily study time to at least 2-3 hours."
        );
        if result.performance_level != PerformanceLevel::AtRisk && result.predicted_grade >= 70.0 {
            assert!(!result.recommendations.iter().any(|r| r.starts_with("Meet advisors")));
        }
    }

    #[tokio::test]
    async fn malformed_requests_are_client_errors() {
        let service = service(true);
        let mut bad = request();
        bad.previous_grade = 140.0;
        let err = service.predict(bad).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Client);
    }

    #[test]
    fn model_info_lists_features() {
        let info = service(true).model_info().unwrap();
        assert_eq!(info.features[0], "age");
        assert_eq!(info.metrics.test_samples, 12);
    }
}
