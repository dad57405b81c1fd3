//! Prediction trait and the persisted model format.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::smartcore::{SmartcoreLinearRegression, SmartcoreRandomForest};
use super::{FeatureSet, ModelMetadata, ModelType, ValidationMetrics};

/// Trait for ML models
pub trait MLModel: Send + Sync {
    /// Predict one value per feature row
    fn predict_rows(&self, x: &[Vec<f64>]) -> Result<Vec<f64>>;

    /// Get model metadata
    fn metadata(&self) -> &ModelMetadata;

    /// Get model type
    fn model_type(&self) -> ModelType {
        self.metadata().model_type
    }
}

/// A trained model as stored on disk and in the gold bucket: metadata plus
/// the bincode-encoded smartcore estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub metadata: ModelMetadata,
    pub model_bytes: Vec<u8>,
}

impl ModelArtifact {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| anyhow::anyhow!("Failed to serialize model artifact: {}", e))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| anyhow::anyhow!("Failed to deserialize model artifact: {}", e))
    }

    /// `{model_type}.bin`, e.g. `random_forest.bin`.
    pub fn file_name(&self) -> String {
        format!("{}.bin", self.metadata.model_type)
    }

    pub fn save(&self, dir: &Path) -> Result<std::path::PathBuf> {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(self.file_name());
        std::fs::write(&path, self.to_bytes()?).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_bytes(&bytes)
    }
}

#[derive(Debug)]
enum Estimator {
    Linear(SmartcoreLinearRegression),
    Forest(SmartcoreRandomForest),
}

/// A restored estimator together with the metadata it was trained under.
#[derive(Debug)]
pub struct TrainedModel {
    metadata: ModelMetadata,
    estimator: Estimator,
}

impl MLModel for TrainedModel {
    fn predict_rows(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        let expected = self.metadata.feature_names.len();
        if let Some(row) = x.iter().find(|r| r.len() != expected) {
            anyhow::bail!("Feature count mismatch: expected {}, got {}", expected, row.len());
        }
        match &self.estimator {
            Estimator::Linear(m) => m.predict_rows(x),
            Estimator::Forest(m) => m.predict_rows(x),
        }
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

/// Rebuild a predictor from its artifact.
pub fn load_model(artifact: ModelArtifact) -> Result<TrainedModel> {
    let estimator = match artifact.metadata.model_type {
        ModelType::LinearRegression => Estimator::Linear(SmartcoreLinearRegression::from_artifact(&artifact)?),
        ModelType::RandomForest => Estimator::Forest(SmartcoreRandomForest::from_artifact(&artifact)?),
    };
    Ok(TrainedModel {
        metadata: artifact.metadata,
        estimator,
    })
}

pub(crate) fn new_metadata(
    model_type: ModelType,
    feature_set: FeatureSet,
    training_samples: usize,
    test_samples: usize,
    validation_metrics: ValidationMetrics,
    fill_values: Vec<f64>,
    last_observed: Option<NaiveDate>,
) -> ModelMetadata {
    ModelMetadata {
        model_id: format!("{model_type}_{}", uuid::Uuid::new_v4()),
        model_type,
        version: env!("CARGO_PKG_VERSION").to_string(),
        trained_at: chrono::Utc::now(),
        training_samples,
        test_samples,
        validation_metrics,
        feature_set,
        feature_names: feature_set.feature_names(),
        target: feature_set.target().to_string(),
        fill_values,
        forest_params: None,
        cv_r2: None,
        last_observed,
    }
}
