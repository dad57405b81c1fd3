//! Machine Learning Module
//!
//! Regression models over the cleaned daily table:
//! - linear regression on weather + cyclic calendar features (total consumption)
//! - random forest on weather + calendar features (electricity), grid-searched
//!
//! # Architecture
//! - `features`: feature matrices built from a `DailyTable`
//! - `training`: splits, k-fold cross-validation, metrics, grid search
//! - `smartcore`: model wrappers around smartcore estimators
//! - `models`: the prediction trait and the persisted artifact format

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod features;
pub mod models;
pub mod smartcore;
pub mod training;

pub use features::FeatureSet;
pub use models::{load_model, MLModel, ModelArtifact, TrainedModel};

/// ML Model Type
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    clap::ValueEnum,
    strum::Display,
)]
#[strum(serialize_all = "snake_case")]
pub enum ModelType {
    LinearRegression,
    RandomForest,
}

impl ModelType {
    pub fn feature_set(self) -> FeatureSet {
        match self {
            ModelType::LinearRegression => FeatureSet::CyclicWeather,
            ModelType::RandomForest => FeatureSet::CalendarWeather,
        }
    }
}

/// Random forest hyper-parameters, as searched and as persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<u16>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

/// ML Model Metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_id: String,
    pub model_type: ModelType,
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub training_samples: usize,
    pub test_samples: usize,
    pub validation_metrics: ValidationMetrics,
    pub feature_set: FeatureSet,
    pub feature_names: Vec<String>,
    pub target: String,
    /// Per-feature training means; stand-ins for missing inputs.
    pub fill_values: Vec<f64>,
    pub forest_params: Option<ForestParams>,
    /// Best mean cross-validated R² of the grid search, if one ran.
    pub cv_r2: Option<f64>,
    pub last_observed: Option<chrono::NaiveDate>,
}

/// Validation Metrics
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidationMetrics {
    pub mae: f64,  // Mean Absolute Error
    pub rmse: f64, // Root Mean Square Error
    pub mape: f64, // Mean Absolute Percentage Error
    pub r2: f64,   // R-squared
}

impl ValidationMetrics {
    pub fn new(mae: f64, rmse: f64, mape: f64, r2: f64) -> Self {
        Self { mae, rmse, mape, r2 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::ValueEnum;

    #[test]
    fn test_model_type_names() {
        assert_eq!(ModelType::RandomForest.to_string(), "random_forest");
        assert_eq!(
            ModelType::from_str("linear-regression", false).unwrap(),
            ModelType::LinearRegression
        );
    }

    #[test]
    fn test_feature_set_per_model() {
        assert_eq!(ModelType::LinearRegression.feature_set(), FeatureSet::CyclicWeather);
        assert_eq!(ModelType::RandomForest.feature_set(), FeatureSet::CalendarWeather);
    }
}
