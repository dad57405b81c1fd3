//! SmartCore ML Model Wrappers
//!
//! Linear regression (QR solver) and random forest regressors over dense
//! row-major feature matrices, persisted with bincode.

use anyhow::Result;
use smartcore::ensemble::random_forest_regressor::{RandomForestRegressor, RandomForestRegressorParameters};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::linear_regression::{
    LinearRegression, LinearRegressionParameters, LinearRegressionSolverName,
};

use super::models::ModelArtifact;
use super::{ForestParams, ModelMetadata, ModelType};

type Linear = LinearRegression<f64, f64, DenseMatrix<f64>, Vec<f64>>;
type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Convert feature rows to a row-major `DenseMatrix`.
fn to_matrix(x: &[Vec<f64>]) -> Result<DenseMatrix<f64>> {
    let n_samples = x.len();
    let n_features = x.first().map(Vec::len).unwrap_or(0);
    if n_samples == 0 || n_features == 0 {
        anyhow::bail!("Cannot build a matrix from an empty dataset");
    }

    let mut flat_data = Vec::with_capacity(n_samples * n_features);
    for row in x {
        if row.len() != n_features {
            anyhow::bail!("All feature vectors must have the same length");
        }
        flat_data.extend_from_slice(row);
    }
    Ok(DenseMatrix::new(n_samples, n_features, flat_data, false))
}

fn check_training_set(x: &[Vec<f64>], y: &[f64]) -> Result<()> {
    if x.is_empty() || y.is_empty() {
        anyhow::bail!("Cannot train on empty dataset");
    }
    if x.len() != y.len() {
        anyhow::bail!(
            "Feature and target count mismatch: {} features, {} targets",
            x.len(),
            y.len()
        );
    }
    Ok(())
}

fn expect_type(artifact: &ModelArtifact, expected: ModelType) -> Result<()> {
    if artifact.metadata.model_type != expected {
        anyhow::bail!(
            "Artifact holds a {} model, expected {}",
            artifact.metadata.model_type,
            expected
        );
    }
    Ok(())
}

/// Ordinary least squares through smartcore's QR solver.
#[derive(Debug)]
pub struct SmartcoreLinearRegression {
    model: Linear,
}

impl SmartcoreLinearRegression {
    pub fn fit(x: &[Vec<f64>], y: &[f64]) -> Result<Self> {
        check_training_set(x, y)?;
        let x_matrix = to_matrix(x)?;
        let params = LinearRegressionParameters::default().with_solver(LinearRegressionSolverName::QR);
        let model = LinearRegression::fit(&x_matrix, &y.to_vec(), params)
            .map_err(|e| anyhow::anyhow!("LinearRegression training failed: {:?}", e))?;
        Ok(Self { model })
    }

    pub fn into_artifact(self, metadata: ModelMetadata) -> Result<ModelArtifact> {
        let model_bytes = bincode::serialize(&self.model)
            .map_err(|e| anyhow::anyhow!("Failed to serialize model: {}", e))?;
        Ok(ModelArtifact { metadata, model_bytes })
    }

    pub fn from_artifact(artifact: &ModelArtifact) -> Result<Self> {
        expect_type(artifact, ModelType::LinearRegression)?;
        let model: Linear = bincode::deserialize(&artifact.model_bytes)
            .map_err(|e| anyhow::anyhow!("Failed to deserialize model: {}", e))?;
        Ok(Self { model })
    }

    pub fn predict_rows(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        let x = to_matrix(x)?;
        self.model
            .predict(&x)
            .map_err(|e| anyhow::anyhow!("Prediction failed: {:?}", e))
    }
}

/// Random forest regressor.
#[derive(Debug)]
pub struct SmartcoreRandomForest {
    model: Forest,
    pub params: ForestParams,
}

impl SmartcoreRandomForest {
    pub fn parameters(params: ForestParams, seed: u64) -> RandomForestRegressorParameters {
        RandomForestRegressorParameters {
            max_depth: params.max_depth,
            min_samples_leaf: params.min_samples_leaf,
            min_samples_split: params.min_samples_split,
            n_trees: params.n_trees,
            m: None, // Use sqrt(n_features) by default
            keep_samples: false, // Don't store training samples (saves memory)
            seed,
        }
    }

    pub fn fit(x: &[Vec<f64>], y: &[f64], params: ForestParams, seed: u64) -> Result<Self> {
        check_training_set(x, y)?;
        let x_matrix = to_matrix(x)?;
        let model = RandomForestRegressor::fit(&x_matrix, &y.to_vec(), Self::parameters(params, seed))
            .map_err(|e| anyhow::anyhow!("RandomForest training failed: {:?}", e))?;
        Ok(Self { model, params })
    }

    pub fn into_artifact(self, metadata: ModelMetadata) -> Result<ModelArtifact> {
        let model_bytes = bincode::serialize(&self.model)
            .map_err(|e| anyhow::anyhow!("Failed to serialize model: {}", e))?;
        Ok(ModelArtifact { metadata, model_bytes })
    }

    pub fn from_artifact(artifact: &ModelArtifact) -> Result<Self> {
        expect_type(artifact, ModelType::RandomForest)?;
        let params = artifact
            .metadata
            .forest_params
            .ok_or_else(|| anyhow::anyhow!("Random forest artifact has no parameters"))?;
        let model: Forest = bincode::deserialize(&artifact.model_bytes)
            .map_err(|e| anyhow::anyhow!("Failed to deserialize model: {}", e))?;
        Ok(Self { model, params })
    }

    pub fn predict_rows(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        let x = to_matrix(x)?;
        self.model
            .predict(&x)
            .map_err(|e| anyhow::anyhow!("Prediction failed: {:?}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::models::{load_model, new_metadata, MLModel};
    use crate::ml::{FeatureSet, ValidationMetrics};

    fn plane() -> (Vec<Vec<f64>>, Vec<f64>) {
        // y = 2*x1 + 3*x2 + 1 on a small non-degenerate grid.
        let x: Vec<Vec<f64>> = (0..12)
            .map(|i| vec![(i % 4) as f64, ((i * 5) % 7) as f64])
            .collect();
        let y = x.iter().map(|r| 2.0 * r[0] + 3.0 * r[1] + 1.0).collect();
        (x, y)
    }

    #[test]
    fn test_linear_regression_recovers_plane() {
        let (x, y) = plane();
        let model = SmartcoreLinearRegression::fit(&x, &y).unwrap();
        let pred = model.predict_rows(&[vec![1.0, 1.0]]).unwrap();
        assert!((pred[0] - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_random_forest_predicts_in_range() {
        let (x, y) = plane();
        let params = ForestParams {
            n_trees: 10,
            max_depth: Some(5),
            min_samples_split: 2,
            min_samples_leaf: 1,
        };
        let model = SmartcoreRandomForest::fit(&x, &y, params, 42).unwrap();
        let pred = model.predict_rows(&x).unwrap();
        assert_eq!(pred.len(), x.len());
        let (lo, hi) = (1.0, 2.0 * 3.0 + 3.0 * 6.0 + 1.0);
        assert!(pred.iter().all(|p| *p >= lo && *p <= hi));
    }

    #[test]
    fn test_mismatched_training_set_is_rejected() {
        assert!(SmartcoreLinearRegression::fit(&[vec![1.0]], &[1.0, 2.0]).is_err());
        assert!(to_matrix(&[vec![1.0, 2.0], vec![3.0]]).is_err());
    }

    #[test]
    fn test_artifact_restores_predictions() {
        let (x, y) = plane();
        let fitted = SmartcoreLinearRegression::fit(&x, &y).unwrap();
        let expected = fitted.predict_rows(&x).unwrap();
        let mut metadata = new_metadata(
            ModelType::LinearRegression,
            FeatureSet::CyclicWeather,
            x.len(),
            0,
            ValidationMetrics::default(),
            Vec::new(),
            None,
        );
        // Two synthetic features instead of the full weather set.
        metadata.feature_names = vec!["x1".to_string(), "x2".to_string()];
        let artifact = fitted.into_artifact(metadata).unwrap();

        let restored = load_model(artifact).unwrap();
        assert_eq!(restored.model_type(), ModelType::LinearRegression);
        assert_eq!(restored.predict_rows(&x).unwrap(), expected);
        assert!(restored.predict_rows(&[vec![1.0, 2.0, 3.0]]).is_err());
    }

    #[test]
    fn test_artifact_type_is_checked() {
        let (x, y) = plane();
        let fitted = SmartcoreLinearRegression::fit(&x, &y).unwrap();
        let metadata = new_metadata(
            ModelType::RandomForest,
            FeatureSet::CalendarWeather,
            x.len(),
            0,
            ValidationMetrics::default(),
            Vec::new(),
            None,
        );
        let artifact = fitted.into_artifact(metadata).unwrap();
        assert!(SmartcoreLinearRegression::from_artifact(&artifact).is_err());
    }
}
