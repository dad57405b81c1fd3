//! ML Model Training Pipeline
//!
//! Dataset splits, k-fold cross-validation, validation metrics and the
//! end-to-end `train_model` entry point.

use anyhow::Result;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::features::build_dataset;
use super::smartcore::{SmartcoreLinearRegression, SmartcoreRandomForest};
use super::{ForestParams, ModelArtifact, ModelType, ValidationMetrics};
use crate::config::{ForestGrid, TrainingConfig};
use crate::domain::DailyTable;

/// Training Dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingDataset {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<f64>,
    pub dates: Vec<NaiveDate>,
}

impl TrainingDataset {
    pub fn new(x: Vec<Vec<f64>>, y: Vec<f64>, dates: Vec<NaiveDate>) -> Self {
        Self { x, y, dates }
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn select(&self, idx: &[usize]) -> TrainingDataset {
        TrainingDataset {
            x: idx.iter().map(|&i| self.x[i].clone()).collect(),
            y: idx.iter().map(|&i| self.y[i]).collect(),
            dates: idx.iter().map(|&i| self.dates[i]).collect(),
        }
    }

    /// Hold out the last `test_fraction` of rows (rounded up), keeping order.
    pub fn split_chronological(&self, test_fraction: f64) -> Result<(TrainingDataset, TrainingDataset)> {
        let n_train = train_size(self.len(), test_fraction)?;
        let idx: Vec<usize> = (0..self.len()).collect();
        Ok((self.select(&idx[..n_train]), self.select(&idx[n_train..])))
    }

    /// Seeded shuffle, then hold out `test_fraction` of rows (rounded up).
    pub fn split_shuffled(
        &self,
        test_fraction: f64,
        seed: u64,
    ) -> Result<(TrainingDataset, TrainingDataset)> {
        let n_train = train_size(self.len(), test_fraction)?;
        let mut idx: Vec<usize> = (0..self.len()).collect();
        idx.shuffle(&mut StdRng::seed_from_u64(seed));
        let (train, test) = idx.split_at(n_train);
        Ok((self.select(train), self.select(test)))
    }
}

fn train_size(n: usize, test_fraction: f64) -> Result<usize> {
    if test_fraction <= 0.0 || test_fraction >= 1.0 {
        anyhow::bail!("Test fraction must be between 0 and 1");
    }
    let n_test = (n as f64 * test_fraction).ceil() as usize;
    if n_test == 0 || n_test >= n {
        anyhow::bail!("Dataset of {n} rows is too small to hold out {test_fraction}");
    }
    Ok(n - n_test)
}

/// Contiguous folds; the first `n % k` folds get one extra row.
pub fn kfold_indices(n: usize, k: usize) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
    if k < 2 || k > n {
        anyhow::bail!("Cannot make {k} folds from {n} rows");
    }
    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for fold in 0..k {
        let size = n / k + usize::from(fold < n % k);
        let test: Vec<usize> = (start..start + size).collect();
        let train: Vec<usize> = (0..start).chain(start + size..n).collect();
        folds.push((train, test));
        start += size;
    }
    Ok(folds)
}

/// Calculate validation metrics
pub fn calculate_metrics(predictions: &[f64], targets: &[f64]) -> Result<ValidationMetrics> {
    if predictions.len() != targets.len() {
        anyhow::bail!("Prediction and target count mismatch");
    }

    if predictions.is_empty() {
        anyhow::bail!("No predictions to evaluate");
    }

    let n = predictions.len() as f64;

    // Mean Absolute Error
    let mae: f64 = predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (p - t).abs())
        .sum::<f64>()
        / n;

    // Root Mean Square Error
    let mse: f64 = predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (p - t).powi(2))
        .sum::<f64>()
        / n;
    let rmse = mse.sqrt();

    // Mean Absolute Percentage Error, over non-zero targets only
    let (pct_sum, pct_n) = predictions
        .iter()
        .zip(targets.iter())
        .filter(|(_, t)| t.abs() > 1e-10)
        .fold((0.0, 0usize), |(s, c), (p, t)| (s + ((p - t) / t).abs() * 100.0, c + 1));
    let mape = if pct_n == 0 { 0.0 } else { pct_sum / pct_n as f64 };

    // R-squared
    let mean_target: f64 = targets.iter().sum::<f64>() / n;
    let ss_tot: f64 = targets.iter().map(|t| (t - mean_target).powi(2)).sum();
    let ss_res: f64 = predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (t - p).powi(2))
        .sum();

    let r2 = if ss_tot.abs() < 1e-10 {
        0.0
    } else {
        1.0 - (ss_res / ss_tot)
    };

    Ok(ValidationMetrics::new(mae, rmse, mape, r2))
}

/// Every combination of the grid, in a stable order.
pub fn expand_grid(grid: &ForestGrid) -> Vec<ForestParams> {
    let mut out = Vec::new();
    for &n_trees in &grid.n_trees {
        for &max_depth in &grid.max_depth {
            for &min_samples_split in &grid.min_samples_split {
                for &min_samples_leaf in &grid.min_samples_leaf {
                    out.push(ForestParams {
                        n_trees,
                        max_depth: (max_depth > 0).then_some(max_depth),
                        min_samples_split,
                        min_samples_leaf,
                    });
                }
            }
        }
    }
    out
}

/// Mean R² of `params` over `folds` contiguous folds of `data`.
pub fn cross_validate(data: &TrainingDataset, params: ForestParams, folds: usize, seed: u64) -> Result<f64> {
    let mut total = 0.0;
    let splits = kfold_indices(data.len(), folds)?;
    for (train_idx, test_idx) in &splits {
        let train = data.select(train_idx);
        let test = data.select(test_idx);
        let model = SmartcoreRandomForest::fit(&train.x, &train.y, params, seed)?;
        let predictions = model.predict_rows(&test.x)?;
        total += calculate_metrics(&predictions, &test.y)?.r2;
    }
    Ok(total / splits.len() as f64)
}

/// Exhaustive search; ties keep the earlier combination.
pub fn grid_search(
    data: &TrainingDataset,
    grid: &ForestGrid,
    folds: usize,
    seed: u64,
) -> Result<(ForestParams, f64)> {
    let mut best: Option<(ForestParams, f64)> = None;
    for params in expand_grid(grid) {
        let score = cross_validate(data, params, folds, seed)?;
        debug!(?params, cv_r2 = score, "grid candidate scored");
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((params, score));
        }
    }
    best.ok_or_else(|| anyhow::anyhow!("Empty hyper-parameter grid"))
}

/// Outcome of a training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub model_id: String,
    pub model_type: ModelType,
    pub target: String,
    pub train_rows: usize,
    pub test_rows: usize,
    pub metrics: ValidationMetrics,
    pub forest_params: Option<ForestParams>,
    pub cv_r2: Option<f64>,
}

/// Build features, split, fit, evaluate on the held-out rows and package the
/// model for persistence.
pub fn train_model(
    table: &DailyTable,
    model_type: ModelType,
    cfg: &TrainingConfig,
) -> Result<(ModelArtifact, TrainingReport)> {
    let feature_set = model_type.feature_set();
    let (data, fill_values) = build_dataset(table, feature_set)?;

    let artifact = match model_type {
        ModelType::LinearRegression => {
            let (train, test) = data.split_chronological(cfg.test_fraction)?;
            let model = SmartcoreLinearRegression::fit(&train.x, &train.y)?;
            let metrics = calculate_metrics(&model.predict_rows(&test.x)?, &test.y)?;
            let metadata = super::models::new_metadata(
                model_type,
                feature_set,
                train.len(),
                test.len(),
                metrics,
                fill_values,
                table.last_date(),
            );
            info!(rows = train.len(), held_out = test.len(), r2 = metrics.r2, "linear model trained");
            model.into_artifact(metadata)?
        }
        ModelType::RandomForest => {
            let (train, test) = data.split_shuffled(cfg.test_fraction, cfg.seed)?;
            let (params, cv_r2) = grid_search(&train, &cfg.forest_grid, cfg.cv_folds, cfg.seed)?;
            info!(?params, cv_r2, "best forest parameters");
            let model = SmartcoreRandomForest::fit(&train.x, &train.y, params, cfg.seed)?;
            let metrics = calculate_metrics(&model.predict_rows(&test.x)?, &test.y)?;
            let mut metadata = super::models::new_metadata(
                model_type,
                feature_set,
                train.len(),
                test.len(),
                metrics,
                fill_values,
                table.last_date(),
            );
            metadata.forest_params = Some(params);
            metadata.cv_r2 = Some(cv_r2);
            info!(rows = train.len(), held_out = test.len(), r2 = metrics.r2, "random forest trained");
            model.into_artifact(metadata)?
        }
    };

    let report = TrainingReport {
        model_id: artifact.metadata.model_id.clone(),
        model_type,
        target: artifact.metadata.target.clone(),
        train_rows: artifact.metadata.training_samples,
        test_rows: artifact.metadata.test_samples,
        metrics: artifact.metadata.validation_metrics,
        forest_params: artifact.metadata.forest_params,
        cv_r2: artifact.metadata.cv_r2,
    };
    Ok((artifact, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn dataset(n: usize) -> TrainingDataset {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        TrainingDataset::new(
            (0..n).map(|i| vec![i as f64]).collect(),
            (0..n).map(|i| 2.0 * i as f64 + 1.0).collect(),
            (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect(),
        )
    }

    #[test]
    fn test_chronological_split_holds_out_the_tail() {
        let (train, test) = dataset(10).split_chronological(0.2).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(test.y, vec![17.0, 19.0]);
        assert!(train.dates.last().unwrap() < test.dates.first().unwrap());
    }

    #[test]
    fn test_test_size_rounds_up() {
        let (train, test) = dataset(11).split_chronological(0.2).unwrap();
        assert_eq!((train.len(), test.len()), (8, 3));
    }

    #[test]
    fn test_shuffled_split_is_seeded_and_complete() {
        let data = dataset(20);
        let (a_train, a_test) = data.split_shuffled(0.2, 42).unwrap();
        let (b_train, _) = data.split_shuffled(0.2, 42).unwrap();
        assert_eq!(a_train.y, b_train.y);
        let mut all: Vec<f64> = a_train.y.iter().chain(a_test.y.iter()).copied().collect();
        all.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(all, data.y);
    }

    #[test]
    fn test_split_rejects_tiny_dataset() {
        assert!(dataset(1).split_chronological(0.2).is_err());
        assert!(dataset(10).split_chronological(1.0).is_err());
    }

    #[rstest]
    #[case(10, 3, vec![4, 3, 3])]
    #[case(9, 3, vec![3, 3, 3])]
    #[case(5, 5, vec![1, 1, 1, 1, 1])]
    fn test_kfold_sizes(#[case] n: usize, #[case] k: usize, #[case] sizes: Vec<usize>) {
        let folds = kfold_indices(n, k).unwrap();
        assert_eq!(folds.iter().map(|(_, t)| t.len()).collect::<Vec<_>>(), sizes);
        for (train, test) in &folds {
            assert_eq!(train.len() + test.len(), n);
            assert!(test.iter().all(|i| !train.contains(i)));
        }
    }

    #[test]
    fn test_calculate_metrics() {
        let predictions = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let targets = vec![1.1, 2.1, 2.9, 4.2, 4.8];

        let metrics = calculate_metrics(&predictions, &targets).unwrap();

        assert!(metrics.mae < 0.3);
        assert!(metrics.rmse < 0.4);
        assert!(metrics.r2 > 0.9);
    }

    #[test]
    fn test_mape_ignores_zero_targets() {
        let metrics = calculate_metrics(&[1.0, 110.0], &[0.0, 100.0]).unwrap();
        assert!((metrics.mape - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_expand_default_grid() {
        let grid = expand_grid(&ForestGrid::default());
        assert_eq!(grid.len(), 24);
        assert_eq!(grid[0].max_depth, Some(10));
        assert!(grid.iter().any(|p| p.max_depth.is_none()));
    }
}
