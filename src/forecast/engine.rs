use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ForecastConfig;
use crate::domain::columns;
use crate::domain::DailyTable;
use crate::ml::features::fill_row;
use crate::ml::{MLModel, ModelType};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub above_threshold: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastReport {
    pub model_id: String,
    pub model_type: ModelType,
    pub target: String,
    pub generated_at: DateTime<Utc>,
    pub last_observed: NaiveDate,
    /// Weather assumed for every forecast day, by column.
    pub assumed_weather: Vec<(String, f64)>,
    pub peak_threshold_mw: f64,
    pub points: Vec<ForecastPoint>,
}

impl ForecastReport {
    pub fn peak_days(&self) -> Vec<NaiveDate> {
        self.points
            .iter()
            .filter(|p| p.above_threshold)
            .map(|p| p.date)
            .collect()
    }

    pub fn peak_count(&self) -> usize {
        self.points.iter().filter(|p| p.above_threshold).count()
    }
}

/// Short-horizon forecaster: calendar features come from the forecast
/// dates, weather is held at the mean of the most recent observed days.
pub struct ForecastEngine {
    model: Box<dyn MLModel>,
    cfg: ForecastConfig,
}

impl ForecastEngine {
    pub fn new(model: Box<dyn MLModel>, cfg: ForecastConfig) -> Self {
        Self { model, cfg }
    }

    /// Mean of each weather column over the last `weather_window_days` rows.
    /// A column with no observation in the window falls back to its training
    /// mean.
    pub fn assumed_weather(&self, table: &DailyTable) -> Result<Vec<f64>> {
        let window = self.cfg.weather_window_days.max(1);
        let start = table.len().saturating_sub(window);
        let fill = &self.model.metadata().fill_values;
        columns::weather_columns()
            .iter()
            .enumerate()
            .map(|(j, name)| -> Result<f64> {
                let values = table.require_column(name)?;
                let (sum, n) = values[start..]
                    .iter()
                    .flatten()
                    .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
                if n > 0 {
                    Ok(sum / n as f64)
                } else {
                    warn!(column = *name, "no recent observation, using training mean");
                    Ok(fill.get(j).copied().unwrap_or(0.0))
                }
            })
            .collect()
    }

    pub fn forecast(&self, table: &DailyTable) -> Result<ForecastReport> {
        let metadata = self.model.metadata();
        let last_observed = table.last_date().context("cannot forecast from an empty table")?;
        let weather = self.assumed_weather(table)?;
        let weather_opt: Vec<Option<f64>> = weather.iter().copied().map(Some).collect();

        let dates: Vec<NaiveDate> = (1..=self.cfg.horizon_days as i64)
            .map(|d| last_observed + Duration::days(d))
            .collect();
        let x: Vec<Vec<f64>> = dates
            .iter()
            .map(|date| fill_row(&metadata.feature_set.row(*date, &weather_opt), &metadata.fill_values))
            .collect();
        let predictions = self.model.predict_rows(&x)?;

        let threshold = self.cfg.peak_threshold_mw;
        let points: Vec<ForecastPoint> = dates
            .into_iter()
            .zip(predictions)
            .map(|(date, value)| ForecastPoint {
                date,
                value,
                above_threshold: value > threshold,
            })
            .collect();

        let report = ForecastReport {
            model_id: metadata.model_id.clone(),
            model_type: metadata.model_type,
            target: metadata.target.clone(),
            generated_at: Utc::now(),
            last_observed,
            assumed_weather: columns::weather_columns()
                .iter()
                .map(|s| s.to_string())
                .zip(weather)
                .collect(),
            peak_threshold_mw: threshold,
            points,
        };

        let peaks = report.peak_count();
        if peaks > 0 {
            warn!(
                days = peaks,
                threshold_mw = threshold,
                first = ?report.peak_days().first(),
                "consumption peak expected"
            );
        }
        info!(
            model = %report.model_id,
            horizon = report.points.len(),
            from = %last_observed,
            "forecast computed"
        );
        Ok(report)
    }
}
