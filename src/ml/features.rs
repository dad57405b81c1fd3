//! Feature matrices built from the cleaned daily table.

use std::f64::consts::PI;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::columns::{self, ELECTRICITY, TOTAL_CONSUMPTION};
use crate::domain::DailyTable;
use crate::error::{PipelineError, PipelineResult};

use super::training::TrainingDataset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FeatureSet {
    /// Weather plus sin/cos of day-of-week and month; rows with gaps dropped.
    CyclicWeather,
    /// Weather plus year, month, day, day-of-week; gaps filled with means.
    CalendarWeather,
}

const CYCLIC: [&str; 4] = ["sin_jour", "cos_jour", "sin_mois", "cos_mois"];
const CALENDAR: [&str; 4] = ["annee", "mois", "jour", "jour_semaine"];

impl FeatureSet {
    pub fn target(self) -> &'static str {
        match self {
            FeatureSet::CyclicWeather => TOTAL_CONSUMPTION,
            FeatureSet::CalendarWeather => ELECTRICITY,
        }
    }

    pub fn feature_names(self) -> Vec<String> {
        let calendar = match self {
            FeatureSet::CyclicWeather => CYCLIC,
            FeatureSet::CalendarWeather => CALENDAR,
        };
        columns::weather_columns()
            .iter()
            .chain(calendar.iter())
            .map(|s| s.to_string())
            .collect()
    }

    fn fills_gaps(self) -> bool {
        matches!(self, FeatureSet::CalendarWeather)
    }

    /// One feature row: `weather` in `weather_columns()` order, then the
    /// calendar encoding of `date`.
    pub fn row(self, date: NaiveDate, weather: &[Option<f64>]) -> Vec<Option<f64>> {
        let mut row = weather.to_vec();
        row.extend(self.calendar(date).into_iter().map(Some));
        row
    }

    fn calendar(self, date: NaiveDate) -> [f64; 4] {
        let weekday = date.weekday().num_days_from_monday() as f64;
        let month = date.month() as f64;
        match self {
            FeatureSet::CyclicWeather => [
                (2.0 * PI * weekday / 7.0).sin(),
                (2.0 * PI * weekday / 7.0).cos(),
                (2.0 * PI * month / 12.0).sin(),
                (2.0 * PI * month / 12.0).cos(),
            ],
            FeatureSet::CalendarWeather => [date.year() as f64, month, date.day() as f64, weekday],
        }
    }
}

/// Replace missing entries with the matching fill value.
pub fn fill_row(row: &[Option<f64>], fill_values: &[f64]) -> Vec<f64> {
    row.iter()
        .zip(fill_values)
        .map(|(v, fill)| v.unwrap_or(*fill))
        .collect()
}

fn column_means(rows: &[Vec<Option<f64>>], width: usize) -> Vec<f64> {
    (0..width)
        .map(|j| {
            let (sum, n) = rows
                .iter()
                .filter_map(|r| r[j])
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            if n == 0 {
                0.0
            } else {
                sum / n as f64
            }
        })
        .collect()
}

/// Build `(dataset, fill_values)` for a feature set.
///
/// Rows without a target are skipped. Remaining gaps are filled with the
/// column means or the row is dropped, depending on the feature set.
pub fn build_dataset(table: &DailyTable, set: FeatureSet) -> PipelineResult<(TrainingDataset, Vec<f64>)> {
    let target = table.require_column(set.target())?;
    let weather: Vec<&[Option<f64>]> = columns::weather_columns()
        .iter()
        .map(|name| table.require_column(name))
        .collect::<PipelineResult<_>>()?;

    let mut rows = Vec::new();
    let mut targets = Vec::new();
    let mut dates = Vec::new();
    for (i, date) in table.dates().iter().enumerate() {
        let Some(y) = target[i] else { continue };
        let w: Vec<Option<f64>> = weather.iter().map(|col| col[i]).collect();
        rows.push(set.row(*date, &w));
        targets.push(y);
        dates.push(*date);
    }

    let width = set.feature_names().len();
    let fill_values = column_means(&rows, width);

    let mut x = Vec::with_capacity(rows.len());
    let mut y = Vec::with_capacity(rows.len());
    let mut kept_dates = Vec::with_capacity(rows.len());
    for ((row, target), date) in rows.iter().zip(targets).zip(dates) {
        if set.fills_gaps() {
            x.push(fill_row(row, &fill_values));
        } else if row.iter().all(Option::is_some) {
            x.push(row.iter().flatten().copied().collect());
        } else {
            continue;
        }
        y.push(target);
        kept_dates.push(date);
    }

    debug!(feature_set = %set, rows = x.len(), skipped = table.len() - x.len(), "feature matrix built");
    if x.is_empty() {
        return Err(PipelineError::EmptyResult(format!(
            "no usable rows for target `{}`",
            set.target()
        )));
    }
    Ok((TrainingDataset::new(x, y, kept_dates), fill_values))
}
