//! Cleaning core.
//!
//! Pure table-in/table-out transformations:
//! - consumption records -> daily consumption series (`consumption`)
//! - weather records -> daily weather series (`weather`)
//! - inner join on date (`join`)
//! - optional lag/rolling features (`lags`)
//!
//! Nothing here touches files, the network or the object store.

use chrono_tz::Tz;
use tracing::info;

use crate::domain::{DailyTable, RawTable};
use crate::error::{PipelineError, PipelineResult};

pub mod consumption;
pub mod join;
pub mod lags;
pub mod weather;

pub use consumption::*;
pub use join::*;
pub use lags::*;
pub use weather::*;

/// Everything the cleaning core needs besides the raw tables.
#[derive(Debug, Clone)]
pub struct CleanOptions {
    pub timezone: Tz,
    pub weather: WeatherOptions,
    pub add_lag_features: bool,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Europe::Paris,
            weather: WeatherOptions::default(),
            add_lag_features: false,
        }
    }
}

/// Run both normalizers, join, and optionally augment.
///
/// An empty final table is reported as `EmptyResult` so that it is never
/// persisted silently.
pub fn clean_and_merge(
    consumption: &RawTable,
    weather: &RawTable,
    opts: &CleanOptions,
) -> PipelineResult<DailyTable> {
    let daily_consumption = normalize_consumption(consumption, opts.timezone)?;
    let daily_weather = normalize_weather(weather, &opts.weather)?;

    let merged = merge_series(&daily_consumption, &daily_weather)?;
    let table = if opts.add_lag_features {
        add_lag_features(&merged)?
    } else {
        merged
    };

    if table.is_empty() {
        return Err(PipelineError::EmptyResult(format!(
            "no rows left after join{} ({} consumption days, {} weather days)",
            if opts.add_lag_features { " and lag features" } else { "" },
            daily_consumption.len(),
            daily_weather.len()
        )));
    }

    info!(
        rows = table.len(),
        columns = table.columns().len(),
        first = ?table.first_date(),
        last = ?table.last_date(),
        "merged series ready"
    );
    Ok(table)
}
