//! Lag and rolling-window features on the merged series.

use tracing::debug;

use crate::domain::columns::{
    ELECTRICITY, ELECTRICITY_LAG_1, GAS_TOTAL, GAS_TOTAL_LAG_1, TOTAL_CONSUMPTION, TOTAL_LAG_1, TOTAL_LAG_7,
    TOTAL_ROLL_7,
};
use crate::domain::DailyTable;
use crate::error::PipelineResult;

/// Columns appended by `add_lag_features`, in output order.
pub const LAG_COLUMNS: [&str; 5] = [TOTAL_LAG_1, TOTAL_LAG_7, TOTAL_ROLL_7, ELECTRICITY_LAG_1, GAS_TOTAL_LAG_1];

/// Window of the trailing total-consumption mean.
pub const ROLLING_WINDOW: usize = 7;

/// Value `lag` rows earlier; missing for the first `lag` rows.
pub fn shift(values: &[Option<f64>], lag: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| i.checked_sub(lag).and_then(|j| values[j]))
        .collect()
}

/// Trailing mean over `window` rows including the current one.
///
/// Missing until `window` rows are available, and whenever any value inside
/// the window is missing.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            let start = (i + 1).checked_sub(window)?;
            let slice = &values[start..=i];
            let sum = slice.iter().copied().sum::<Option<f64>>()?;
            Some(sum / window as f64)
        })
        .collect()
}

/// Append lag-1, lag-7 and 7-day rolling mean of total consumption, plus
/// lag-1 of electricity and gas total, then drop every incomplete row.
///
/// Returns a new table; the input is left untouched.
pub fn add_lag_features(merged: &DailyTable) -> PipelineResult<DailyTable> {
    if merged.is_empty() {
        let mut names = merged.column_names();
        for name in LAG_COLUMNS {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        return Ok(DailyTable::empty(&names));
    }

    let total = merged.require_column(TOTAL_CONSUMPTION)?.to_vec();
    let elec = merged.require_column(ELECTRICITY)?.to_vec();
    let gas = merged.require_column(GAS_TOTAL)?.to_vec();

    let mut out = merged.clone();
    out.push_column(TOTAL_LAG_1, shift(&total, 1))?;
    out.push_column(TOTAL_LAG_7, shift(&total, 7))?;
    out.push_column(TOTAL_ROLL_7, rolling_mean(&total, ROLLING_WINDOW))?;
    out.push_column(ELECTRICITY_LAG_1, shift(&elec, 1))?;
    out.push_column(GAS_TOTAL_LAG_1, shift(&gas, 1))?;

    let augmented = out.drop_incomplete();
    debug!(input = merged.len(), output = augmented.len(), "lag features added");
    Ok(augmented)
}
