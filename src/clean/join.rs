//! Temporal joiner.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::domain::columns::TOTAL_CONSUMPTION;
use crate::domain::{Column, DailyTable};
use crate::error::PipelineResult;

/// Inner join of two daily tables on their date index.
///
/// Only dates present on both sides survive, in ascending order. Output
/// columns are the left columns followed by the right ones; a right column
/// whose name already exists on the left is skipped, so joining a table
/// with itself returns it unchanged.
pub fn inner_join(left: &DailyTable, right: &DailyTable) -> PipelineResult<DailyTable> {
    let right_rows: HashMap<NaiveDate, usize> = right
        .dates()
        .iter()
        .enumerate()
        .map(|(i, d)| (*d, i))
        .collect();

    // Both indexes are strictly increasing, so walking the left side keeps
    // the output ascending.
    let pairs: Vec<(usize, usize)> = left
        .dates()
        .iter()
        .enumerate()
        .filter_map(|(li, d)| right_rows.get(d).map(|&ri| (li, ri)))
        .collect();

    let dates = pairs.iter().map(|&(li, _)| left.dates()[li]).collect();
    let mut columns: Vec<Column> = left
        .columns()
        .iter()
        .map(|c| Column::new(c.name.clone(), pairs.iter().map(|&(li, _)| c.values[li]).collect()))
        .collect();
    for c in right.columns() {
        if left.has_column(&c.name) {
            debug!(column = %c.name, "skipping duplicate column from right side of join");
            continue;
        }
        columns.push(Column::new(c.name.clone(), pairs.iter().map(|&(_, ri)| c.values[ri]).collect()));
    }

    DailyTable::new(dates, columns)
}

/// Build the merged series: inner join on date, then drop rows without a
/// total-consumption value.
///
/// An empty table is returned when nothing overlaps and the caller decides
/// whether that is fatal. Errors only surface a broken input table.
pub fn merge_series(consumption: &DailyTable, weather: &DailyTable) -> PipelineResult<DailyTable> {
    let joined = inner_join(consumption, weather)?;
    let merged = joined.drop_missing_in(TOTAL_CONSUMPTION);
    if merged.is_empty() {
        warn!(
            consumption_days = consumption.len(),
            weather_days = weather.len(),
            "merged series is empty"
        );
    } else {
        debug!(
            joined = joined.len(),
            kept = merged.len(),
            "joined consumption and weather series"
        );
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::columns::{ELECTRICITY, RAIN};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, day).unwrap()
    }

    fn consumption(days: &[u32], totals: &[Option<f64>]) -> DailyTable {
        DailyTable::new(
            days.iter().map(|&x| d(x)).collect(),
            vec![
                Column::new(ELECTRICITY, totals.iter().map(|t| t.map(|v| v / 2.0)).collect()),
                Column::new(TOTAL_CONSUMPTION, totals.to_vec()),
            ],
        )
        .unwrap()
    }

    fn weather(days: &[u32]) -> DailyTable {
        DailyTable::new(
            days.iter().map(|&x| d(x)).collect(),
            vec![Column::new(RAIN, days.iter().map(|&x| Some(x as f64)).collect())],
        )
        .unwrap()
    }

    #[test]
    fn test_only_common_dates_survive() {
        let merged = merge_series(&consumption(&[1, 2], &[Some(10.0), Some(20.0)]), &weather(&[2, 3])).unwrap();
        assert_eq!(merged.dates(), &[d(2)]);
        assert_eq!(merged.column_names(), vec![ELECTRICITY, TOTAL_CONSUMPTION, RAIN]);
        assert_eq!(merged.row(0), vec![Some(10.0), Some(20.0), Some(2.0)]);
    }

    #[test]
    fn test_rows_without_target_are_dropped() {
        let merged = merge_series(&consumption(&[1, 2, 3], &[Some(1.0), None, Some(3.0)]), &weather(&[1, 2, 3])).unwrap();
        assert_eq!(merged.dates(), &[d(1), d(3)]);
        assert!(merged.column(TOTAL_CONSUMPTION).unwrap().iter().all(Option::is_some));
    }

    #[test]
    fn test_self_join_is_identity() {
        let c = consumption(&[1, 2, 5], &[Some(1.0), Some(2.0), Some(5.0)]);
        assert_eq!(inner_join(&c, &c).unwrap(), c);
        assert_eq!(merge_series(&c, &c).unwrap(), c);
    }

    #[test]
    fn test_disjoint_inputs_give_empty_table() {
        let merged = merge_series(&consumption(&[1], &[Some(1.0)]), &weather(&[2])).unwrap();
        assert!(merged.is_empty());
        assert_eq!(merged.columns().len(), 3);
    }

    #[test]
    fn test_empty_inputs_do_not_fail() {
        let merged = merge_series(&DailyTable::default(), &DailyTable::default()).unwrap();
        assert!(merged.is_empty());
    }

    #[test]
    fn test_broken_input_table_surfaces_as_error() {
        // Deserialization bypasses the constructor checks.
        let broken: DailyTable = serde_json::from_value(serde_json::json!({
            "dates": ["2023-01-01"],
            "columns": [
                {"name": "elec_MW", "values": [1.0]},
                {"name": "elec_MW", "values": [2.0]}
            ]
        }))
        .unwrap();
        let err = inner_join(&broken, &weather(&[1])).unwrap_err();
        assert_eq!(err.kind(), "SchemaError");
    }
}
