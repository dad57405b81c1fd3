//! Weather normalizer: station records -> one aggregated row per day.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::domain::columns::{WEATHER_DATE, WEATHER_FIELDS};
use crate::domain::{coerce_f64, Column, DailyTable, RawTable};
use crate::error::{PipelineError, PipelineResult};

/// Raw codes meaning "no measurement".
pub const DEFAULT_SENTINELS: [f64; 2] = [-9999.0, 9999.0];

/// How same-day values of a column are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Sum,
    Min,
    Max,
    Mean,
}

/// Reducer for each entry of `WEATHER_FIELDS`, same order.
pub const WEATHER_REDUCERS: [Reducer; 6] = [
    Reducer::Sum,  // rain
    Reducer::Min,  // min temperature
    Reducer::Max,  // max temperature
    Reducer::Mean, // mean temperature
    Reducer::Mean, // mean wind
    Reducer::Max,  // max wind
];

#[derive(Debug, Clone, Copy)]
struct Acc {
    sum: f64,
    n: usize,
    min: f64,
    max: f64,
}

impl Default for Acc {
    fn default() -> Self {
        Self {
            sum: 0.0,
            n: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Acc {
    fn add(&mut self, v: f64) {
        self.sum += v;
        self.n += 1;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
    }

    fn reduce(&self, reducer: Reducer) -> Option<f64> {
        if self.n == 0 {
            return None;
        }
        Some(match reducer {
            Reducer::Sum => self.sum,
            Reducer::Min => self.min,
            Reducer::Max => self.max,
            Reducer::Mean => self.sum / self.n as f64,
        })
    }
}

/// Options for [`normalize_weather`].
#[derive(Debug, Clone)]
pub struct WeatherOptions {
    /// Inclusive lower bound on the record date.
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper bound on the record date.
    pub end_date: Option<NaiveDate>,
    pub sentinels: Vec<f64>,
}

impl Default for WeatherOptions {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            sentinels: DEFAULT_SENTINELS.to_vec(),
        }
    }
}

/// Normalize raw weather rows into the daily weather series.
///
/// Sentinel codes are removed before aggregation, then each date is reduced
/// with `WEATHER_REDUCERS`, and remaining gaps are filled by time-based
/// interpolation.
pub fn normalize_weather(raw: &RawTable, opts: &WeatherOptions) -> PipelineResult<DailyTable> {
    let index = raw.header_index();
    let date_col = index.require(&WEATHER_DATE)?;
    let signal_cols = index.require_all(&WEATHER_FIELDS)?;

    let mut days: BTreeMap<NaiveDate, [Acc; 6]> = BTreeMap::new();
    let mut bad_dates = 0usize;
    let mut sentinels = 0usize;

    for row in 0..raw.len() {
        let Some(date) = raw.cell(row, date_col).and_then(parse_weather_date) else {
            bad_dates += 1;
            continue;
        };
        let accs = days.entry(date).or_default();
        for (acc, &col) in accs.iter_mut().zip(&signal_cols) {
            match coerce_f64(raw.cell(row, col)) {
                Some(v) if opts.sentinels.contains(&v) => sentinels += 1,
                Some(v) => acc.add(v),
                None => {}
            }
        }
    }

    if !raw.is_empty() && bad_dates == raw.len() {
        return Err(PipelineError::Parse(format!(
            "none of the {} weather dates could be parsed",
            raw.len()
        )));
    }
    if bad_dates > 0 {
        warn!(rows = bad_dates, "dropped weather rows with invalid dates");
    }

    let dates: Vec<NaiveDate> = days.keys().copied().collect();
    let table_columns = WEATHER_FIELDS
        .iter()
        .zip(WEATHER_REDUCERS)
        .enumerate()
        .map(|(i, (field, reducer))| {
            Column::new(field.canonical, days.values().map(|accs| accs[i].reduce(reducer)).collect())
        })
        .collect();

    let all_days = DailyTable::new(dates, table_columns)?;
    let mut table = all_days.between(opts.start_date, opts.end_date);
    let out_of_range = all_days.len() - table.len();
    let gaps_before: usize = table.columns().iter().map(Column::missing_count).sum();
    table.interpolate_time();
    let gaps_after: usize = table.columns().iter().map(Column::missing_count).sum();

    info!(
        raw_rows = raw.len(),
        days = table.len(),
        out_of_range,
        sentinels,
        interpolated = gaps_before - gaps_after,
        unfilled = gaps_after,
        "weather aggregated to daily values"
    );
    Ok(table)
}

/// Parse a weather record date. Accepts ISO dates, compact `YYYYMMDD`
/// station dates, `DD/MM/YYYY`, and ISO date-times (time part ignored).
pub fn parse_weather_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    const FMTS: [&str; 4] = ["%Y-%m-%d", "%Y%m%d", "%d/%m/%Y", "%Y/%m/%d"];
    FMTS.iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            s.get(..10)
                .filter(|_| s.len() > 10)
                .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::columns::{self, RAIN, TEMP_MAX, TEMP_MEAN, TEMP_MIN, WIND_MAX, WIND_MEAN};

    fn raw(rows: &[[&str; 7]]) -> RawTable {
        RawTable::new(
            ["Date", "Pluie_mm", "Tn_Min", "Tx_Max", "T_Moyenne", "Vent_Moyen", "Vent_Max"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rows.iter().map(|r| r.iter().map(|s| s.to_string()).collect()).collect(),
        )
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, d).unwrap()
    }

    #[test]
    fn test_rain_sentinel_is_dropped_before_sum() {
        let input = raw(&[
            ["2023-01-01", "5", "1", "1", "1", "1", "1"],
            ["2023-01-01", "-9999", "1", "1", "1", "1", "1"],
            ["2023-01-01", "3", "1", "1", "1", "1", "1"],
        ]);
        let out = normalize_weather(&input, &WeatherOptions::default()).unwrap();
        assert_eq!(out.value(0, RAIN), Some(8.0));
    }

    #[test]
    fn test_per_column_reducers() {
        let input = raw(&[
            ["2023-01-01", "1", "-2", "8", "3", "2", "10"],
            ["2023-01-01", "2", "0", "12", "5", "4", "14"],
        ]);
        let out = normalize_weather(&input, &WeatherOptions::default()).unwrap();
        assert_eq!(out.value(0, RAIN), Some(3.0));
        assert_eq!(out.value(0, TEMP_MIN), Some(-2.0));
        assert_eq!(out.value(0, TEMP_MAX), Some(12.0));
        assert_eq!(out.value(0, TEMP_MEAN), Some(4.0));
        assert_eq!(out.value(0, WIND_MEAN), Some(3.0));
        assert_eq!(out.value(0, WIND_MAX), Some(14.0));
    }

    #[test]
    fn test_reducers_ignore_row_order() {
        let a = raw(&[
            ["2023-01-01", "1", "-2", "8", "3", "2", "10"],
            ["2023-01-01", "2", "0", "12", "5", "4", "14"],
        ]);
        let b = raw(&[
            ["2023-01-01", "2", "0", "12", "5", "4", "14"],
            ["2023-01-01", "1", "-2", "8", "3", "2", "10"],
        ]);
        let opts = WeatherOptions::default();
        assert_eq!(normalize_weather(&a, &opts).unwrap(), normalize_weather(&b, &opts).unwrap());
    }

    #[test]
    fn test_sentinel_gap_is_interpolated_over_days() {
        let input = raw(&[
            ["2023-01-01", "0", "0", "0", "2", "0", "0"],
            ["2023-01-02", "0", "0", "0", "9999", "0", "0"],
            ["2023-01-04", "0", "0", "0", "8", "0", "0"],
        ]);
        let out = normalize_weather(&input, &WeatherOptions::default()).unwrap();
        assert_eq!(out.column(TEMP_MEAN).unwrap(), &[Some(2.0), Some(4.0), Some(8.0)]);
    }

    #[test]
    fn test_boundary_sentinel_stays_missing() {
        let input = raw(&[
            ["2023-01-01", "0", "0", "0", "-9999", "0", "0"],
            ["2023-01-02", "0", "0", "0", "3", "0", "0"],
        ]);
        let out = normalize_weather(&input, &WeatherOptions::default()).unwrap();
        assert_eq!(out.column(TEMP_MEAN).unwrap(), &[None, Some(3.0)]);
    }

    #[test]
    fn test_date_range_filter() {
        let input = raw(&[
            ["2023-01-01", "1", "0", "0", "0", "0", "0"],
            ["2023-01-02", "2", "0", "0", "0", "0", "0"],
            ["2023-01-03", "3", "0", "0", "0", "0", "0"],
        ]);
        let opts = WeatherOptions {
            start_date: Some(date(2)),
            end_date: Some(date(2)),
            ..WeatherOptions::default()
        };
        let out = normalize_weather(&input, &opts).unwrap();
        assert_eq!(out.dates(), &[date(2)]);
    }

    #[test]
    fn test_station_headers_are_accepted() {
        let input = RawTable::new(
            ["AAAAMMJJ", "RR", "TN", "TX", "TM", "FFM", "FXY", "QRR"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            vec![["20230105", "1.5", "-1", "6", "2.5", "3", "9", "1"]
                .iter()
                .map(|s| s.to_string())
                .collect()],
        );
        let out = normalize_weather(&input, &WeatherOptions::default()).unwrap();
        assert_eq!(out.dates(), &[date(5)]);
        assert_eq!(out.column_names(), columns::weather_columns().to_vec());
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let input = RawTable::new(vec!["Date".into(), "Pluie_mm".into()], vec![]);
        let err = normalize_weather(&input, &WeatherOptions::default()).unwrap_err();
        assert_eq!(err.kind(), "SchemaError");
    }

    #[test]
    fn test_parse_weather_date_variants() {
        assert_eq!(parse_weather_date("2023-01-05"), Some(date(5)));
        assert_eq!(parse_weather_date("20230105"), Some(date(5)));
        assert_eq!(parse_weather_date("05/01/2023"), Some(date(5)));
        assert_eq!(parse_weather_date("2023-01-05 00:00:00"), Some(date(5)));
        assert_eq!(parse_weather_date("yesterday"), None);
    }

    fn cell() -> impl proptest::strategy::Strategy<Value = String> {
        use proptest::prelude::*;
        prop_oneof![
            Just("-9999".to_string()),
            Just("9999".to_string()),
            Just(String::new()),
            (-50.0f64..50.0).prop_map(|v| format!("{v:.1}")),
        ]
    }

    proptest::proptest! {
        #[test]
        fn prop_sentinels_never_reach_output(
            rows in proptest::collection::vec((1u32..=28, proptest::collection::vec(cell(), 6)), 1..40)
        ) {
            let input = RawTable::new(
                ["Date", "Pluie_mm", "Tn_Min", "Tx_Max", "T_Moyenne", "Vent_Moyen", "Vent_Max"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                rows.iter()
                    .map(|(day, values)| {
                        let mut row = vec![date(*day).format("%Y-%m-%d").to_string()];
                        row.extend(values.iter().cloned());
                        row
                    })
                    .collect(),
            );
            let out = normalize_weather(&input, &WeatherOptions::default()).unwrap();
            for c in out.columns() {
                proptest::prop_assert!(
                    c.values.iter().flatten().all(|v| v.abs() != 9999.0),
                    "{} kept a sentinel", c.name
                );
            }
        }
    }
}
