//! Consumption normalizer: sub-daily UTC records -> daily local means.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::domain::columns::{self, CONSUMPTION_FIELDS, CONSUMPTION_TIMESTAMP};
use crate::domain::{coerce_f64, Column, DailyTable, RawTable};
use crate::error::{PipelineError, PipelineResult};

const SIGNALS: usize = CONSUMPTION_FIELDS.len();

/// Running mean accumulator.
#[derive(Debug, Clone, Copy, Default)]
struct MeanAcc {
    sum: f64,
    n: usize,
}

impl MeanAcc {
    fn add(&mut self, v: Option<f64>) {
        if let Some(v) = v {
            self.sum += v;
            self.n += 1;
        }
    }

    fn mean(&self) -> Option<f64> {
        (self.n > 0).then(|| self.sum / self.n as f64)
    }
}

/// Normalize raw consumption rows into the daily consumption series.
///
/// Timestamps are read as UTC, shifted to `tz` and stripped of their zone;
/// each local calendar day gets the mean of its records. Days between the
/// first and last observation that have no records are kept as all-missing
/// rows.
pub fn normalize_consumption(raw: &RawTable, tz: Tz) -> PipelineResult<DailyTable> {
    let index = raw.header_index();
    let ts_col = index.require(&CONSUMPTION_TIMESTAMP)?;
    let signal_cols = index.require_all(&CONSUMPTION_FIELDS)?;

    let mut days: BTreeMap<NaiveDate, [MeanAcc; SIGNALS]> = BTreeMap::new();
    let mut bad_timestamps = 0usize;
    let mut empty_rows = 0usize;

    for row in 0..raw.len() {
        let Some(ts) = raw.cell(row, ts_col).and_then(parse_utc_timestamp) else {
            bad_timestamps += 1;
            continue;
        };

        let values: Vec<Option<f64>> = signal_cols
            .iter()
            .map(|&col| coerce_f64(raw.cell(row, col)))
            .collect();
        if values.iter().all(Option::is_none) {
            empty_rows += 1;
            continue;
        }

        let local_date = ts.with_timezone(&tz).naive_local().date();
        let accs = days.entry(local_date).or_default();
        for (acc, v) in accs.iter_mut().zip(values) {
            acc.add(v);
        }
    }

    if !raw.is_empty() && bad_timestamps == raw.len() {
        return Err(PipelineError::Parse(format!(
            "none of the {} consumption timestamps could be parsed",
            raw.len()
        )));
    }
    if bad_timestamps > 0 {
        warn!(rows = bad_timestamps, "dropped consumption rows with invalid timestamps");
    }
    if empty_rows > 0 {
        warn!(rows = empty_rows, "dropped consumption rows with no numeric signal");
    }

    let (Some(&first), Some(&last)) = (days.keys().next(), days.keys().next_back()) else {
        return Ok(DailyTable::empty(&columns::consumption_columns()));
    };

    let dates: Vec<NaiveDate> = first.iter_days().take_while(|d| *d <= last).collect();
    let mut values: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(dates.len()); SIGNALS];
    for date in &dates {
        match days.get(date) {
            Some(accs) => {
                for (column, acc) in values.iter_mut().zip(accs) {
                    column.push(acc.mean());
                }
            }
            None => values.iter_mut().for_each(|c| c.push(None)),
        }
    }

    let table = DailyTable::new(
        dates,
        columns::consumption_columns()
            .into_iter()
            .zip(values)
            .map(|(name, v)| Column::new(name, v))
            .collect(),
    )?;

    info!(
        raw_rows = raw.len(),
        days = table.len(),
        first = %first,
        last = %last,
        timezone = %tz,
        "consumption resampled to daily means"
    );
    Ok(table)
}

/// Parse a consumption timestamp as a UTC instant.
///
/// Text with an explicit offset is converted to UTC; offset-less text is
/// taken to already be UTC.
pub fn parse_utc_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    const OFFSET_FMTS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%d %H:%M%:z"];
    for fmt in OFFSET_FMTS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    const NAIVE_FMTS: [&str; 6] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
    ];
    NAIVE_FMTS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|ndt| Utc.from_utc_datetime(&ndt))
}
