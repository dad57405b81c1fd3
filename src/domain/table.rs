//! Date-indexed table of optional floats.
//!
//! Every series the pipeline produces (daily consumption, daily weather, the
//! merged and augmented series) is a `DailyTable`: one row per calendar day,
//! strictly increasing dates, named `f64` columns where `None` is a missing
//! value. Columns keep their insertion order, which is part of the output
//! schema.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// A named column of optional values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }
}

/// Column-major table indexed by calendar date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyTable {
    dates: Vec<NaiveDate>,
    columns: Vec<Column>,
}

impl DailyTable {
    /// Build a table, checking column lengths, duplicate names and the index
    /// ordering invariant.
    pub fn new(dates: Vec<NaiveDate>, columns: Vec<Column>) -> PipelineResult<Self> {
        if let Some(pair) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(PipelineError::Schema(format!(
                "date index must be strictly increasing ({} followed by {})",
                pair[0], pair[1]
            )));
        }
        let mut table = Self {
            dates,
            columns: Vec::with_capacity(columns.len()),
        };
        for column in columns {
            table.push_column(column.name, column.values)?;
        }
        Ok(table)
    }

    /// An empty table that still carries its column schema.
    pub fn empty<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            dates: Vec::new(),
            columns: names
                .iter()
                .map(|n| Column::new(n.as_ref(), Vec::new()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Like [`column`](Self::column) but a missing column is a schema error.
    pub fn require_column(&self, name: &str) -> PipelineResult<&[Option<f64>]> {
        self.column(name)
            .ok_or_else(|| PipelineError::Schema(format!("column `{name}` not present in table")))
    }

    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        self.column(name).and_then(|c| c.get(row).copied().flatten())
    }

    /// Values of one row, in column order.
    pub fn row(&self, row: usize) -> Vec<Option<f64>> {
        self.columns
            .iter()
            .map(|c| c.values.get(row).copied().flatten())
            .collect()
    }

    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) -> PipelineResult<()> {
        let name = name.into();
        if values.len() != self.dates.len() {
            return Err(PipelineError::Schema(format!(
                "column `{name}` has {} values for {} dates",
                values.len(),
                self.dates.len()
            )));
        }
        if self.has_column(&name) {
            return Err(PipelineError::Schema(format!("duplicate column `{name}`")));
        }
        self.columns.push(Column::new(name, values));
        Ok(())
    }

    /// Copy of the table restricted to the rows for which `keep` is true.
    pub fn filter_rows<F>(&self, mut keep: F) -> DailyTable
    where
        F: FnMut(usize) -> bool,
    {
        let rows: Vec<usize> = (0..self.len()).filter(|&i| keep(i)).collect();
        self.take_rows(&rows)
    }

    /// Copy of the table with only the given rows, which must be ascending.
    pub fn take_rows(&self, rows: &[usize]) -> DailyTable {
        DailyTable {
            dates: rows.iter().map(|&i| self.dates[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), rows.iter().map(|&i| c.values[i]).collect()))
                .collect(),
        }
    }

    /// Drop rows whose value in `name` is missing. An absent column counts as
    /// missing on every row.
    pub fn drop_missing_in(&self, name: &str) -> DailyTable {
        match self.column(name) {
            Some(values) => self.filter_rows(|i| values[i].is_some()),
            None => self.take_rows(&[]),
        }
    }

    /// Drop every row that has at least one missing value.
    pub fn drop_incomplete(&self) -> DailyTable {
        self.filter_rows(|i| self.columns.iter().all(|c| c.values[i].is_some()))
    }

    /// Keep rows whose date lies in `[start, end]`; open bounds are unbounded.
    pub fn between(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> DailyTable {
        self.filter_rows(|i| {
            let d = self.dates[i];
            start.map_or(true, |s| d >= s) && end.map_or(true, |e| d <= e)
        })
    }

    /// Fill missing values by linear interpolation over the date index.
    ///
    /// The weight of each neighbour is proportional to the distance in days,
    /// not in rows. Gaps without a valid neighbour on both sides stay missing.
    pub fn interpolate_time(&mut self) {
        let days: Vec<i64> = self
            .dates
            .iter()
            .map(|d| d.signed_duration_since(self.dates[0]).num_days())
            .collect();
        for column in &mut self.columns {
            interpolate_column(&days, &mut column.values);
        }
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}

fn interpolate_column(days: &[i64], values: &mut [Option<f64>]) {
    let mut prev: Option<usize> = None;
    let mut i = 0;
    while i < values.len() {
        if values[i].is_some() {
            prev = Some(i);
            i += 1;
            continue;
        }
        let next = (i + 1..values.len()).find(|&j| values[j].is_some());
        if let (Some(p), Some(n), Some(vp), Some(vn)) =
            (prev, next, prev.and_then(|p| values[p]), next.and_then(|n| values[n]))
        {
            let span = (days[n] - days[p]) as f64;
            for k in i..n {
                let frac = (days[k] - days[p]) as f64 / span;
                values[k] = Some(vp + (vn - vp) * frac);
            }
            i = n;
        } else {
            match next {
                Some(n) => i = n,
                None => break,
            }
        }
    }
}
