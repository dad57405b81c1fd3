//! Parquet persistence of daily tables (polars).

use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;

use chrono::{Duration, NaiveDate};
use polars::prelude::*;

use crate::domain::columns::DATE;
use crate::domain::{Column, DailyTable};
use crate::error::{PipelineError, PipelineResult};

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Convert a table to a polars frame: a `date` column of logical type
/// `Date`, then one `Float64` column per table column, in order.
pub fn to_dataframe(table: &DailyTable) -> PipelineResult<DataFrame> {
    let epoch = epoch();
    let days: Vec<i32> = table
        .dates()
        .iter()
        .map(|d| d.signed_duration_since(epoch).num_days() as i32)
        .collect();

    let mut series = Vec::with_capacity(table.columns().len() + 1);
    series.push(Series::new(DATE, days).cast(&DataType::Date)?);
    for column in table.columns() {
        series.push(Series::new(column.name.as_str(), column.values.as_slice()));
    }
    Ok(DataFrame::new(series)?)
}

/// Rebuild a table from a frame written by [`to_dataframe`].
pub fn from_dataframe(df: &DataFrame) -> PipelineResult<DailyTable> {
    let date_series = df
        .column(DATE)
        .map_err(|_| PipelineError::Schema(format!("missing `{DATE}` column")))?
        .cast(&DataType::Int32)?;
    let epoch = epoch();
    let dates = date_series
        .i32()?
        .into_iter()
        .enumerate()
        .map(|(row, d)| {
            d.map(|d| epoch + Duration::days(d as i64))
                .ok_or_else(|| PipelineError::Parse(format!("null date on row {row}")))
        })
        .collect::<PipelineResult<Vec<NaiveDate>>>()?;

    let mut columns = Vec::new();
    for name in df.get_column_names() {
        if name == DATE {
            continue;
        }
        let values = df.column(name)?.cast(&DataType::Float64)?;
        let values: Vec<Option<f64>> = values.f64()?.into_iter().collect();
        columns.push(Column::new(name, values));
    }
    DailyTable::new(dates, columns)
}

/// Serialize a table to Parquet bytes.
pub fn write_parquet<W: Write>(writer: W, table: &DailyTable) -> PipelineResult<()> {
    let mut df = to_dataframe(table)?;
    ParquetWriter::new(writer).finish(&mut df)?;
    Ok(())
}

pub fn write_parquet_file(path: &Path, table: &DailyTable) -> PipelineResult<()> {
    super::delimited::ensure_parent_dir(path)?;
    let file = File::create(path)?;
    write_parquet(file, table)
}

pub fn read_parquet_bytes(bytes: Vec<u8>) -> PipelineResult<DailyTable> {
    let df = ParquetReader::new(Cursor::new(bytes)).finish()?;
    from_dataframe(&df)
}

pub fn read_parquet_file(path: &Path) -> PipelineResult<DailyTable> {
    let file = File::open(path)?;
    let df = ParquetReader::new(file).finish()?;
    from_dataframe(&df)
}
