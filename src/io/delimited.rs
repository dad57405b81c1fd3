//! Delimited text (CSV/semicolon) read and write.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::domain::columns::DATE;
use crate::domain::{coerce_f64, Column, DailyTable, RawTable};
use crate::error::{PipelineError, PipelineResult};

/// Read delimited text into a `RawTable`.
///
/// Short or long rows are accepted (`flexible`); records the reader cannot
/// decode at all are counted and skipped rather than failing the file.
pub fn read_raw<R: Read>(reader: R, delimiter: u8) -> PipelineResult<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(PipelineError::Schema("input has no header line".to_string()));
    }

    let mut raw = RawTable::new(headers, Vec::new());
    for (idx, result) in reader.records().enumerate() {
        match result {
            Ok(record) => raw.rows.push(record.iter().map(str::to_string).collect()),
            Err(e) => {
                // +2: header line, then 1-based numbering.
                debug!(line = idx + 2, error = %e, "skipping unreadable record");
                raw.unreadable_rows += 1;
            }
        }
    }
    if raw.unreadable_rows > 0 {
        warn!(rows = raw.unreadable_rows, "skipped unreadable records");
    }
    Ok(raw)
}

/// Read a delimited file from disk. The handle is closed on every path.
pub fn read_raw_file(path: &Path, delimiter: u8) -> PipelineResult<RawTable> {
    let file = File::open(path)?;
    read_raw(file, delimiter)
}

/// Write a table as comma-separated text: `date` first (`YYYY-MM-DD`), then
/// the columns in order; missing values are empty fields.
pub fn write_table_csv<W: Write>(writer: W, table: &DailyTable) -> PipelineResult<()> {
    let mut writer = csv::Writer::from_writer(writer);
    let mut header = vec![DATE.to_string()];
    header.extend(table.column_names().into_iter().map(str::to_string));
    writer.write_record(&header)?;

    for (i, date) in table.dates().iter().enumerate() {
        let mut record = Vec::with_capacity(header.len());
        record.push(date.format("%Y-%m-%d").to_string());
        record.extend(table.row(i).into_iter().map(|v| v.map(|x| x.to_string()).unwrap_or_default()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_table_csv_file(path: &Path, table: &DailyTable) -> PipelineResult<()> {
    ensure_parent_dir(path)?;
    let file = File::create(path)?;
    write_table_csv(file, table)
}

/// Parse the CSV rendering produced by [`write_table_csv`] back into a table.
pub fn read_table_csv<R: Read>(reader: R) -> PipelineResult<DailyTable> {
    let raw = read_raw(reader, b',')?;
    let date_col = raw
        .headers
        .iter()
        .position(|h| h == DATE)
        .ok_or_else(|| PipelineError::Schema(format!("missing `{DATE}` column")))?;

    let mut dates = Vec::with_capacity(raw.len());
    for i in 0..raw.len() {
        let cell = raw.cell(i, date_col).unwrap_or_default();
        let date = NaiveDate::parse_from_str(cell, "%Y-%m-%d")
            .map_err(|e| PipelineError::Parse(format!("invalid date '{cell}' on row {}: {e}", i + 1)))?;
        dates.push(date);
    }

    let columns = raw
        .headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != date_col)
        .map(|(idx, name)| {
            let values = (0..raw.len())
                .map(|r| coerce_f64(raw.cell(r, idx)))
                .collect();
            Column::new(name.clone(), values)
        })
        .collect();
    DailyTable::new(dates, columns)
}

pub(crate) fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
