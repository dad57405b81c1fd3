//! Run orchestration: raw inputs in, cleaned table out.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::clean::clean_and_merge;
use crate::config::{Config, DatasetRole};
use crate::domain::{DailyTable, RawTable};
use crate::error::PipelineError;
use crate::ingest::role_key;
use crate::io;
use crate::store::ObjectStore;

/// Where a raw dataset is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Path(PathBuf),
    Object { bucket: String, key: String },
}

impl std::fmt::Display for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputSource::Path(p) => write!(f, "{}", p.display()),
            InputSource::Object { bucket, key } => write!(f, "{bucket}/{key}"),
        }
    }
}

/// Both raw inputs and the delimiter each one is written with.
#[derive(Debug, Clone)]
pub struct CleanInputs {
    pub consumption: InputSource,
    pub weather: InputSource,
    pub consumption_delimiter: u8,
    pub weather_delimiter: u8,
}

impl CleanInputs {
    pub fn from_paths(cfg: &Config) -> Result<Self> {
        Ok(Self {
            consumption: InputSource::Path(cfg.paths.consumption_csv.clone()),
            weather: InputSource::Path(cfg.paths.weather_csv.clone()),
            consumption_delimiter: cfg.clean.consumption_delimiter_byte()?,
            weather_delimiter: cfg.clean.weather_delimiter_byte()?,
        })
    }

    /// The objects `fetch` stages for the consumption and weather roles.
    /// Delimiters come from the staged datasets, or from `clean` when no
    /// dataset claims the role.
    pub fn from_raw_bucket(cfg: &Config) -> Result<Self> {
        let object = |role| InputSource::Object {
            bucket: cfg.store.raw_bucket.clone(),
            key: role_key(&cfg.store.raw_prefix, role),
        };
        let consumption_delimiter = match cfg.ingest.dataset_for(DatasetRole::Consumption) {
            Some(ds) => ds.delimiter_byte()?,
            None => cfg.clean.consumption_delimiter_byte()?,
        };
        let weather_delimiter = match cfg.ingest.dataset_for(DatasetRole::Weather) {
            Some(ds) => ds.delimiter_byte()?,
            None => cfg.clean.weather_delimiter_byte()?,
        };
        Ok(Self {
            consumption: object(DatasetRole::Consumption),
            weather: object(DatasetRole::Weather),
            consumption_delimiter,
            weather_delimiter,
        })
    }
}

#[derive(Debug)]
pub struct CleanOutput {
    pub table: DailyTable,
    pub parquet_path: PathBuf,
    pub csv_path: PathBuf,
    /// `bucket/key` of every object written to the silver layer.
    pub staged: Vec<String>,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn read_input(
    source: &InputSource,
    delimiter: u8,
    store: Option<&dyn ObjectStore>,
) -> Result<RawTable> {
    let raw = match source {
        InputSource::Path(path) => io::read_raw_file(path, delimiter)
            .with_context(|| format!("reading {}", path.display()))?,
        InputSource::Object { bucket, key } => {
            let store = store.context("an object store is required to read bucket inputs")?;
            let bytes = store.get(bucket, key).await?;
            io::read_raw(bytes.as_slice(), delimiter).with_context(|| format!("parsing {bucket}/{key}"))?
        }
    };
    info!(source = %source, rows = raw.len(), columns = raw.headers.len(), "raw input loaded");
    Ok(raw)
}

/// Clean both inputs, persist Parquet + CSV locally, and stage both files in
/// the silver bucket when `stage` is set.
pub async fn run_clean(
    cfg: &Config,
    inputs: &CleanInputs,
    store: Option<&dyn ObjectStore>,
    stage: bool,
) -> Result<CleanOutput> {
    let opts = cfg.clean.to_options()?;
    let consumption = read_input(&inputs.consumption, inputs.consumption_delimiter, store).await?;
    let weather = read_input(&inputs.weather, inputs.weather_delimiter, store).await?;

    let table = clean_and_merge(&consumption, &weather, &opts).map_err(|e| {
        error!(kind = e.kind(), error = %e, "cleaning failed");
        e
    })?;

    let parquet_path = cfg.paths.output_parquet.clone();
    let csv_path = cfg.paths.output_csv();
    io::write_parquet_file(&parquet_path, &table)?;
    io::write_table_csv_file(&csv_path, &table)?;
    info!(parquet = %parquet_path.display(), csv = %csv_path.display(), rows = table.len(), "cleaned table written");

    let mut staged = Vec::new();
    if stage {
        let store = store.context("an object store is required to stage outputs")?;
        let bucket = &cfg.store.silver_bucket;
        store.ensure_bucket(bucket).await?;
        for path in [&parquet_path, &csv_path] {
            let key = file_name(path);
            let bytes = tokio::fs::read(path).await?;
            store.put(bucket, &key, bytes).await?;
            info!(bucket = %bucket, key = %key, "staged to silver layer");
            staged.push(format!("{bucket}/{key}"));
        }
    }

    Ok(CleanOutput {
        table,
        parquet_path,
        csv_path,
        staged,
    })
}

/// Load a cleaned table from a local `.parquet` or `.csv` file.
pub fn load_clean_table(path: &Path) -> Result<DailyTable> {
    let table = match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => {
            let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
            io::read_table_csv(file)?
        }
        _ => io::read_parquet_file(path).with_context(|| format!("reading {}", path.display()))?,
    };
    if table.is_empty() {
        return Err(PipelineError::EmptyResult(format!("{} holds no rows", path.display())).into());
    }
    Ok(table)
}
