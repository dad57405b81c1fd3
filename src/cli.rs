//! Command-line parsing and command dispatch.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use crate::config::{Config, DEFAULT_CONFIG_FILE};
use crate::forecast::{render_table, write_report, ForecastEngine};
use crate::ingest::{stage_datasets, DatasetFetcher};
use crate::ml::training::train_model;
use crate::ml::{load_model, ModelArtifact, ModelType};
use crate::pipeline::{load_clean_table, run_clean, CleanInputs, InputSource};
use crate::store;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "smart-energy",
    version,
    about = "Daily energy consumption + weather pipeline with regression forecasts"
)]
pub struct Cli {
    /// Configuration file (TOML); `SMART_ENERGY__*` variables override it.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download the configured open-data datasets into the raw bucket.
    Fetch(FetchArgs),
    /// Normalize, join and persist the consumption and weather inputs.
    Clean(CleanArgs),
    /// Train a regression model on the cleaned table.
    Train(TrainArgs),
    /// Forecast the next days with a trained model.
    Forecast(ForecastArgs),
}

#[derive(Debug, Args, Clone)]
pub struct FetchArgs {
    /// Only fetch these dataset ids (default: all configured).
    #[arg(long = "dataset")]
    pub datasets: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct CleanArgs {
    /// Consumption CSV (overrides `paths.consumption_csv`).
    #[arg(long)]
    pub consumption: Option<PathBuf>,

    /// Weather CSV (overrides `paths.weather_csv`).
    #[arg(long)]
    pub weather: Option<PathBuf>,

    /// Read both inputs from the raw bucket, where `fetch` staged them.
    #[arg(long)]
    pub from_store: bool,

    /// Add lag and rolling-mean features.
    #[arg(long)]
    pub lags: bool,

    /// Output Parquet path; the CSV goes next to it.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Also upload the outputs to the silver bucket.
    #[arg(long)]
    pub stage: bool,
}

#[derive(Debug, Args, Clone)]
pub struct TrainArgs {
    #[arg(long, value_enum, default_value_t = ModelType::RandomForest)]
    pub model: ModelType,

    /// Cleaned table (`.parquet` or `.csv`; default: `paths.output_parquet`).
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Also upload the model to the gold bucket.
    #[arg(long)]
    pub stage: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ForecastArgs {
    #[arg(long, value_enum, default_value_t = ModelType::LinearRegression)]
    pub model: ModelType,

    /// Model file (default: `{paths.model_dir}/{model}.bin`).
    #[arg(long)]
    pub model_file: Option<PathBuf>,

    /// Cleaned table (default: `paths.output_parquet`).
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Days to forecast.
    #[arg(long)]
    pub horizon: Option<usize>,

    /// Peak alert threshold (MW).
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Write the forecast to this `.csv` or `.json` file.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub async fn run(cli: Cli) -> Result<()> {
    let cfg = Config::load_from(&cli.config)?;
    match cli.command {
        Command::Fetch(args) => fetch(&cfg, args).await,
        Command::Clean(args) => clean(cfg, args).await,
        Command::Train(args) => train(&cfg, args).await,
        Command::Forecast(args) => forecast(&cfg, args),
    }
}

async fn fetch(cfg: &Config, args: FetchArgs) -> Result<()> {
    let datasets: Vec<_> = cfg
        .ingest
        .datasets
        .iter()
        .filter(|d| args.datasets.is_empty() || args.datasets.contains(&d.id))
        .cloned()
        .collect();
    if datasets.is_empty() {
        anyhow::bail!("no configured dataset matches {:?}", args.datasets);
    }

    let store = store::from_config(&cfg.store)?;
    store::ensure_layer_buckets(store.as_ref(), &cfg.store).await?;
    let fetcher = DatasetFetcher::new(&cfg.ingest)?;
    let summary = stage_datasets(
        &fetcher,
        store.as_ref(),
        &datasets,
        &cfg.store.raw_bucket,
        &cfg.store.raw_prefix,
    )
    .await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    if !summary.failed.is_empty() {
        anyhow::bail!("{} of {} dataset(s) failed", summary.failed.len(), datasets.len());
    }
    Ok(())
}

async fn clean(mut cfg: Config, args: CleanArgs) -> Result<()> {
    if let Some(path) = args.consumption {
        cfg.paths.consumption_csv = path;
    }
    if let Some(path) = args.weather {
        cfg.paths.weather_csv = path;
    }
    if let Some(path) = args.output {
        cfg.paths.output_parquet = path;
    }
    cfg.clean.add_lag_features |= args.lags;

    let inputs = if args.from_store {
        CleanInputs::from_raw_bucket(&cfg)?
    } else {
        CleanInputs::from_paths(&cfg)?
    };
    let needs_store = args.stage || matches!(inputs.consumption, InputSource::Object { .. });
    let store = if needs_store {
        Some(store::from_config(&cfg.store)?)
    } else {
        None
    };

    let out = run_clean(&cfg, &inputs, store.as_deref(), args.stage).await?;
    println!(
        "{} rows, {} columns, {} .. {} -> {} / {}",
        out.table.len(),
        out.table.columns().len() + 1,
        out.table.first_date().map(|d| d.to_string()).unwrap_or_default(),
        out.table.last_date().map(|d| d.to_string()).unwrap_or_default(),
        out.parquet_path.display(),
        out.csv_path.display()
    );
    for object in &out.staged {
        println!("staged {object}");
    }
    Ok(())
}

async fn train(cfg: &Config, args: TrainArgs) -> Result<()> {
    let input = args.input.unwrap_or_else(|| cfg.paths.output_parquet.clone());
    let table = load_clean_table(&input)?;
    let model_type = args.model;
    let training = cfg.training.clone();
    let (artifact, report) =
        tokio::task::spawn_blocking(move || train_model(&table, model_type, &training)).await??;

    let path = artifact.save(&cfg.paths.model_dir)?;
    info!(path = %path.display(), model = %report.model_id, "model saved");

    if args.stage {
        let store = store::from_config(&cfg.store)?;
        store.ensure_bucket(&cfg.store.gold_bucket).await?;
        store
            .put(&cfg.store.gold_bucket, &artifact.file_name(), artifact.to_bytes()?)
            .await?;
        info!(bucket = %cfg.store.gold_bucket, key = %artifact.file_name(), "model staged to gold layer");
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn forecast(cfg: &Config, args: ForecastArgs) -> Result<()> {
    let model_file = args
        .model_file
        .unwrap_or_else(|| cfg.paths.model_dir.join(format!("{}.bin", args.model)));
    let artifact = ModelArtifact::load(&model_file)?;
    if artifact.metadata.model_type != args.model {
        warn!(
            requested = %args.model,
            found = %artifact.metadata.model_type,
            "model file type differs from --model, using the file"
        );
    }
    let model = load_model(artifact)?;

    let input = args.input.unwrap_or_else(|| cfg.paths.output_parquet.clone());
    let table = load_clean_table(&input)?;

    let mut fc = cfg.forecast.clone();
    if let Some(h) = args.horizon {
        fc.horizon_days = h;
    }
    if let Some(t) = args.threshold {
        fc.peak_threshold_mw = t;
    }
    if fc.horizon_days == 0 {
        anyhow::bail!("horizon must be positive");
    }

    let report = ForecastEngine::new(Box::new(model), fc).forecast(&table)?;
    print!("{}", render_table(&report));
    if let Some(path) = args.output {
        write_report(&report, &path)?;
        info!(path = %path.display(), "forecast written");
    }
    Ok(())
}
