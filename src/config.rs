use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::clean::{CleanOptions, WeatherOptions, DEFAULT_SENTINELS};

/// Runtime configuration.
///
/// Layers, later wins: built-in defaults, `config/default.toml` (or the file
/// given on the command line), then `SMART_ENERGY__SECTION__KEY` environment
/// variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub clean: CleanConfig,
    pub store: StoreConfig,
    pub ingest: IngestConfig,
    pub training: TrainingConfig,
    pub forecast: ForecastConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub consumption_csv: PathBuf,
    pub weather_csv: PathBuf,
    /// Cleaned table; the CSV rendering goes next to it with a `.csv` extension.
    pub output_parquet: PathBuf,
    pub model_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            consumption_csv: PathBuf::from("data/consommation-idf.csv"),
            weather_csv: PathBuf::from("data/meteo75.csv"),
            output_parquet: PathBuf::from("cleaned_data/idf_conso_meteo_clean.parquet"),
            model_dir: PathBuf::from("models"),
        }
    }
}

impl PathsConfig {
    pub fn output_csv(&self) -> PathBuf {
        self.output_parquet.with_extension("csv")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanConfig {
    /// IANA zone the UTC consumption timestamps are converted to.
    pub timezone: String,
    pub consumption_delimiter: char,
    pub weather_delimiter: char,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub sentinels: Vec<f64>,
    pub add_lag_features: bool,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            timezone: "Europe/Paris".to_string(),
            consumption_delimiter: ';',
            weather_delimiter: ',',
            start_date: None,
            end_date: None,
            sentinels: DEFAULT_SENTINELS.to_vec(),
            add_lag_features: false,
        }
    }
}

impl CleanConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("invalid timezone '{}': {e}", self.timezone))
    }

    pub fn to_options(&self) -> Result<CleanOptions> {
        Ok(CleanOptions {
            timezone: self.tz()?,
            weather: WeatherOptions {
                start_date: self.start_date,
                end_date: self.end_date,
                sentinels: self.sentinels.clone(),
            },
            add_lag_features: self.add_lag_features,
        })
    }

    pub fn consumption_delimiter_byte(&self) -> Result<u8> {
        delimiter_byte(self.consumption_delimiter)
    }

    pub fn weather_delimiter_byte(&self) -> Result<u8> {
        delimiter_byte(self.weather_delimiter)
    }
}

fn delimiter_byte(c: char) -> Result<u8> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| anyhow::anyhow!("delimiter '{c}' must be a single ASCII character"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Local,
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Root directory of the local backend; each bucket is a subdirectory.
    pub local_root: PathBuf,
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub raw_bucket: String,
    pub silver_bucket: String,
    pub gold_bucket: String,
    /// Key prefix for raw datasets.
    pub raw_prefix: String,
    pub http_timeout_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Local,
            local_root: PathBuf::from("data/store"),
            endpoint: "http://localhost:9000".to_string(),
            region: "us-east-1".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            raw_bucket: "raw".to_string(),
            silver_bucket: "silver".to_string(),
            gold_bucket: "gold".to_string(),
            raw_prefix: "raw/".to_string(),
            http_timeout_seconds: 60,
        }
    }
}

/// Cleaning input a staged dataset feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DatasetRole {
    Consumption,
    Weather,
}

/// One open-data dataset to pull.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Opendatasoft dataset identifier.
    pub id: String,
    /// Portal base URL, e.g. `https://odre.opendatasoft.com`.
    pub base_url: String,
    #[serde(default)]
    pub mode: FetchMode,
    /// `refine.<field>=<value>` filters, applied to both access paths.
    #[serde(default)]
    pub refine: Vec<(String, String)>,
    /// Staged as `{raw_prefix}{role}.csv` when set, `{raw_prefix}{id}.csv`
    /// otherwise.
    #[serde(default)]
    pub role: Option<DatasetRole>,
    /// Field delimiter of the staged CSV.
    #[serde(default = "default_dataset_delimiter")]
    pub delimiter: char,
}

fn default_dataset_delimiter() -> char {
    ';'
}

impl DatasetConfig {
    pub fn delimiter_byte(&self) -> Result<u8> {
        delimiter_byte(self.delimiter)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Whole-dataset CSV export.
    #[default]
    Export,
    /// Paginated JSON records API.
    Records,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub datasets: Vec<DatasetConfig>,
    pub page_limit: usize,
    /// Stop paginating after this many records.
    pub max_records: usize,
    pub http_timeout_seconds: u64,
    pub max_retries: u32,
    pub export_timezone: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            datasets: vec![
                DatasetConfig {
                    id: "consommation-quotidienne-brute-regionale".to_string(),
                    base_url: "https://odre.opendatasoft.com".to_string(),
                    mode: FetchMode::Export,
                    refine: vec![("region".to_string(), "Île-de-France".to_string())],
                    role: Some(DatasetRole::Consumption),
                    delimiter: ';',
                },
                DatasetConfig {
                    id: "donnees-synop-essentielles-omm".to_string(),
                    base_url: "https://public.opendatasoft.com".to_string(),
                    mode: FetchMode::Export,
                    refine: vec![("nom".to_string(), "ORLY".to_string())],
                    role: Some(DatasetRole::Weather),
                    delimiter: ';',
                },
                DatasetConfig {
                    id: "eco2mix-national-tr".to_string(),
                    base_url: "https://odre.opendatasoft.com".to_string(),
                    mode: FetchMode::Export,
                    refine: Vec::new(),
                    role: None,
                    delimiter: ';',
                },
            ],
            page_limit: 100,
            max_records: 10_000,
            http_timeout_seconds: 60,
            max_retries: 3,
            export_timezone: "Europe/Paris".to_string(),
        }
    }
}

impl IngestConfig {
    /// The dataset staged for `role`, if one is configured.
    pub fn dataset_for(&self, role: DatasetRole) -> Option<&DatasetConfig> {
        self.datasets.iter().find(|d| d.role == Some(role))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestGrid {
    pub n_trees: Vec<usize>,
    /// `0` means unbounded depth.
    pub max_depth: Vec<u16>,
    pub min_samples_split: Vec<usize>,
    pub min_samples_leaf: Vec<usize>,
}

impl Default for ForestGrid {
    fn default() -> Self {
        Self {
            n_trees: vec![100, 200],
            max_depth: vec![10, 20, 0],
            min_samples_split: vec![2, 5],
            min_samples_leaf: vec![1, 2],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub test_fraction: f64,
    pub seed: u64,
    pub cv_folds: usize,
    pub forest_grid: ForestGrid,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            cv_folds: 3,
            forest_grid: ForestGrid::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub horizon_days: usize,
    pub peak_threshold_mw: f64,
    /// Trailing days averaged into the weather assumed for the horizon.
    pub weather_window_days: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_days: 7,
            peak_threshold_mw: 60_000.0,
            weather_window_days: 7,
        }
    }
}

pub const DEFAULT_CONFIG_FILE: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "SMART_ENERGY__";

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        let cfg: Config = figment
            .extract()
            .with_context(|| format!("invalid configuration (file: {})", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.clean.tz()?;
        self.clean.consumption_delimiter_byte()?;
        self.clean.weather_delimiter_byte()?;
        for ds in &self.ingest.datasets {
            ds.delimiter_byte()
                .with_context(|| format!("ingest dataset '{}'", ds.id))?;
        }
        for role in [DatasetRole::Consumption, DatasetRole::Weather] {
            let n = self.ingest.datasets.iter().filter(|d| d.role == Some(role)).count();
            if n > 1 {
                anyhow::bail!("{n} ingest datasets claim the {role} role, expected at most one");
            }
        }
        if !(0.0..1.0).contains(&self.training.test_fraction) || self.training.test_fraction == 0.0 {
            anyhow::bail!("training.test_fraction must be in (0, 1)");
        }
        if self.training.cv_folds < 2 {
            anyhow::bail!("training.cv_folds must be at least 2");
        }
        if self.forecast.horizon_days == 0 {
            anyhow::bail!("forecast.horizon_days must be positive");
        }
        Ok(())
    }
}
