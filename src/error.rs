use thiserror::Error;

/// Errors raised by the cleaning core.
///
/// Schema mismatches are fatal for the normalizer that hit them (they mean a
/// data source changed its contract). Row-level parse noise never surfaces
/// here; it is dropped and logged. `Parse` is only returned when an entire
/// input is unusable.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Empty result: {0}")]
    EmptyResult(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}

impl PipelineError {
    pub fn missing_column(field: &str, aliases: &[&str]) -> Self {
        PipelineError::Schema(format!(
            "missing required column `{field}` (accepted headers: {})",
            aliases.join(", ")
        ))
    }

    /// Stable error kind name, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Schema(_) => "SchemaError",
            PipelineError::Parse(_) => "ParseError",
            PipelineError::EmptyResult(_) => "EmptyResultError",
            PipelineError::Io(_) => "IoError",
            PipelineError::Csv(_) => "CsvError",
            PipelineError::Polars(_) => "PolarsError",
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
