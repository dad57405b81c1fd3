//! File I/O boundary for the cleaning core.
//!
//! - delimited text ingest + CSV rendering (`delimited`)
//! - Parquet persistence through polars (`parquet`)

pub mod delimited;
pub mod parquet;

pub use delimited::*;
pub use parquet::*;
