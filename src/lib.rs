pub mod clean;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod ingest;
pub mod io;
pub mod ml;
pub mod pipeline;
pub mod store;
pub mod telemetry;
