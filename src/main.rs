use anyhow::Result;
use clap::Parser;
use smart_energy::{cli, telemetry};
use telemetry::init_tracing;
use tracing::error;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; variables may come from the environment.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = cli::Cli::parse();
    if let Err(e) = cli::run(cli).await {
        error!(error = format!("{e:#}"), "command failed");
        return Err(e);
    }
    Ok(())
}
