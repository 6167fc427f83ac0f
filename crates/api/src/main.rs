//! Alarm API - Main Entry Point

use anyhow::Result;
use api::{init_logging, run_server, settings::Settings};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    init_logging(&settings.server.log_level)?;

    info!("=== Alarm API v{} ===", env!("CARGO_PKG_VERSION"));

    run_server(settings).await
}
