//! Export configured Rally record types to stdout as JSON
//!
//! Configuration is read from `$RALLY_EXPORT_CONFIG` (default
//! `rally-config.json`); credentials may be supplied through `RALLY_API_KEY`
//! or `RALLY_USERNAME` / `RALLY_PASSWORD`. Logs go to stderr, filtered with
//! `RUST_LOG`.

use rally_export::{ExportConfig, Exporter};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "rally-config.json";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run().await {
        Ok(summary) if summary.types_failed == 0 && summary.attachment_failures == 0 => {
            ExitCode::SUCCESS
        }
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "export failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> rally_export::Result<rally_export::RunSummary> {
    let path =
        std::env::var("RALLY_EXPORT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    tracing::info!(config = %path, "loading configuration");

    let mut config = ExportConfig::from_file(&path)?;
    config.api = config.api.with_env_credentials();

    Exporter::from_config(config)?.run().await
}
