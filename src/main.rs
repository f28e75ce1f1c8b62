use anyhow::Result;
use clap::Parser;
use gmbridge::{
    app::config::Config,
    cli::{self, Cli},
};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first to get verbose flag
    let cli = Cli::parse();

    // Set config directory override before anything resolves paths
    if let Some(ref config_dir) = cli.config {
        gmbridge::util::paths::set_config_dir_override(Some(config_dir.clone()));
    }

    let logs_dir = gmbridge::util::paths::get_logs_dir().unwrap_or_else(|_| PathBuf::from("."));
    std::fs::create_dir_all(&logs_dir).ok();

    // stdout carries the bridge wire protocol, so logs only go to the file
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "gmbridge.jsonl");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let log_level = if cli.verbose {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(tracing_subscriber::filter::LevelFilter::from_level(
                    log_level,
                )),
        )
        .init();

    tracing::info!("Starting gmbridge {}", env!("CARGO_PKG_VERSION"));
    tracing::trace!("CLI arguments: {:?}", cli);

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Config::default()
        }
    };
    tracing::debug!("Config loaded: {:?}", config);

    let exit_code = cli::handler::handle_command(cli.command, config).await;

    // Flush the log writer before exiting
    drop(_guard);
    std::process::exit(exit_code);
}
