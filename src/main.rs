//! WinPlacer - keeps application windows at configured sizes and positions
//!
//! Main entry point: parses the command line, initializes logging and
//! dispatches to the daemon or the settings editor.

use clap::Parser;
use tracing::error;
use winplacer::{
    cli::{run_cli, WinPlacerCli},
    logging::{init_logging, LogConfig},
    Result, WinPlacerError,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = WinPlacerCli::parse();

    let mut log_config = LogConfig::from_env();
    if cli.verbose {
        log_config = log_config.verbose();
    }
    init_logging(&log_config).map_err(|e| {
        WinPlacerError::ConfigurationError(format!("Failed to initialize logging: {}", e))
    })?;

    if let Err(e) = run_cli(cli).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
