// malt/src/main.rs
use std::process;

use clap::Parser;
use colored::Colorize;
use malt_common::config::Config;
use malt_common::error::{MaltError, Result as MaltResult};
use tracing::level_filters::LevelFilter;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::CliArgs;

#[tokio::main]
async fn main() {
    let cli_args = CliArgs::parse();

    let level_filter = match cli_args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .with_env_var("MALT_LOG")
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .without_time()
        .try_init();

    match run(&cli_args).await {
        Ok(()) => {
            debug!("Command completed successfully.");
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            process::exit(e.exit_code());
        }
    }
}

async fn run(cli_args: &CliArgs) -> MaltResult<()> {
    let config = match &cli_args.prefix {
        Some(prefix) => Config::with_root(prefix),
        None => Config::load().map_err(|e| {
            MaltError::Config(format!("Could not load config: {e}"))
        })?,
    };
    debug!("Using prefix {}", config.malt_root().display());
    cli_args.command.run(&config).await
}
