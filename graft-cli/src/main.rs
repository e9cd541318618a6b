use anyhow::Result;
use clap::Parser;
use graft_core::{GraftConfig, console};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::Cli;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    let config = GraftConfig::from_env();

    if let Err(error) = init_tracing(args.verbose || config.verbose) {
        console::error(&format!("{error:#}"));
        return ExitCode::FAILURE;
    }

    match cli::execute(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            console::error(&format!("{error:#}"));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!(error))?;
    Ok(())
}
