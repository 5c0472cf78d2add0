// This is the primary entry point for the image indexer binary.
// The lib.rs file serves as the public API for library consumers.

use std::path::PathBuf;
use std::process::ExitCode;
use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use image_indexer::commands::Args;
use image_indexer::convert;

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)         // Remove file path
        .with_line_number(false)  // Remove line numbers
        .with_thread_ids(false)   // Remove thread IDs
        .with_thread_names(false) // Remove thread names
        .with_target(false)       // Remove module path
        .with_ansi(true)          // Keep colored output
        .with_writer(std::io::stderr)
        .compact()                // Use compact formatter instead of pretty
        .init();
}

async fn run(args: &Args) -> anyhow::Result<PathBuf> {
    let settings = args.resolve_settings().await?;
    debug!("Settings: {:?}", settings);
    convert(settings.into_options())
        .await
        .context("Conversion failed")
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    debug!("=== Image indexer starting ===");

    match run(&args).await {
        Ok(path) => {
            info!("Done");
            println!("{}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
