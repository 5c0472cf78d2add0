//! Command line front-end.

use std::path::PathBuf;
use clap::Parser;
use crate::core::Settings;
use crate::utils::ConfigError;

/// Converts images matching a glob into a JSON file of base64 data URIs.
///
/// Examples:
///
///   image-indexer --output=dest
///
///   image-indexer --glob='src/*.{gif,jpg}' --output=dest --transformer=dictionary
#[derive(Debug, Parser)]
#[command(name = "image-indexer", version, about, long_about)]
pub struct Args {
    /// Pattern for matching input files [default: input/*.{gif,jpg,png,svg}]
    #[arg(long)]
    pub glob: Option<String>,

    /// Directory the JSON file is written to [default: output/]
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Output shape: default, verbose or dictionary
    #[arg(long)]
    pub transformer: Option<String>,

    /// Regular expression whose capture groups form each entry name
    #[arg(long = "name-pattern")]
    pub name_pattern: Option<String>,

    /// Do not log each converted file
    #[arg(long)]
    pub silent: bool,

    /// Encode files as they are on disk
    #[arg(long = "no-optimize")]
    pub no_optimize: bool,

    /// JSON settings file; flags take precedence over its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Settings given on the command line; unset flags stay `None`.
    pub fn to_settings(&self) -> Settings {
        Settings {
            glob: self.glob.clone(),
            output: self.output.clone(),
            output_transformer: self.transformer.clone(),
            name_transformer: self.name_pattern.clone(),
            silent: self.silent.then_some(true),
            optimize: self.no_optimize.then_some(false),
        }
    }

    /// Settings file (if any) overlaid with the command line flags.
    pub async fn resolve_settings(&self) -> Result<Settings, ConfigError> {
        let base = match &self.config {
            Some(path) => Settings::load(path).await?,
            None => Settings::default(),
        };
        Ok(base.merge(self.to_settings()))
    }
}
