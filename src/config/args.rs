//! Command-line argument parsing

use std::path::PathBuf;

use clap::Parser;

/// Rate-limited, cache-backed weather proxy
#[derive(Debug, Clone, Parser)]
#[command(name = "wttr-gate", version)]
pub struct Args {
    /// Configuration file (TOML). Defaults to ./config.toml when present.
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Load and validate the configuration, then exit
    #[arg(long)]
    pub check_config: bool,

    /// Print a sample configuration file to stdout, then exit
    #[arg(long, conflicts_with = "check_config")]
    pub print_sample_config: bool,
}
