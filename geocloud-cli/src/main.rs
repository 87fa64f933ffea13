//! GeoCloud CLI - convert geospatial layers to cloud-native formats.
//!
//! ```text
//! geocloud run [--jobs N] [--layer NAME]... [--json | --summary-json FILE]
//! geocloud plan [--layer NAME]...
//! geocloud catalog [--json]
//! ```

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use geocloud::logging::LogConfig;

use commands::common::SourceArgs;
use commands::run::RunArgs;
use error::CliError;
use runner::CliRunner;

#[derive(Parser)]
#[command(name = "geocloud")]
#[command(version, about = "Convert geospatial layers to Cloud-Optimized GeoTIFF and FlatGeobuf")]
struct Cli {
    /// Config file (default: ~/.geocloud/config.ini)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Log filter when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info", value_name = "FILTER")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert every layer in the catalog
    Run {
        #[command(flatten)]
        source: SourceArgs,

        /// Print the run summary as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Write the run summary as JSON to FILE
        #[arg(long, value_name = "FILE")]
        summary_json: Option<PathBuf>,
    },

    /// Show the jobs a run would execute without converting anything
    Plan {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// List the layers in the catalog
    Catalog {
        /// JSON catalog to use instead of the built-in one
        #[arg(long, value_name = "FILE")]
        catalog: Option<PathBuf>,

        /// Print layers as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn dispatch(cli: Cli) -> Result<i32, CliError> {
    let mut log = LogConfig::default().with_level(cli.log_level);
    if let Some(path) = cli.log_file {
        log = log.with_file(path);
    }
    let runner = CliRunner::new(cli.config.as_deref(), log)?;

    match cli.command {
        Commands::Run {
            source,
            json,
            summary_json,
        } => commands::run::run(
            &runner,
            RunArgs {
                source,
                json,
                summary_json,
            },
        ),
        Commands::Plan { source } => commands::plan::run(&runner, source),
        Commands::Catalog { catalog, json } => commands::catalog::run(&runner, catalog, json),
    }
}
