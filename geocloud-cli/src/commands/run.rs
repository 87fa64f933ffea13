//! Run command - convert every layer of the catalog.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use geocloud::convert::{check_tool_available, GdalConverter, ProcessRunner};
use geocloud::coordinator::RunCoordinator;
use geocloud::report::RunSummary;
use tracing::warn;

use super::common::{load_catalog, resolve_config, SourceArgs};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Every job succeeded.
pub const EXIT_OK: i32 = 0;
/// At least one job failed or a file could not be resolved.
pub const EXIT_FAILURES: i32 = 1;
/// Interrupted with Ctrl+C.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Arguments for the run command.
pub struct RunArgs {
    pub source: SourceArgs,
    pub json: bool,
    pub summary_json: Option<PathBuf>,
}

/// Run the conversion and return the process exit status.
pub fn run(runner: &CliRunner, args: RunArgs) -> Result<i32, CliError> {
    runner.log_startup("run");
    let config = resolve_config(runner.config().clone(), &args.source);
    let catalog = load_catalog(&config, &args.source.layers)?;

    check_tool_available(&ProcessRunner, &config.tool).map_err(|e| CliError::Tool(e.to_string()))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    let converter = Arc::new(GdalConverter::new(&config.tool));
    let coordinator = RunCoordinator::from_config(&config, converter);

    let cancel = coordinator.cancel_handle();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Interrupted, waiting for running conversions to finish...");
        cancel.cancel();
    })
    .map_err(|e| CliError::Runtime(format!("Failed to set signal handler: {}", e)))?;

    if !args.json {
        println!(
            "Converting {} layer(s) from {} to {} ({} concurrent)",
            catalog.len(),
            config.input_root.display(),
            config.output_root.display(),
            config.max_concurrency
        );
    }

    let summary = runtime.block_on(coordinator.run_all(&catalog));
    let interrupted = coordinator.cancel_handle().is_cancelled();

    if let Some(path) = &args.summary_json {
        let json = summary
            .to_json()
            .map_err(|e| CliError::Output(e.to_string()))?;
        fs::write(path, json)
            .map_err(|e| CliError::Output(format!("{}: {}", path.display(), e)))?;
    }

    if args.json {
        let json = summary
            .to_json()
            .map_err(|e| CliError::Output(e.to_string()))?;
        println!("{}", json);
    } else {
        print_summary(&summary);
    }

    if interrupted {
        warn!("Run interrupted");
    }
    Ok(exit_code(&summary, interrupted))
}

/// Exit status for a finished run.
pub fn exit_code(summary: &RunSummary, interrupted: bool) -> i32 {
    if interrupted {
        EXIT_INTERRUPTED
    } else if summary.is_clean() {
        EXIT_OK
    } else {
        EXIT_FAILURES
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("Run summary");
    println!("  Layers:            {}", summary.layers);
    println!("  Jobs:              {}", summary.total_jobs);
    println!("  Succeeded:         {}", summary.succeeded);
    println!("  Failed:            {}", summary.failed);
    if summary.cancelled > 0 {
        println!("  Cancelled:         {}", summary.cancelled);
    }
    println!("  Unmatched files:   {}", summary.skipped_unmatched);
    println!("  Resolution errors: {}", summary.resolution_errors);
    println!("  Elapsed:           {:.1}s", summary.elapsed_secs);

    let problems: Vec<_> = summary
        .failures
        .iter()
        .filter(|f| f.category != "cancelled")
        .collect();
    if problems.is_empty() {
        return;
    }

    println!();
    println!("Problems:");
    for failure in problems {
        println!("  [{}] {}: {}", failure.layer, failure.category, failure.reason);
    }
}
