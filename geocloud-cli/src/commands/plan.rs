//! Plan command - show the jobs a run would execute, without running them.

use std::sync::Arc;

use geocloud::convert::GdalConverter;
use geocloud::coordinator::RunCoordinator;

use super::common::{load_catalog, resolve_config, SourceArgs};
use crate::error::CliError;
use crate::runner::CliRunner;

pub fn run(runner: &CliRunner, args: SourceArgs) -> Result<i32, CliError> {
    runner.log_startup("plan");
    let config = resolve_config(runner.config().clone(), &args);
    let catalog = load_catalog(&config, &args.layers)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    let converter = Arc::new(GdalConverter::new(&config.tool));
    let coordinator = RunCoordinator::from_config(&config, converter);
    let plans = runtime.block_on(coordinator.plan(&catalog));

    let mut jobs = 0;
    let mut errors = 0;
    for plan in &plans {
        println!("{} ({} job(s))", plan.layer, plan.jobs.len());
        for job in &plan.jobs {
            println!(
                "  {} -> {}",
                job.input_path.display(),
                job.output_path.display()
            );
        }
        for error in &plan.errors {
            println!("  ! {}", error);
        }
        jobs += plan.jobs.len();
        errors += plan.errors.len();
    }

    println!();
    println!("{} job(s), {} problem(s)", jobs, errors);

    Ok(if errors == 0 { 0 } else { 1 })
}
