use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mcs_core::paths::Paths;
use mcs_core::runtime::{CliRuntime, ContainerRuntime};

mod cli;
mod commands;
mod errors;
mod ui;

use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let paths = match Paths::discover() {
        Ok(paths) => paths,
        Err(e) => {
            errors::present_error(&e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = paths.ensure_dirs() {
        errors::present_error(&e);
        return ExitCode::FAILURE;
    }

    let _log_guard = match mcs_core::logging::init(&paths) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(CliRuntime::default());
    let manager = mcs_core::lifecycle::LifecycleManager::new(paths.clone(), runtime);

    match cli.dispatch(&manager, &paths).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            errors::present_error(&e);
            ExitCode::FAILURE
        }
    }
}
