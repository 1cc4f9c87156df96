//! Discovery registrar binary.
//!
//! Publishes this pod's address under each `--task-name`, then blocks until
//! SIGTERM or SIGINT so the pod stays up alongside its siblings.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use toolpod_registrar::config::{Args, ClientOptions, RegistrarConfig};
use toolpod_registrar::registrar::{idle_until, termination_signal};
use toolpod_registrar::{HostnameResolver, MySqlDirectory, Registrar};

/// Registrar version (semver).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = toolpod_registrar::logging::init(args.log_format) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(1);
    }

    info!(version = VERSION, tasks = ?args.task_names, "registrar starting");

    match run(args).await {
        Ok(()) => {
            info!("registrar exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "registrar failed");
            // Log the error chain
            let mut source = e.source();
            while let Some(cause) = source {
                error!(cause = %cause, "caused by");
                source = cause.source();
            }
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let config = RegistrarConfig::from_args(&args, home.as_deref())?;

    let client = ClientOptions::load(&config.option_file)
        .with_context(|| format!("loading credentials from {}", config.option_file.display()))?;
    let directory = MySqlDirectory::new(
        config.connect_options(&client),
        config.table.clone(),
        config.record_timestamp,
    )?;

    let mut registrar = Registrar::new(HostnameResolver, directory, config.task_names.clone())?;
    let registration = registrar.register().await.context("registration failed")?;
    info!(
        endpoint = %registration.endpoint,
        rows = registration.entries.len(),
        "registration committed"
    );

    idle_until(termination_signal()).await?;
    Ok(())
}
