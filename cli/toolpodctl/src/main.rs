//! toolpodctl - deploy the tool's workload pod.

use std::process::ExitCode;

use clap::Parser;
use toolpodctl::cli::Cli;
use toolpodctl::{error, logging};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    // Run the command
    if let Err(e) = cli.run().await {
        // Print error in a user-friendly way
        error::print_error(&e);
        return ExitCode::from(error::exit_code(&e));
    }

    ExitCode::SUCCESS
}
