//! Error handling and display for the CLI.

use colored::Colorize;
use thiserror::Error;
use toolpod_manifest::ComposeError;

use crate::driver::ApplyError;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("required environment variable {0} is not set")]
    MissingEnvironment(&'static str),

    #[error("composition failed: {0}")]
    Compose(#[from] ComposeError),

    #[error("apply failed: {0}")]
    Apply(#[from] ApplyError),

    #[error("{failed} of {total} resource deletions did not succeed")]
    DeleteIncomplete { failed: usize, total: usize },
}

impl CliError {
    /// Process exit code for this error.
    ///
    /// Control plane rejections keep the client's own exit status.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Apply(ApplyError::Rejected { status, .. }) => {
                u8::try_from(*status).ok().filter(|s| *s != 0).unwrap_or(1)
            }
            _ => 1,
        }
    }
}

/// Exit code for an arbitrary error.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<CliError>()
        .map(CliError::exit_code)
        .unwrap_or(1)
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    // Check for specific error types and provide hints
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        match cli_err {
            CliError::MissingEnvironment(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: Run from the tool account, or pass --tenant.".yellow()
                );
            }
            CliError::Compose(e) if e.is_invariant_violation() => {
                eprintln!(
                    "\n{}",
                    "Hint: Fix the catalog entry named above. Nothing was sent to the cluster."
                        .yellow()
                );
            }
            CliError::Apply(ApplyError::Spawn { .. }) => {
                eprintln!(
                    "\n{}",
                    "Hint: Check that kubectl is installed, or point --kubectl at it.".yellow()
                );
            }
            CliError::DeleteIncomplete { .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: Pass --soft-fail to tolerate resources that are already gone."
                        .yellow()
                );
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use toolpod_manifest::ResourceKind;

    use super::*;

    #[test]
    fn rejection_keeps_client_exit_status() {
        let err = CliError::Apply(ApplyError::Rejected {
            kind: ResourceKind::Deployment,
            name: "cbng".to_string(),
            status: 2,
            diagnostics: "error validating data".to_string(),
        });
        assert_eq!(err.exit_code(), 2);
        assert_eq!(exit_code(&anyhow::Error::new(err)), 2);
    }

    #[test]
    fn other_errors_exit_with_one() {
        let err = CliError::DeleteIncomplete {
            failed: 1,
            total: 2,
        };
        assert_eq!(err.exit_code(), 1);
    }
}
