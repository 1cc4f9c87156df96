//! Error types for the registrar.

use std::net::IpAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Registrar errors with standardized reason codes.
#[derive(Debug, Error)]
pub enum RegistrarError {
    /// Started without any task name to publish.
    #[error("no_task_names: at least one --task-name is required")]
    NoTaskNames,

    /// Own hostname could not be read or resolved.
    #[error("resolve_failed: {0}")]
    ResolveFailed(String),

    /// Hostname resolved to an address peers cannot reach.
    #[error("unroutable_address: hostname resolved to {0}")]
    UnroutableAddress(IpAddr),

    /// Option file missing or unreadable.
    #[error("option_file_failed: {path}: {source}")]
    OptionFile {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },

    /// Option file lacks a required `[client]` key.
    #[error("credential_missing: {path} has no client.{key}")]
    CredentialMissing { path: PathBuf, key: &'static str },

    /// Table name is not a plain identifier.
    #[error("invalid_table: {0:?}")]
    InvalidTable(String),

    /// Could not open a connection to the directory database.
    #[error("connect_failed: {0}")]
    ConnectFailed(#[source] sqlx::Error),

    /// Upsert or commit failed.
    #[error("write_failed: {0}")]
    WriteFailed(#[source] sqlx::Error),

    /// Could not install the shutdown signal handlers.
    #[error("signal error: {0}")]
    Signal(#[from] std::io::Error),
}

impl RegistrarError {
    /// Get the standardized reason code for this error.
    pub fn reason_code(&self) -> &'static str {
        match self {
            RegistrarError::NoTaskNames => "no_task_names",
            RegistrarError::ResolveFailed(_) => "resolve_failed",
            RegistrarError::UnroutableAddress(_) => "unroutable_address",
            RegistrarError::OptionFile { .. } => "option_file_failed",
            RegistrarError::CredentialMissing { .. } => "credential_missing",
            RegistrarError::InvalidTable(_) => "invalid_table",
            RegistrarError::ConnectFailed(_) => "connect_failed",
            RegistrarError::WriteFailed(_) => "write_failed",
            RegistrarError::Signal(_) => "signal_error",
        }
    }
}
