//! Composition error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading a catalog or composing descriptors.
///
/// Every variant is raised before a document is serialized, so nothing
/// invalid ever reaches the control plane.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// Two included workloads share a name.
    #[error("duplicate workload name: {name}")]
    DuplicateName { name: String },

    /// A workload uses a name reserved for an injected container.
    #[error("workload name '{name}' is reserved")]
    ReservedName { name: String },

    /// A workload's extra env collides with an injected variable.
    #[error("workload '{workload}' sets reserved env key {key}")]
    ReservedEnvKey { workload: String, key: String },

    /// Probe timeout outside the accepted range.
    #[error("invalid probe timeout {seconds}s (must be between 1 and {max})")]
    InvalidProbeTimeout { seconds: u32, max: u32 },

    /// More than one included workload asks for a service.
    #[error("workloads '{first}' and '{second}' both request a service; only one may be exposed")]
    MultipleServices { first: String, second: String },

    /// A workload exposes a port it does not declare.
    #[error("workload '{workload}' exposes undeclared port {port}")]
    UndeclaredPort { workload: String, port: u16 },

    /// A workload asks for a service but has no port to publish.
    #[error("workload '{workload}' requests service '{service}' but declares no ports")]
    NoExposedPorts { workload: String, service: String },

    /// Could not read a catalog file.
    #[error("failed to read catalog {path}: {source}")]
    ReadCatalog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not parse a catalog document.
    #[error("invalid catalog: {0}")]
    ParseCatalog(#[from] toml::de::Error),

    /// Could not serialize a descriptor.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ComposeError {
    /// Short, stable reason code for logs and machine output.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ComposeError::DuplicateName { .. } => "duplicate_name",
            ComposeError::ReservedName { .. } => "reserved_name",
            ComposeError::ReservedEnvKey { .. } => "reserved_env_key",
            ComposeError::InvalidProbeTimeout { .. } => "invalid_probe_timeout",
            ComposeError::MultipleServices { .. } => "multiple_services",
            ComposeError::UndeclaredPort { .. } => "undeclared_port",
            ComposeError::NoExposedPorts { .. } => "no_exposed_ports",
            ComposeError::ReadCatalog { .. } => "catalog_read_failed",
            ComposeError::ParseCatalog(_) => "catalog_parse_failed",
            ComposeError::Serialization(_) => "serialization_failed",
        }
    }

    /// Whether this error is a composition invariant violation (as opposed
    /// to an I/O or parse failure).
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            ComposeError::DuplicateName { .. }
                | ComposeError::ReservedName { .. }
                | ComposeError::ReservedEnvKey { .. }
                | ComposeError::InvalidProbeTimeout { .. }
                | ComposeError::MultipleServices { .. }
                | ComposeError::UndeclaredPort { .. }
                | ComposeError::NoExposedPorts { .. }
        )
    }
}
