//! Workload catalog.
//!
//! A catalog is data: every entry carries its own inclusion predicate, so
//! the composer evaluates membership uniformly instead of branching per
//! variant.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ComposeError;

/// Built-in catalog document.
const BUILTIN_CATALOG: &str = include_str!("../catalog/cbng.toml");

/// Application variant selected at deploy time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Classic bot variant.
    #[default]
    Primary,
    /// Next-generation bot variant.
    Alternate,
}

impl Mode {
    /// Map the CLI's boolean variant selector to a mode.
    pub fn select(alternate: bool) -> Self {
        if alternate {
            Mode::Alternate
        } else {
            Mode::Primary
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Primary => "primary",
            Mode::Alternate => "alternate",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-entry inclusion predicate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inclusion {
    /// Included in every mode (shared components).
    #[default]
    Always,
    /// Included only in [`Mode::Primary`].
    Primary,
    /// Included only in [`Mode::Alternate`].
    Alternate,
}

impl Inclusion {
    /// Returns true if an entry with this predicate belongs in `mode`.
    pub fn includes(self, mode: Mode) -> bool {
        match self {
            Inclusion::Always => true,
            Inclusion::Primary => mode == Mode::Primary,
            Inclusion::Alternate => mode == Mode::Alternate,
        }
    }
}

/// Transport protocol of a declared port.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared (number, protocol) port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Port {
    pub number: u16,
    #[serde(default)]
    pub protocol: Protocol,
}

impl Port {
    pub fn tcp(number: u16) -> Self {
        Self {
            number,
            protocol: Protocol::Tcp,
        }
    }

    pub fn udp(number: u16) -> Self {
        Self {
            number,
            protocol: Protocol::Udp,
        }
    }
}

/// CPU and memory quantities, used verbatim as both requests and limits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu: String,
    pub memory: String,
}

impl ResourceLimits {
    pub fn new(cpu: impl Into<String>, memory: impl Into<String>) -> Self {
        Self {
            cpu: cpu.into(),
            memory: memory.into(),
        }
    }
}

/// Request to publish some of a workload's ports under a stable service name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exposure {
    /// Cluster-internal service name.
    pub service: String,

    /// Port numbers to publish. Empty means every declared port.
    #[serde(default)]
    pub ports: Vec<u16>,
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Unique, stable workload name (also the container name).
    pub name: String,

    /// Container image reference.
    pub image: String,

    /// Working directory inside the container.
    pub working_dir: String,

    /// Command and arguments.
    pub command: Vec<String>,

    /// Declared ports.
    #[serde(default)]
    pub ports: Vec<Port>,

    /// Resource limits (requests are set equal).
    pub limits: ResourceLimits,

    /// Extra environment, merged with the injected `HOME`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Executable liveness probe. Absent means no probe.
    #[serde(default)]
    pub liveness: Option<Vec<String>>,

    /// Which modes this workload is deployed in.
    #[serde(default)]
    pub inclusion: Inclusion,

    /// Optional service exposure.
    #[serde(default)]
    pub expose: Option<Exposure>,
}

impl WorkloadSpec {
    /// Create a workload included in every mode, with no ports, env, probe
    /// or exposure.
    pub fn new<I, S>(
        name: impl Into<String>,
        image: impl Into<String>,
        working_dir: impl Into<String>,
        command: I,
        limits: ResourceLimits,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            image: image.into(),
            working_dir: working_dir.into(),
            command: command.into_iter().map(Into::into).collect(),
            ports: Vec::new(),
            limits,
            env: BTreeMap::new(),
            liveness: None,
            inclusion: Inclusion::Always,
            expose: None,
        }
    }

    pub fn with_port(mut self, port: Port) -> Self {
        self.ports.push(port);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_liveness<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.liveness = Some(command.into_iter().map(Into::into).collect());
        self
    }

    pub fn only_in(mut self, inclusion: Inclusion) -> Self {
        self.inclusion = inclusion;
        self
    }

    pub fn exposed_as(mut self, service: impl Into<String>, ports: Vec<u16>) -> Self {
        self.expose = Some(Exposure {
            service: service.into(),
            ports,
        });
        self
    }
}

/// The synthetic discovery container's image and command prefix.
///
/// The composer appends `--task-name <name>` for every included workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverySpec {
    pub image: String,
    pub command: Vec<String>,
}

/// A complete workload catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Deployment resource name.
    pub deployment: String,

    /// Label key used for the pod selector; the value is `deployment`.
    pub role_label: String,

    /// Host path of the shared filesystem, mounted at the same path.
    pub shared_root: String,

    /// Discovery registrar container.
    pub discovery: DiscoverySpec,

    /// Workload entries, in container order.
    #[serde(default)]
    pub workloads: Vec<WorkloadSpec>,
}

impl Catalog {
    /// Load the catalog shipped with this crate.
    pub fn builtin() -> Result<Self, ComposeError> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    /// Parse a catalog from a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ComposeError> {
        Ok(toml::from_str(contents)?)
    }

    /// Read and parse a catalog file.
    pub fn from_path(path: &Path) -> Result<Self, ComposeError> {
        let contents =
            std::fs::read_to_string(path).map_err(|source| ComposeError::ReadCatalog {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml_str(&contents)
    }

    /// Workloads included in `mode`, in catalog order.
    pub fn included(&self, mode: Mode) -> impl Iterator<Item = &WorkloadSpec> + '_ {
        self.workloads
            .iter()
            .filter(move |w| w.inclusion.includes(mode))
    }

    /// Every service name any entry may expose, regardless of mode.
    pub fn service_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .workloads
            .iter()
            .filter_map(|w| w.expose.as_ref().map(|e| e.service.as_str()))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}
