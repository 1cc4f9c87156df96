//! # toolpod-manifest
//!
//! Workload catalog and deployment descriptor composition.
//!
//! The platform we deploy to gives each tool one namespace and nothing else:
//! no load balancer, no DNS-based discovery between tool workloads. All
//! components therefore share a single pod, rendered from a catalog of
//! workload definitions.
//!
//! ## Invariants
//!
//! - Composition is a pure function of (catalog, mode, context); the same
//!   inputs always render byte-identical documents
//! - Container names in a deployment are unique and map to exactly one
//!   catalog entry, or to the synthetic discovery container
//! - Invariant violations are reported before anything is serialized
//!
//! ## Example
//!
//! ```ignore
//! let catalog = Catalog::builtin()?;
//! let ctx = ComposeContext::new("cluebotng", "/data/project/cluebotng");
//! let composition = compose(&catalog, Mode::Primary, &ctx)?;
//! let document = composition.deployment.to_document()?;
//! ```

mod catalog;
mod compose;
mod descriptor;
mod error;

pub use catalog::{
    Catalog, DiscoverySpec, Exposure, Inclusion, Mode, Port, Protocol, ResourceLimits,
    WorkloadSpec,
};
pub use compose::{
    compose, ComposeContext, Composition, DEFAULT_PROBE_TIMEOUT_SECS, DISCOVERY_CONTAINER,
    HOME_ENV, MAX_PROBE_TIMEOUT_SECS,
};
pub use descriptor::{
    Container, ContainerPort, DeploymentDescriptor, DeploymentSpec, EnvVar, ExecAction, HostPath,
    LabelSelector, ObjectMeta, PodSpec, PodTemplate, Probe, Quantities, Resource, ResourceKind,
    Resources, ServiceDescriptor, ServicePort, ServiceSpec, TemplateMeta, Volume, VolumeMount,
};
pub use error::ComposeError;
