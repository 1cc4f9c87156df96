//! Manifest composition.
//!
//! Turns a catalog plus a mode into a deployment descriptor and, when an
//! included workload asks for one, a service descriptor.

use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::{Catalog, Mode, Port, WorkloadSpec};
use crate::descriptor::{
    Container, ContainerPort, DeploymentDescriptor, DeploymentSpec, EnvVar, ExecAction, HostPath,
    LabelSelector, ObjectMeta, PodSpec, PodTemplate, Probe, Quantities, Resources,
    ServiceDescriptor, ServicePort, ServiceSpec, TemplateMeta, Volume, VolumeMount,
};
use crate::error::ComposeError;

/// Name of the injected discovery container.
pub const DISCOVERY_CONTAINER: &str = "discovery";

/// Env var injected into every container.
pub const HOME_ENV: &str = "HOME";

/// Default liveness probe timeout.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u32 = 5;

/// Upper bound on the liveness probe timeout.
pub const MAX_PROBE_TIMEOUT_SECS: u32 = 60;

const HOME_VOLUME: &str = "home";
const PULL_POLICY: &str = "Always";
const RESTART_POLICY: &str = "Always";
const DNS_POLICY: &str = "ClusterFirst";

/// Ambient identity the composer needs, captured once by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeContext {
    /// Namespace resources are created in.
    pub namespace: String,

    /// Value of the injected `HOME` variable.
    pub home: String,

    /// Liveness probe timeout in seconds.
    pub probe_timeout_secs: u32,
}

impl ComposeContext {
    /// Context for a tenant; the namespace is `tool-<tenant>`.
    pub fn new(tenant: &str, home: impl Into<String>) -> Self {
        Self {
            namespace: format!("tool-{tenant}"),
            home: home.into(),
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
        }
    }

    pub fn with_probe_timeout(mut self, seconds: u32) -> Self {
        self.probe_timeout_secs = seconds;
        self
    }
}

/// Result of a composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    pub mode: Mode,
    pub deployment: DeploymentDescriptor,
    pub service: Option<ServiceDescriptor>,
}

/// Compose the descriptors for `mode`.
///
/// An empty catalog, or a mode that includes nothing, still yields a
/// deployment holding only the discovery container.
pub fn compose(
    catalog: &Catalog,
    mode: Mode,
    ctx: &ComposeContext,
) -> Result<Composition, ComposeError> {
    if ctx.probe_timeout_secs == 0 || ctx.probe_timeout_secs > MAX_PROBE_TIMEOUT_SECS {
        return Err(ComposeError::InvalidProbeTimeout {
            seconds: ctx.probe_timeout_secs,
            max: MAX_PROBE_TIMEOUT_SECS,
        });
    }

    let included: Vec<&WorkloadSpec> = catalog.included(mode).collect();
    check_names(&included)?;

    let labels = BTreeMap::from([(catalog.role_label.clone(), catalog.deployment.clone())]);

    let mut containers = included
        .iter()
        .map(|w| workload_container(w, catalog, ctx))
        .collect::<Result<Vec<_>, _>>()?;
    containers.push(discovery_container(&included, catalog, ctx));

    let deployment = DeploymentDescriptor {
        api_version: "apps/v1".to_string(),
        kind: "Deployment".to_string(),
        metadata: ObjectMeta {
            name: catalog.deployment.clone(),
            namespace: ctx.namespace.clone(),
            labels: BTreeMap::new(),
        },
        spec: DeploymentSpec {
            selector: LabelSelector {
                match_labels: labels.clone(),
            },
            template: PodTemplate {
                metadata: TemplateMeta {
                    labels: labels.clone(),
                },
                spec: PodSpec {
                    containers,
                    dns_policy: DNS_POLICY.to_string(),
                    restart_policy: RESTART_POLICY.to_string(),
                    volumes: vec![Volume {
                        host_path: HostPath {
                            path: catalog.shared_root.clone(),
                            kind: "Directory".to_string(),
                        },
                        name: HOME_VOLUME.to_string(),
                    }],
                },
            },
        },
    };

    let service = compose_service(&included, &labels, ctx)?;

    Ok(Composition {
        mode,
        deployment,
        service,
    })
}

fn check_names(included: &[&WorkloadSpec]) -> Result<(), ComposeError> {
    let mut seen = BTreeSet::new();
    for workload in included {
        if workload.name == DISCOVERY_CONTAINER {
            return Err(ComposeError::ReservedName {
                name: workload.name.clone(),
            });
        }
        if !seen.insert(workload.name.as_str()) {
            return Err(ComposeError::DuplicateName {
                name: workload.name.clone(),
            });
        }
    }
    Ok(())
}

fn home_env(ctx: &ComposeContext) -> EnvVar {
    EnvVar {
        name: HOME_ENV.to_string(),
        value: ctx.home.clone(),
    }
}

fn home_mount(catalog: &Catalog) -> VolumeMount {
    VolumeMount {
        mount_path: catalog.shared_root.clone(),
        name: HOME_VOLUME.to_string(),
    }
}

fn workload_container(
    workload: &WorkloadSpec,
    catalog: &Catalog,
    ctx: &ComposeContext,
) -> Result<Container, ComposeError> {
    if workload.env.contains_key(HOME_ENV) {
        return Err(ComposeError::ReservedEnvKey {
            workload: workload.name.clone(),
            key: HOME_ENV.to_string(),
        });
    }

    let mut env = vec![home_env(ctx)];
    env.extend(workload.env.iter().map(|(name, value)| EnvVar {
        name: name.clone(),
        value: value.clone(),
    }));

    let quantities = Quantities {
        cpu: workload.limits.cpu.clone(),
        memory: workload.limits.memory.clone(),
    };

    Ok(Container {
        name: workload.name.clone(),
        image: workload.image.clone(),
        image_pull_policy: PULL_POLICY.to_string(),
        command: workload.command.clone(),
        env,
        ports: unique_ports(&workload.ports)
            .into_iter()
            .map(|p| ContainerPort {
                container_port: p.number,
                protocol: p.protocol.to_string(),
            })
            .collect(),
        resources: Some(Resources {
            limits: quantities.clone(),
            requests: quantities,
        }),
        volume_mounts: vec![home_mount(catalog)],
        working_dir: Some(workload.working_dir.clone()),
        liveness_probe: workload.liveness.as_ref().map(|command| Probe {
            exec: ExecAction {
                command: command.clone(),
            },
            timeout_seconds: ctx.probe_timeout_secs,
        }),
    })
}

fn discovery_container(
    included: &[&WorkloadSpec],
    catalog: &Catalog,
    ctx: &ComposeContext,
) -> Container {
    let mut command = catalog.discovery.command.clone();
    for workload in included {
        command.push("--task-name".to_string());
        command.push(workload.name.clone());
    }

    Container {
        name: DISCOVERY_CONTAINER.to_string(),
        image: catalog.discovery.image.clone(),
        image_pull_policy: PULL_POLICY.to_string(),
        command,
        env: vec![home_env(ctx)],
        ports: Vec::new(),
        resources: None,
        volume_mounts: vec![home_mount(catalog)],
        working_dir: None,
        liveness_probe: None,
    }
}

fn compose_service(
    included: &[&WorkloadSpec],
    labels: &BTreeMap<String, String>,
    ctx: &ComposeContext,
) -> Result<Option<ServiceDescriptor>, ComposeError> {
    let mut exposed = included.iter().filter(|w| w.expose.is_some());
    let Some(workload) = exposed.next() else {
        return Ok(None);
    };
    if let Some(other) = exposed.next() {
        return Err(ComposeError::MultipleServices {
            first: workload.name.clone(),
            second: other.name.clone(),
        });
    }
    let Some(exposure) = workload.expose.as_ref() else {
        return Ok(None);
    };

    let declared = unique_ports(&workload.ports);
    let published: Vec<Port> = if exposure.ports.is_empty() {
        declared
    } else {
        let mut out = Vec::new();
        for number in &exposure.ports {
            let matches: Vec<Port> = declared
                .iter()
                .filter(|p| p.number == *number)
                .copied()
                .collect();
            if matches.is_empty() {
                return Err(ComposeError::UndeclaredPort {
                    workload: workload.name.clone(),
                    port: *number,
                });
            }
            for port in matches {
                if !out.contains(&port) {
                    out.push(port);
                }
            }
        }
        out
    };
    if published.is_empty() {
        return Err(ComposeError::NoExposedPorts {
            workload: workload.name.clone(),
            service: exposure.service.clone(),
        });
    }

    Ok(Some(ServiceDescriptor {
        api_version: "v1".to_string(),
        kind: "Service".to_string(),
        metadata: ObjectMeta {
            name: exposure.service.clone(),
            namespace: ctx.namespace.clone(),
            labels: labels.clone(),
        },
        spec: ServiceSpec {
            selector: labels.clone(),
            ports: published
                .into_iter()
                .map(|p| ServicePort {
                    name: format!("{}-{}", p.protocol.as_str().to_lowercase(), p.number),
                    port: p.number,
                    target_port: p.number,
                    protocol: p.protocol.to_string(),
                })
                .collect(),
        },
    }))
}

/// Declared ports with repeats dropped, first occurrence wins.
fn unique_ports(ports: &[Port]) -> Vec<Port> {
    let mut seen = BTreeSet::new();
    ports.iter().filter(|p| seen.insert(**p)).copied().collect()
}
