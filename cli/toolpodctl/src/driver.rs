//! Cluster apply/delete driver.
//!
//! The control plane interface abstracts the two verbs we need:
//! - Declarative apply of a rendered document
//! - Imperative delete of a named resource
//!
//! `Kubectl` shells out to the cluster CLI. A mock implementation is
//! provided for testing. The driver never retries; diagnostics from the
//! control plane are kept verbatim for the operator.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use toolpod_manifest::{
    ComposeError, Composition, DeploymentDescriptor, Resource, ResourceKind, ServiceDescriptor,
};
use tracing::{debug, info, warn};

/// Successful control plane response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// Raw output from the control plane.
    pub output: String,
}

/// Apply failures.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The control plane client could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The control plane refused the document.
    #[error("control plane rejected {kind} {name} (exit {status}): {diagnostics}")]
    Rejected {
        kind: ResourceKind,
        name: String,
        status: i32,
        diagnostics: String,
    },

    /// The document could not be rendered.
    #[error(transparent)]
    Render(#[from] ComposeError),
}

impl ApplyError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            ApplyError::Spawn { .. } => "spawn_failed",
            ApplyError::Rejected { .. } => "rejected",
            ApplyError::Render(_) => "render_failed",
        }
    }
}

/// Delete failures.
#[derive(Debug, Error)]
pub enum DeleteError {
    /// The control plane client could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The resource does not exist.
    #[error("{kind} {name} not found")]
    NotFound {
        kind: ResourceKind,
        name: String,
        diagnostics: String,
    },

    /// The control plane refused the delete.
    #[error("control plane failed to delete {kind} {name} (exit {status}): {diagnostics}")]
    Failed {
        kind: ResourceKind,
        name: String,
        status: i32,
        diagnostics: String,
    },
}

impl DeleteError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            DeleteError::Spawn { .. } => "spawn_failed",
            DeleteError::NotFound { .. } => "not_found",
            DeleteError::Failed { .. } => "delete_failed",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DeleteError::NotFound { .. })
    }
}

/// Control plane interface.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Declaratively apply a rendered document.
    async fn apply(
        &self,
        kind: ResourceKind,
        name: &str,
        document: &str,
    ) -> Result<Ack, ApplyError>;

    /// Delete a named resource.
    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Ack, DeleteError>;
}

/// Control plane backed by the `kubectl` binary.
#[derive(Debug, Clone)]
pub struct Kubectl {
    program: PathBuf,
}

impl Kubectl {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
        }
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    async fn run(&self, args: &[&str], input: Option<&str>) -> std::io::Result<Output> {
        debug!(program = %self.program.display(), args = ?args, "running control plane client");

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(input) = input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).await?;
                stdin.shutdown().await?;
            }
        }

        child.wait_with_output().await
    }
}

/// Whether control plane diagnostics report a missing resource.
fn is_not_found(diagnostics: &str) -> bool {
    diagnostics.contains("(NotFound)") || diagnostics.contains(" not found")
}

#[async_trait]
impl ControlPlane for Kubectl {
    async fn apply(
        &self,
        kind: ResourceKind,
        name: &str,
        document: &str,
    ) -> Result<Ack, ApplyError> {
        let output = self
            .run(&["apply", "--validate=true", "-f", "-"], Some(document))
            .await
            .map_err(|source| ApplyError::Spawn {
                program: self.program_name(),
                source,
            })?;

        if !output.status.success() {
            return Err(ApplyError::Rejected {
                kind,
                name: name.to_string(),
                status: output.status.code().unwrap_or(-1),
                diagnostics: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(Ack {
            output: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        })
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Ack, DeleteError> {
        let output = self
            .run(
                &["delete", kind.as_str(), name, "--namespace", namespace],
                None,
            )
            .await
            .map_err(|source| DeleteError::Spawn {
                program: self.program_name(),
                source,
            })?;

        if !output.status.success() {
            let diagnostics = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if is_not_found(&diagnostics) {
                return Err(DeleteError::NotFound {
                    kind,
                    name: name.to_string(),
                    diagnostics,
                });
            }
            return Err(DeleteError::Failed {
                kind,
                name: name.to_string(),
                status: output.status.code().unwrap_or(-1),
                diagnostics,
            });
        }

        Ok(Ack {
            output: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        })
    }
}

/// In-memory control plane for testing.
#[derive(Debug, Default)]
pub struct MockControlPlane {
    /// Resources that currently "exist".
    existing: Mutex<BTreeSet<(ResourceKind, String)>>,

    /// Every document applied, in order.
    applied: Mutex<Vec<String>>,

    /// Whether applies should be rejected.
    reject_applies: bool,
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock control plane that rejects every apply.
    pub fn rejecting() -> Self {
        Self {
            reject_applies: true,
            ..Self::default()
        }
    }

    /// Seed an existing resource.
    pub fn with_existing(self, kind: ResourceKind, name: &str) -> Self {
        self.existing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((kind, name.to_string()));
        self
    }

    pub fn exists(&self, kind: ResourceKind, name: &str) -> bool {
        self.existing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&(kind, name.to_string()))
    }

    /// Documents applied so far.
    pub fn applied(&self) -> Vec<String> {
        self.applied
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn apply(
        &self,
        kind: ResourceKind,
        name: &str,
        document: &str,
    ) -> Result<Ack, ApplyError> {
        if self.reject_applies {
            return Err(ApplyError::Rejected {
                kind,
                name: name.to_string(),
                status: 1,
                diagnostics: format!("[MOCK] {kind} {name} rejected"),
            });
        }

        self.applied
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(document.to_string());
        let created = self
            .existing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((kind, name.to_string()));

        let verb = if created { "created" } else { "unchanged" };
        Ok(Ack {
            output: format!("{kind}/{name} {verb}"),
        })
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        _namespace: &str,
        name: &str,
    ) -> Result<Ack, DeleteError> {
        let removed = self
            .existing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(kind, name.to_string()));

        if !removed {
            return Err(DeleteError::NotFound {
                kind,
                name: name.to_string(),
                diagnostics: format!("[MOCK] {kind} \"{name}\" not found"),
            });
        }

        Ok(Ack {
            output: format!("{kind} \"{name}\" deleted"),
        })
    }
}

/// A resource the driver applied.
#[derive(Debug, Clone)]
pub struct Applied {
    pub kind: ResourceKind,
    pub name: String,
    pub fingerprint: String,
    pub ack: Ack,
}

/// A resource to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTarget {
    pub kind: ResourceKind,
    pub name: String,
    /// Whether absence counts as a failure.
    pub required: bool,
}

impl DeleteTarget {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            required: true,
        }
    }

    /// A target that may legitimately not exist, such as a service only
    /// another mode creates.
    pub fn best_effort(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::new(kind, name)
        }
    }
}

/// Outcome of one delete.
#[derive(Debug)]
pub enum DeleteOutcome {
    Deleted(Ack),
    Absent(String),
    Failed(DeleteError),
}

impl DeleteOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DeleteOutcome::Deleted(_) => "deleted",
            DeleteOutcome::Absent(_) => "absent",
            DeleteOutcome::Failed(_) => "failed",
        }
    }
}

/// Per-resource delete outcomes.
#[derive(Debug, Default)]
pub struct DeleteReport {
    pub entries: Vec<(DeleteTarget, DeleteOutcome)>,
}

impl DeleteReport {
    /// Number of targets that were not deleted. Absent best-effort targets
    /// do not count.
    pub fn failures(&self) -> usize {
        self.entries
            .iter()
            .filter(|(target, outcome)| match outcome {
                DeleteOutcome::Deleted(_) => false,
                DeleteOutcome::Absent(_) => target.required,
                DeleteOutcome::Failed(_) => true,
            })
            .count()
    }

    /// Whether the aggregate result must be escalated.
    ///
    /// With soft-fail every failure is swallowed; without it any counted
    /// failure, including an absent required target, is a hard failure.
    pub fn is_hard_failure(&self, soft_fail: bool) -> bool {
        !soft_fail && self.failures() > 0
    }
}

/// Driver over a control plane.
pub struct Driver<C> {
    control_plane: C,
}

impl<C: ControlPlane> Driver<C> {
    pub fn new(control_plane: C) -> Self {
        Self { control_plane }
    }

    pub fn control_plane(&self) -> &C {
        &self.control_plane
    }

    /// Apply a deployment descriptor.
    pub async fn apply(&self, descriptor: &DeploymentDescriptor) -> Result<Applied, ApplyError> {
        self.submit(descriptor).await
    }

    /// Apply a service descriptor.
    pub async fn apply_service(
        &self,
        descriptor: &ServiceDescriptor,
    ) -> Result<Applied, ApplyError> {
        self.submit(descriptor).await
    }

    /// Delete one named resource.
    pub async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Ack, DeleteError> {
        info!(kind = %kind, namespace, name, "deleting resource");
        self.control_plane.delete(kind, namespace, name).await
    }

    /// Apply the deployment, then the service if there is one.
    ///
    /// Stops at the first rejection.
    pub async fn apply_composition(
        &self,
        composition: &Composition,
    ) -> Result<Vec<Applied>, ApplyError> {
        let mut applied = vec![self.apply(&composition.deployment).await?];
        if let Some(service) = &composition.service {
            applied.push(self.apply_service(service).await?);
        }
        Ok(applied)
    }

    /// Delete every target, collecting per-resource outcomes.
    pub async fn delete_all(&self, namespace: &str, targets: &[DeleteTarget]) -> DeleteReport {
        let mut report = DeleteReport::default();
        for target in targets {
            let outcome = match self.delete(target.kind, namespace, &target.name).await {
                Ok(ack) => DeleteOutcome::Deleted(ack),
                Err(DeleteError::NotFound { diagnostics, .. }) => {
                    warn!(kind = %target.kind, name = %target.name, "resource already absent");
                    DeleteOutcome::Absent(diagnostics)
                }
                Err(e) => {
                    warn!(kind = %target.kind, name = %target.name, error = %e, "delete failed");
                    DeleteOutcome::Failed(e)
                }
            };
            report.entries.push((target.clone(), outcome));
        }
        report
    }

    async fn submit<R: Resource>(&self, resource: &R) -> Result<Applied, ApplyError> {
        let document = resource.to_document()?;
        let fingerprint = resource.fingerprint()?;
        info!(
            kind = %resource.kind(),
            name = resource.name(),
            namespace = resource.namespace(),
            fingerprint = %fingerprint,
            "applying resource"
        );

        let ack = self
            .control_plane
            .apply(resource.kind(), resource.name(), &document)
            .await?;

        Ok(Applied {
            kind: resource.kind(),
            name: resource.name().to_string(),
            fingerprint,
            ack,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_detection() {
        assert!(is_not_found(
            r#"Error from server (NotFound): deployments.apps "cbng" not found"#
        ));
        assert!(!is_not_found(
            "error: You must be logged in to the server (Unauthorized)"
        ));
    }

    #[test]
    fn report_escalation_honours_soft_fail() {
        let mut report = DeleteReport::default();
        report.entries.push((
            DeleteTarget::new(ResourceKind::Deployment, "cbng"),
            DeleteOutcome::Absent("not found".to_string()),
        ));
        assert_eq!(report.failures(), 1);
        assert!(report.is_hard_failure(false));
        assert!(!report.is_hard_failure(true));
    }

    #[test]
    fn clean_report_never_escalates() {
        let mut report = DeleteReport::default();
        report.entries.push((
            DeleteTarget::new(ResourceKind::Service, "relay"),
            DeleteOutcome::Deleted(Ack {
                output: "service \"relay\" deleted".to_string(),
            }),
        ));
        assert!(!report.is_hard_failure(false));
    }

    #[test]
    fn absent_best_effort_target_is_not_a_failure() {
        let mut report = DeleteReport::default();
        report.entries.push((
            DeleteTarget::best_effort(ResourceKind::Service, "relay"),
            DeleteOutcome::Absent("not found".to_string()),
        ));
        report.entries.push((
            DeleteTarget::best_effort(ResourceKind::Service, "other"),
            DeleteOutcome::Failed(DeleteError::Failed {
                kind: ResourceKind::Service,
                name: "other".to_string(),
                status: 1,
                diagnostics: "forbidden".to_string(),
            }),
        ));
        assert_eq!(report.failures(), 1);
    }
}
