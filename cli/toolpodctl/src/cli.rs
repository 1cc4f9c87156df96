//! Command-line front end.
//!
//! Three independent intents: delete, deploy, and the mode selector. When
//! both delete and deploy are given the old resources are deleted first, so
//! the pair acts as a recreate.

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser};
use toolpod_manifest::{
    compose, Catalog, Composition, Mode, Resource, ResourceKind, DEFAULT_PROBE_TIMEOUT_SECS,
};
use tracing::{debug, info, warn};

use crate::driver::{ControlPlane, DeleteTarget, Driver, Kubectl};
use crate::environment::Environment;
use crate::error::CliError;
use crate::output::{
    container_rows, delete_rows, print_info, print_output, print_success, print_warning,
    JsonReport, OutputFormat,
};

/// Compose the tool's workload pod and apply it to the cluster.
#[derive(Debug, Parser)]
#[command(name = "toolpodctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Apply the composed deployment (and service, if any).
    #[arg(long)]
    pub deploy: bool,

    /// Delete the deployment and every service the catalog can expose.
    #[arg(long)]
    pub delete: bool,

    /// Deploy the alternate application variant.
    #[arg(long)]
    pub alternate: bool,

    /// Increase log verbosity (repeatable).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Print the composed documents without contacting the cluster.
    #[arg(long)]
    pub render: bool,

    /// Do not fail when deletions fail. Implied by --deploy.
    #[arg(long)]
    pub soft_fail: bool,

    /// Catalog file (TOML). Defaults to the built-in catalog.
    #[arg(long, env = "TOOLPOD_CATALOG", value_name = "PATH")]
    pub catalog: Option<PathBuf>,

    /// Liveness probe timeout in seconds.
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_PROBE_TIMEOUT_SECS)]
    pub probe_timeout: u32,

    /// Output format (table or json).
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,

    /// Tenant to deploy as. Defaults to the tool account running the command.
    #[arg(long, env = "TOOLPOD_TENANT")]
    pub tenant: Option<String>,

    /// Path to the kubectl binary.
    #[arg(long, env = "KUBECTL", default_value = "kubectl")]
    pub kubectl: PathBuf,
}

impl Cli {
    /// Whether failed deletions are swallowed.
    pub fn soft_fail(&self) -> bool {
        self.soft_fail || self.deploy
    }

    pub fn mode(&self) -> Mode {
        Mode::select(self.alternate)
    }

    /// Run against the real cluster.
    pub async fn run(self) -> Result<()> {
        let driver = Driver::new(Kubectl::new(&self.kubectl));
        let env = Environment::from_env(self.tenant.clone())?;
        self.run_with(&driver, &env).await
    }

    /// Run against any control plane.
    pub async fn run_with<C: ControlPlane>(
        &self,
        driver: &Driver<C>,
        env: &Environment,
    ) -> Result<()> {
        if !self.deploy && !self.delete && !self.render {
            print_info("Nothing to do. Pass --deploy, --delete or --render.");
            return Ok(());
        }

        let catalog = match &self.catalog {
            Some(path) => Catalog::from_path(path).map_err(CliError::from)?,
            None => Catalog::builtin().map_err(CliError::from)?,
        };
        let ctx = env
            .compose_context()
            .with_probe_timeout(self.probe_timeout);
        let mode = self.mode();
        debug!(tenant = %env.tenant, namespace = %ctx.namespace, %mode, "resolved context");

        // Compose up front so invariant violations stop us before any delete.
        let composition = if self.deploy || self.render {
            Some(compose(&catalog, mode, &ctx).map_err(CliError::from)?)
        } else {
            None
        };

        // In JSON mode every section is collected and printed as one document.
        let mut json = JsonReport::default();

        if let (true, Some(composition)) = (self.render, composition.as_ref()) {
            self.render(composition, &mut json)?;
        }

        if self.delete {
            let targets = delete_targets(&catalog, mode);
            let report = driver.delete_all(&ctx.namespace, &targets).await;
            match self.format {
                OutputFormat::Json => {
                    json.push("deleted", serde_json::to_value(delete_rows(&report))?);
                }
                OutputFormat::Table => print_output(&delete_rows(&report), OutputFormat::Table),
            }

            let failed = report.failures();
            if report.is_hard_failure(self.soft_fail()) {
                json.print();
                return Err(CliError::DeleteIncomplete {
                    failed,
                    total: targets.len(),
                }
                .into());
            }
            if failed > 0 {
                let message = format!(
                    "{failed} of {} deletions did not succeed (ignored)",
                    targets.len()
                );
                match self.format {
                    OutputFormat::Json => warn!("{message}"),
                    OutputFormat::Table => print_warning(&message),
                }
            }
        }

        if let (true, Some(composition)) = (self.deploy, composition.as_ref()) {
            info!(%mode, "applying composition");
            let applied = match driver.apply_composition(composition).await {
                Ok(applied) => applied,
                Err(e) => {
                    json.print();
                    return Err(CliError::from(e).into());
                }
            };

            match self.format {
                OutputFormat::Json => {
                    let out: Vec<serde_json::Value> = applied
                        .iter()
                        .map(|a| {
                            serde_json::json!({
                                "kind": a.kind.as_str(),
                                "name": a.name,
                                "fingerprint": a.fingerprint,
                                "output": a.ack.output,
                            })
                        })
                        .collect();
                    json.push("applied", serde_json::Value::Array(out));
                }
                OutputFormat::Table => {
                    for a in &applied {
                        print_success(&format!("Applied {} {} ({})", a.kind, a.name, a.fingerprint));
                        if !a.ack.output.is_empty() {
                            println!("{}", a.ack.output);
                        }
                    }
                }
            }
        }

        json.print();
        Ok(())
    }

    fn render(&self, composition: &Composition, json: &mut JsonReport) -> Result<()> {
        let mut items = vec![serde_json::to_value(&composition.deployment)?];
        if let Some(service) = &composition.service {
            items.push(serde_json::to_value(service)?);
        }

        match self.format {
            OutputFormat::Json => {
                json.push(
                    "rendered",
                    serde_json::json!({
                        "apiVersion": "v1",
                        "kind": "List",
                        "items": items,
                    }),
                );
            }
            OutputFormat::Table => {
                for item in &items {
                    println!("{}", serde_json::to_string_pretty(item)?);
                }
                print_output(&container_rows(composition), OutputFormat::Table);
                print_info(&format!(
                    "mode: {}, deployment fingerprint: {}",
                    composition.mode,
                    composition
                        .deployment
                        .fingerprint()
                        .map_err(CliError::from)?
                ));
            }
        }

        Ok(())
    }
}

/// Resources removed by `--delete`: the deployment plus every service any
/// mode can expose, so switching modes does not strand a service.
///
/// Services that `mode` does not expose are best-effort, since they only
/// exist if an earlier deploy used the other mode.
pub fn delete_targets(catalog: &Catalog, mode: Mode) -> Vec<DeleteTarget> {
    let exposed: Vec<&str> = catalog
        .included(mode)
        .filter_map(|w| w.expose.as_ref().map(|e| e.service.as_str()))
        .collect();

    let mut targets = vec![DeleteTarget::new(
        ResourceKind::Deployment,
        catalog.deployment.clone(),
    )];
    targets.extend(catalog.service_names().into_iter().map(|name| {
        if exposed.contains(&name) {
            DeleteTarget::new(ResourceKind::Service, name)
        } else {
            DeleteTarget::best_effort(ResourceKind::Service, name)
        }
    }));
    targets
}
