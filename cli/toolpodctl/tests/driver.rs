//! Driver and front-end tests against the mock control plane.

use clap::Parser;
use rstest::rstest;
use toolpod_manifest::{compose, Catalog, ComposeContext, Mode, ResourceKind};
use toolpodctl::cli::{delete_targets, Cli};
use toolpodctl::driver::{ApplyError, DeleteOutcome, DeleteTarget, Driver, MockControlPlane};
use toolpodctl::environment::Environment;
use toolpodctl::error::CliError;

fn ctx() -> ComposeContext {
    ComposeContext::new("cluebotng", "/data/project/cluebotng")
}

fn env() -> Environment {
    Environment {
        home: "/data/project/cluebotng".to_string(),
        tenant: "cluebotng".to_string(),
    }
}

#[tokio::test]
async fn apply_submits_deployment_then_service() {
    let catalog = Catalog::builtin().unwrap();
    let composition = compose(&catalog, Mode::Primary, &ctx()).unwrap();
    let driver = Driver::new(MockControlPlane::new());

    let applied = driver.apply_composition(&composition).await.unwrap();
    assert_eq!(applied.len(), 2);
    assert_eq!(applied[0].kind, ResourceKind::Deployment);
    assert_eq!(applied[0].name, "cbng");
    assert_eq!(applied[1].kind, ResourceKind::Service);
    assert_eq!(applied[1].name, "cbng-irc-relay");

    let documents = driver.control_plane().applied();
    let deployment: serde_json::Value = serde_json::from_str(&documents[0]).unwrap();
    assert_eq!(deployment["metadata"]["namespace"], "tool-cluebotng");
    assert!(driver.control_plane().exists(ResourceKind::Service, "cbng-irc-relay"));
}

#[tokio::test]
async fn reapplying_is_a_no_op() {
    let catalog = Catalog::builtin().unwrap();
    let driver = Driver::new(MockControlPlane::new());

    let first = compose(&catalog, Mode::Alternate, &ctx()).unwrap();
    let second = compose(&catalog, Mode::Alternate, &ctx()).unwrap();
    let a = driver.apply(&first.deployment).await.unwrap();
    let b = driver.apply(&second.deployment).await.unwrap();

    assert_eq!(a.fingerprint, b.fingerprint);
    assert_eq!(a.ack.output, "deployment/cbng created");
    assert_eq!(b.ack.output, "deployment/cbng unchanged");

    let documents = driver.control_plane().applied();
    assert_eq!(documents[0], documents[1]);
}

#[tokio::test]
async fn rejection_keeps_diagnostics() {
    let catalog = Catalog::builtin().unwrap();
    let composition = compose(&catalog, Mode::Primary, &ctx()).unwrap();
    let driver = Driver::new(MockControlPlane::rejecting());

    let err = driver.apply(&composition.deployment).await.unwrap_err();
    assert_eq!(err.reason_code(), "rejected");
    match err {
        ApplyError::Rejected { diagnostics, .. } => {
            assert!(diagnostics.contains("deployment cbng rejected"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn delete_of_missing_resource_depends_on_soft_fail() {
    let driver = Driver::new(MockControlPlane::new());
    let targets = vec![DeleteTarget::new(ResourceKind::Deployment, "cbng")];

    let report = driver.delete_all("tool-cluebotng", &targets).await;
    assert!(matches!(report.entries[0].1, DeleteOutcome::Absent(_)));
    assert!(!report.is_hard_failure(true));
    assert!(report.is_hard_failure(false));
}

#[tokio::test]
async fn delete_tolerates_partial_absence() {
    let catalog = Catalog::builtin().unwrap();
    let driver = Driver::new(
        MockControlPlane::new().with_existing(ResourceKind::Deployment, "cbng"),
    );

    let report = driver
        .delete_all("tool-cluebotng", &delete_targets(&catalog, Mode::Primary))
        .await;
    assert!(matches!(report.entries[0].1, DeleteOutcome::Deleted(_)));
    assert!(matches!(report.entries[1].1, DeleteOutcome::Absent(_)));
    assert_eq!(report.failures(), 1);
    assert!(!driver.control_plane().exists(ResourceKind::Deployment, "cbng"));
}

#[tokio::test]
async fn strict_delete_exits_with_failure() {
    let cli = Cli::try_parse_from(["toolpodctl", "--delete"]).unwrap();
    let driver = Driver::new(MockControlPlane::new());

    let err = cli.run_with(&driver, &env()).await.unwrap_err();
    let cli_err = err.downcast_ref::<CliError>().unwrap();
    assert!(matches!(
        cli_err,
        CliError::DeleteIncomplete {
            failed: 2,
            total: 2
        }
    ));
}

#[tokio::test]
async fn recreate_swallows_missing_resources() {
    let cli = Cli::try_parse_from(["toolpodctl", "--delete", "--deploy", "--alternate"]).unwrap();
    let driver = Driver::new(MockControlPlane::new());

    cli.run_with(&driver, &env()).await.unwrap();

    assert!(driver.control_plane().exists(ResourceKind::Deployment, "cbng"));
    // The alternate variant exposes no service.
    assert!(!driver.control_plane().exists(ResourceKind::Service, "cbng-irc-relay"));
}

#[tokio::test]
async fn render_only_never_touches_the_cluster() {
    let cli = Cli::try_parse_from(["toolpodctl", "--render", "--format", "json"]).unwrap();
    let driver = Driver::new(MockControlPlane::new());

    cli.run_with(&driver, &env()).await.unwrap();
    assert!(driver.control_plane().applied().is_empty());
}

#[tokio::test]
async fn invariant_violation_stops_before_delete() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.toml");
    std::fs::write(
        &path,
        r#"
deployment = "demo"
role_label = "example.org/role"
shared_root = "/srv"

[discovery]
image = "registrar:latest"
command = ["registrar"]

[[workloads]]
name = "web"
image = "web:latest"
working_dir = "/srv/web"
command = ["./web"]
limits = { cpu = "1", memory = "1Gi" }

[workloads.env]
HOME = "/tmp"
"#,
    )
    .unwrap();

    let cli = Cli::try_parse_from([
        "toolpodctl",
        "--delete",
        "--deploy",
        "--catalog",
        path.to_str().unwrap(),
    ])
    .unwrap();
    let driver = Driver::new(MockControlPlane::new().with_existing(ResourceKind::Deployment, "demo"));

    let err = cli.run_with(&driver, &env()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CliError>(),
        Some(CliError::Compose(_))
    ));
    assert!(driver.control_plane().exists(ResourceKind::Deployment, "demo"));
    assert!(driver.control_plane().applied().is_empty());
}

#[rstest]
#[case::primary(&["toolpodctl", "--deploy"], true)]
#[case::alternate(&["toolpodctl", "--deploy", "--alternate"], false)]
#[tokio::test]
async fn deploy_exposes_service_per_mode(#[case] args: &[&str], #[case] exposed: bool) {
    let cli = Cli::try_parse_from(args.iter().copied()).unwrap();
    let driver = Driver::new(MockControlPlane::new());

    cli.run_with(&driver, &env()).await.unwrap();

    assert!(driver.control_plane().exists(ResourceKind::Deployment, "cbng"));
    assert_eq!(
        driver.control_plane().exists(ResourceKind::Service, "cbng-irc-relay"),
        exposed
    );
}

#[tokio::test]
async fn strict_delete_after_alternate_deploy_succeeds() {
    let driver = Driver::new(MockControlPlane::new());

    let deploy = Cli::try_parse_from(["toolpodctl", "--deploy", "--alternate"]).unwrap();
    deploy.run_with(&driver, &env()).await.unwrap();

    // The relay service only exists after a primary deploy.
    let delete = Cli::try_parse_from(["toolpodctl", "--delete", "--alternate"]).unwrap();
    delete.run_with(&driver, &env()).await.unwrap();

    assert!(!driver.control_plane().exists(ResourceKind::Deployment, "cbng"));
}

#[tokio::test]
async fn strict_delete_in_primary_mode_requires_the_service() {
    let driver = Driver::new(
        MockControlPlane::new().with_existing(ResourceKind::Deployment, "cbng"),
    );

    let delete = Cli::try_parse_from(["toolpodctl", "--delete"]).unwrap();
    let err = delete.run_with(&driver, &env()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CliError>(),
        Some(CliError::DeleteIncomplete {
            failed: 1,
            total: 2
        })
    ));
}
