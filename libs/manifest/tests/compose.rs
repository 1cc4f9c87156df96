//! Composition tests against the built-in catalog and generated catalogs.

use std::collections::{BTreeMap, HashSet};

use proptest::prelude::*;
use rstest::rstest;
use toolpod_manifest::{
    compose, Catalog, ComposeContext, ComposeError, DiscoverySpec, Inclusion, Mode, Port,
    Resource, ResourceLimits, WorkloadSpec, DISCOVERY_CONTAINER,
};

fn ctx() -> ComposeContext {
    ComposeContext::new("cluebotng", "/data/project/cluebotng")
}

fn empty_catalog() -> Catalog {
    Catalog {
        deployment: "demo".to_string(),
        role_label: "example.org/role".to_string(),
        shared_root: "/srv".to_string(),
        discovery: DiscoverySpec {
            image: "registrar:latest".to_string(),
            command: vec!["registrar".to_string()],
        },
        workloads: Vec::new(),
    }
}

#[rstest]
#[case::primary(Mode::Primary, &["core", "bot", "irc-relay", "discovery"])]
#[case::alternate(Mode::Alternate, &["core", "botng", "grafana-alloy", "discovery"])]
fn builtin_catalog_membership(#[case] mode: Mode, #[case] expected: &[&str]) {
    let catalog = Catalog::builtin().unwrap();
    let composition = compose(&catalog, mode, &ctx()).unwrap();
    assert_eq!(composition.deployment.container_names(), expected);
}

#[test]
fn discovery_registers_every_included_task() {
    let catalog = Catalog::builtin().unwrap();
    let composition = compose(&catalog, Mode::Alternate, &ctx()).unwrap();
    let discovery = composition.deployment.container(DISCOVERY_CONTAINER).unwrap();

    assert_eq!(
        discovery.command,
        vec![
            "/data/project/cluebotng/apps/utilities/toolpod-registrar",
            "--task-name",
            "core",
            "--task-name",
            "botng",
            "--task-name",
            "grafana-alloy",
        ]
    );
    assert_eq!(discovery.env_value("HOME"), Some("/data/project/cluebotng"));
}

#[test]
fn builtin_deployment_document_shape() {
    let catalog = Catalog::builtin().unwrap();
    let composition = compose(&catalog, Mode::Primary, &ctx()).unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&composition.deployment.to_document().unwrap()).unwrap();

    assert_eq!(value["apiVersion"], "apps/v1");
    assert_eq!(value["kind"], "Deployment");
    assert_eq!(value["metadata"]["name"], "cbng");
    assert_eq!(value["metadata"]["namespace"], "tool-cluebotng");
    assert_eq!(
        value["spec"]["selector"]["matchLabels"]["cluebot.toolsforge.org/role"],
        "cbng"
    );
    assert_eq!(value["spec"]["template"]["spec"]["restartPolicy"], "Always");
    assert_eq!(
        value["spec"]["template"]["spec"]["volumes"][0]["hostPath"]["path"],
        "/data/project"
    );

    let bot = &value["spec"]["template"]["spec"]["containers"][1];
    assert_eq!(bot["name"], "bot");
    assert_eq!(bot["imagePullPolicy"], "Always");
    assert_eq!(bot["workingDir"], "/data/project/cluebotng/apps/bot");
    assert_eq!(bot["resources"]["requests"]["memory"], "2048Mi");
    assert_eq!(bot["livenessProbe"]["timeoutSeconds"], 5);
    assert_eq!(bot["volumeMounts"][0]["mountPath"], "/data/project");
}

#[test]
fn service_follows_mode() {
    let catalog = Catalog::builtin().unwrap();

    let primary = compose(&catalog, Mode::Primary, &ctx()).unwrap();
    let service = primary.service.expect("primary mode exposes the relay");
    assert_eq!(service.metadata.name, "cbng-irc-relay");
    assert_eq!(service.spec.ports[0].port, 3334);
    assert_eq!(service.spec.ports[0].protocol, "UDP");
    assert_eq!(
        service.spec.selector,
        primary.deployment.spec.selector.match_labels
    );

    let alternate = compose(&catalog, Mode::Alternate, &ctx()).unwrap();
    assert!(alternate.service.is_none());
}

#[test]
fn home_in_extra_env_is_an_invariant_violation() {
    let mut catalog = empty_catalog();
    catalog.workloads.push(
        WorkloadSpec::new(
            "web",
            "web:latest",
            "/srv/web",
            ["./web"],
            ResourceLimits::new("1", "1Gi"),
        )
        .with_env("HOME", "/tmp"),
    );

    let err = compose(&catalog, Mode::Primary, &ctx()).unwrap_err();
    assert!(err.is_invariant_violation());
    match err {
        ComposeError::ReservedEnvKey { workload, key } => {
            assert_eq!(workload, "web");
            assert_eq!(key, "HOME");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn duplicate_included_names_are_rejected() {
    let mut catalog = empty_catalog();
    let web = WorkloadSpec::new(
        "web",
        "web:latest",
        "/srv/web",
        ["./web"],
        ResourceLimits::new("1", "1Gi"),
    );
    catalog.workloads.push(web.clone());
    catalog.workloads.push(web.only_in(Inclusion::Primary));

    let err = compose(&catalog, Mode::Primary, &ctx()).unwrap_err();
    assert!(matches!(err, ComposeError::DuplicateName { ref name } if name == "web"));
    // Only the shared entry is included in the alternate mode.
    assert!(compose(&catalog, Mode::Alternate, &ctx()).is_ok());
}

#[test]
fn empty_catalog_is_valid() {
    let composition = compose(&empty_catalog(), Mode::Alternate, &ctx()).unwrap();
    assert_eq!(composition.deployment.container_names(), [DISCOVERY_CONTAINER]);
    assert_eq!(
        composition.deployment.container(DISCOVERY_CONTAINER).unwrap().command,
        vec!["registrar"]
    );
    assert!(composition.service.is_none());
}

#[test]
fn rendered_documents_are_byte_identical() {
    let catalog = Catalog::builtin().unwrap();
    for mode in [Mode::Primary, Mode::Alternate] {
        let a = compose(&catalog, mode, &ctx()).unwrap();
        let b = compose(&catalog, mode, &ctx()).unwrap();
        assert_eq!(
            a.deployment.to_document().unwrap(),
            b.deployment.to_document().unwrap()
        );
        assert_eq!(
            a.deployment.fingerprint().unwrap(),
            b.deployment.fingerprint().unwrap()
        );
    }
}

fn inclusion_strategy() -> impl Strategy<Value = Inclusion> {
    prop_oneof![
        Just(Inclusion::Always),
        Just(Inclusion::Primary),
        Just(Inclusion::Alternate),
    ]
}

fn workload_strategy() -> impl Strategy<Value = WorkloadSpec> {
    (
        "[a-z]{1,3}",
        inclusion_strategy(),
        proptest::collection::btree_map("[A-Z]{1,4}", "[a-z0-9]{0,4}", 0..3),
        proptest::collection::vec((1u16..1024, any::<bool>()), 0..3),
        proptest::option::of(proptest::collection::vec("[a-z./]{1,6}", 1..3)),
    )
        .prop_map(|(name, inclusion, env, ports, liveness)| {
            let mut workload = WorkloadSpec::new(
                name.clone(),
                format!("{name}:latest"),
                format!("/srv/{name}"),
                [format!("./{name}")],
                ResourceLimits::new("0.1", "64Mi"),
            )
            .only_in(inclusion);
            workload.env = env.into_iter().collect::<BTreeMap<_, _>>();
            workload.ports = ports
                .into_iter()
                .map(|(n, udp)| if udp { Port::udp(n) } else { Port::tcp(n) })
                .collect();
            workload.liveness = liveness;
            workload
        })
}

fn catalog_strategy() -> impl Strategy<Value = Catalog> {
    proptest::collection::vec(workload_strategy(), 0..6).prop_map(|workloads| {
        let mut catalog = empty_catalog();
        catalog.workloads = workloads;
        catalog
    })
}

fn mode_strategy() -> impl Strategy<Value = Mode> {
    prop_oneof![Just(Mode::Primary), Just(Mode::Alternate)]
}

proptest! {
    #[test]
    fn compose_is_deterministic(catalog in catalog_strategy(), mode in mode_strategy()) {
        let a = compose(&catalog, mode, &ctx());
        let b = compose(&catalog, mode, &ctx());
        match (a, b) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(
                    a.deployment.to_document().unwrap(),
                    b.deployment.to_document().unwrap()
                );
                prop_assert_eq!(a, b);
            }
            (Err(a), Err(b)) => prop_assert_eq!(a.reason_code(), b.reason_code()),
            _ => prop_assert!(false, "composition outcome differs between calls"),
        }
    }

    #[test]
    fn containers_trace_to_catalog(catalog in catalog_strategy(), mode in mode_strategy()) {
        if let Ok(composition) = compose(&catalog, mode, &ctx()) {
            let names = composition.deployment.container_names();
            let unique: HashSet<&str> = names.iter().copied().collect();
            prop_assert_eq!(unique.len(), names.len());

            let (last, workloads) = names.split_last().unwrap();
            prop_assert_eq!(*last, DISCOVERY_CONTAINER);

            let included: Vec<&str> = catalog.included(mode).map(|w| w.name.as_str()).collect();
            prop_assert_eq!(workloads.to_vec(), included);
            for name in workloads {
                let sources = catalog
                    .workloads
                    .iter()
                    .filter(|w| w.name == *name && w.inclusion.includes(mode))
                    .count();
                prop_assert_eq!(sources, 1);
            }
        }
    }
}
