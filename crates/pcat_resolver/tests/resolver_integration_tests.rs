//! Integration tests for resolution and planning.

use std::sync::Arc;
use std::thread;

use pcat_catalog::{Catalog, CatalogSnapshot, ResolverSettings, VersionConstraint};
use pcat_resolver::{
    plan, BindingSource, CancellationToken, CompositionService, ParameterOverrides, ResolveError,
    Resolver,
};
use serde_json::json;

fn catalog(manifests: &[&str]) -> Catalog {
    let catalog = Catalog::in_memory();
    for manifest in manifests {
        catalog.register(manifest.as_bytes(), manifest).unwrap();
    }
    catalog
}

fn any() -> VersionConstraint {
    VersionConstraint::any()
}

fn resolve(snapshot: &CatalogSnapshot, name: &str) -> Result<pcat_resolver::ResolvedClosure, ResolveError> {
    Resolver::default().resolve(snapshot, name, &any(), &CancellationToken::new())
}

const NETWORK: &str = "
name: network
version: 1.0.0
outputs:
  - name: vpcId
    type: string
";

const APP: &str = "
name: app
version: 1.0.0
dependencies:
  - name: network
    version: '>=1.0'
parameters:
  - name: vpcId
    type: string
    required: true
";

#[test]
fn test_network_app_composition() {
    let catalog = catalog(&[NETWORK, APP]);
    let closure = resolve(&catalog.snapshot(), "app").unwrap();
    assert_eq!(closure.len(), 2);
    assert_eq!(closure.get("network").unwrap().version.to_string(), "1.0.0");
    assert_eq!(closure.get("app").unwrap().version.to_string(), "1.0.0");

    let plan = plan(&closure, &ParameterOverrides::new()).unwrap();
    assert_eq!(plan.step_names(), vec!["network", "app"]);
    assert_eq!(
        plan.step("app").unwrap().bound_inputs["vpcId"],
        BindingSource::Output {
            step: "network".to_string(),
            output: "vpcId".to_string(),
        }
    );
    assert_eq!(plan.step("app").unwrap().depends_on, vec!["network"]);
}

#[test]
fn test_unsatisfiable_reports_chain_and_available() {
    let catalog = catalog(&[
        "name: app\nversion: 1.0\ndependencies: ['lib@^1.0']\n",
        "name: lib\nversion: 2.0.0\n",
    ]);
    let err = resolve(&catalog.snapshot(), "app").unwrap_err();
    match &err {
        ResolveError::Unsatisfiable {
            name,
            requirements,
            available,
        } => {
            assert_eq!(name, "lib");
            assert_eq!(requirements.len(), 1);
            assert_eq!(
                requirements[0].required_by.as_ref().unwrap().to_string(),
                "app@1.0.0"
            );
            assert_eq!(requirements[0].constraint.as_str(), "^1.0");
            assert_eq!(available.len(), 1);
            assert_eq!(available[0].to_string(), "2.0.0");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("app@1.0.0 -> lib@^1.0 against available {2.0.0}"));
}

#[test]
fn test_two_node_cycle_names_exact_cycle() {
    let catalog = catalog(&[
        "name: A\nversion: 1.0.0\ndependencies: [B]\n",
        "name: B\nversion: 1.0.0\ndependencies: [A]\n",
    ]);
    match resolve(&catalog.snapshot(), "A").unwrap_err() {
        ResolveError::CyclicDependency { cycle } => assert_eq!(cycle, vec!["A", "B", "A"]),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_highest_version_beats_classification() {
    let catalog = catalog(&[
        "name: lib\nversion: 1.0.0+cert\nclassification: certified\n",
        "name: lib\nversion: 1.1.0\nclassification: starter\n",
    ]);
    let closure = resolve(&catalog.snapshot(), "lib").unwrap();
    assert_eq!(closure.get("lib").unwrap().version.to_string(), "1.1.0");
}

#[test]
fn test_classification_breaks_exact_version_tie() {
    let catalog = catalog(&[
        "name: lib\nversion: 1.2.0+starter\nclassification: starter\n",
        "name: lib\nversion: 1.2.0+cert\nclassification: certified\n",
        "name: lib\nversion: 1.2.0+team\nclassification: community\n",
    ]);
    let closure = resolve(&catalog.snapshot(), "lib").unwrap();
    assert_eq!(closure.get("lib").unwrap().version.to_string(), "1.2.0+cert");
}

#[test]
fn test_step_budget_exhausted() {
    let catalog = catalog(&[NETWORK, APP]);
    let err = Resolver::with_step_budget(1)
        .resolve(&catalog.snapshot(), "app", &any(), &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, ResolveError::ResolutionTimeout { steps: 1 }));
}

#[test]
fn test_cancelled_resolution() {
    let catalog = catalog(&[NETWORK, APP]);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = Resolver::default()
        .resolve(&catalog.snapshot(), "app", &any(), &cancel)
        .unwrap_err();
    assert!(matches!(err, ResolveError::Cancelled));
}

#[test]
fn test_plan_is_topological() {
    let catalog = catalog(&[
        "name: app\nversion: 1.0.0\ndependencies: [db, network, queue]\n",
        "name: db\nversion: 1.0.0\ndependencies: [network]\n",
        "name: queue\nversion: 1.0.0\ndependencies: [db]\n",
        "name: network\nversion: 1.0.0\n",
    ]);
    let closure = resolve(&catalog.snapshot(), "app").unwrap();
    let plan = plan(&closure, &ParameterOverrides::new()).unwrap();
    assert!(plan.is_topologically_ordered());
    assert_eq!(plan.step_names(), vec!["network", "db", "queue", "app"]);
}

#[test]
fn test_explicit_source_wins_over_name_match() {
    let catalog = catalog(&[
        "name: edge\nversion: 1.0.0\noutputs:\n  - name: vpcId\n  - name: sharedVpc\n",
        "name: core\nversion: 1.0.0\noutputs:\n  - name: vpcId\n",
        "name: svc\nversion: 1.0.0\ndependencies: [core, edge]\nparameters:\n  - name: vpcId\n    source: edge.sharedVpc\n",
    ]);
    let closure = resolve(&catalog.snapshot(), "svc").unwrap();
    let plan = plan(&closure, &ParameterOverrides::new()).unwrap();
    assert_eq!(
        plan.step("svc").unwrap().bound_inputs["vpcId"],
        BindingSource::Output {
            step: "edge".to_string(),
            output: "sharedVpc".to_string(),
        }
    );
}

#[test]
fn test_override_beats_upstream_output() {
    let catalog = catalog(&[NETWORK, APP]);
    let closure = resolve(&catalog.snapshot(), "app").unwrap();
    let overrides = ParameterOverrides::parse_assignments(&["app.vpcId=vpc-123"]).unwrap();
    let plan = plan(&closure, &overrides).unwrap();
    assert_eq!(
        plan.step("app").unwrap().bound_inputs["vpcId"],
        BindingSource::Override {
            value: json!("vpc-123")
        }
    );
}

#[test]
fn test_parallel_resolutions_agree() {
    let catalog = catalog(&[
        NETWORK,
        APP,
        "name: network\nversion: 1.3.0\noutputs:\n  - name: vpcId\n",
    ]);
    let snapshot = Arc::new(catalog.snapshot());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let snapshot = snapshot.clone();
            thread::spawn(move || {
                let closure = resolve(&snapshot, "app").unwrap();
                closure.get("network").unwrap().version.to_string()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), "1.3.0");
    }
}

#[test]
fn test_snapshot_ignores_concurrent_registration() {
    let catalog = catalog(&[NETWORK, APP]);
    let snapshot = catalog.snapshot();
    catalog
        .register(b"newer", "name: network\nversion: 2.0.0\noutputs:\n  - name: vpcId\n")
        .unwrap();

    let closure = resolve(&snapshot, "app").unwrap();
    assert_eq!(closure.get("network").unwrap().version.to_string(), "1.0.0");
    assert_eq!(closure.generation(), snapshot.generation());

    let fresh = resolve(&catalog.snapshot(), "app").unwrap();
    assert_eq!(fresh.get("network").unwrap().version.to_string(), "2.0.0");
}

#[test]
fn test_service_compose_end_to_end() {
    let catalog = catalog(&[NETWORK, APP]);
    let service = CompositionService::new(catalog, &ResolverSettings::default());
    let constraint: VersionConstraint = "^1".parse().unwrap();
    let plan = service
        .compose("app", &constraint, &ParameterOverrides::new(), &CancellationToken::new())
        .unwrap();

    let json = serde_json::to_string(&plan).unwrap();
    let back: pcat_resolver::CompositionPlan = serde_json::from_str(&json).unwrap();
    assert_eq!(back, plan);
    assert_eq!(back.root.constraint.as_str(), "^1");
}

#[test]
fn test_compose_over_reopened_filesystem_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(pcat_catalog::FsBackend::open(dir.path()).unwrap());
    let catalog = Catalog::open(backend).unwrap();
    catalog.register(NETWORK.as_bytes(), NETWORK).unwrap();
    catalog.register(APP.as_bytes(), APP).unwrap();
    drop(catalog);

    let backend = Arc::new(pcat_catalog::FsBackend::open(dir.path()).unwrap());
    let service = CompositionService::new(Catalog::open(backend).unwrap(), &ResolverSettings::default());
    let plan = service
        .compose("app", &any(), &ParameterOverrides::new(), &CancellationToken::new())
        .unwrap();
    assert_eq!(plan.step_names(), vec!["network", "app"]);
}
