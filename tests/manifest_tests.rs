//! Integration coverage for the Manifest Store across formats and
//! round-trip fidelity of fields the unit tests in `core::manifest` don't
//! already cover (spec §8.3 B1/B2).

use egg::core::manifest::{
    BackendPorts, BackendService, DatabaseConfig, FrontendService, ManifestStore, Platform, Project,
    ProtoTemplate,
};

#[test]
fn unknown_keys_round_trip_through_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = ManifestStore::at_repo_root(dir.path());
    let mut project = Project::new("shop".into(), "example.com/shop".into());
    project
        .unknown
        .insert("future_field".to_string(), serde_yaml::Value::String("kept".to_string()));
    store.save(&project).unwrap();

    let raw = std::fs::read_to_string(store.path()).unwrap();
    assert!(raw.contains("future_field"));

    let loaded = store.load().unwrap();
    assert_eq!(
        loaded.unknown.get("future_field"),
        Some(&serde_yaml::Value::String("kept".to_string()))
    );
}

#[test]
fn database_and_infrastructure_defaults_are_inert_when_unset() {
    let dir = tempfile::tempdir().unwrap();
    let store = ManifestStore::at_repo_root(dir.path());
    let project = Project::new("shop".into(), "example.com/shop".into());
    store.save(&project).unwrap();
    let loaded = store.load().unwrap();
    assert!(!loaded.database.enabled);
    assert_eq!(loaded.database.image, "mysql:9.4");
    assert!(!loaded.infrastructure.observability.enabled);
    assert!(!loaded.infrastructure.tracing.enabled);
}

#[test]
fn full_mixed_topology_round_trips_field_for_field() {
    let dir = tempfile::tempdir().unwrap();
    let store = ManifestStore::at_repo_root(dir.path());
    let mut project = Project::new("shop".into(), "example.com/shop".into());
    project.docker_registry = "ghcr.io/acme".into();
    project.backend.insert(
        "user".into(),
        BackendService {
            name: "user".into(),
            proto_template: ProtoTemplate::Crud,
            ports: BackendPorts { http: 8080, health: 8081, metrics: 9091 },
        },
    );
    project.frontend.insert(
        "admin_portal".into(),
        FrontendService {
            name: "admin_portal".into(),
            platforms: vec![Platform::Web, Platform::Android],
            web_port: 3000,
        },
    );
    project.database = DatabaseConfig {
        enabled: true,
        image: "mysql:9.4".into(),
        root_password: "rootpass".into(),
        database: "app".into(),
        user: "user".into(),
        password: "pass".into(),
    };

    store.save(&project).unwrap();
    let loaded = store.load().unwrap();
    assert_eq!(loaded.backend, project.backend);
    assert_eq!(loaded.frontend, project.frontend);
    assert_eq!(loaded.database, project.database);
}

#[test]
fn manifest_invalid_preflight_rejects_duplicate_port_within_same_service() {
    let dir = tempfile::tempdir().unwrap();
    let store = ManifestStore::at_repo_root(dir.path());
    let mut project = Project::new("shop".into(), "example.com/shop".into());
    project.backend.insert(
        "user".into(),
        BackendService {
            name: "user".into(),
            proto_template: ProtoTemplate::Echo,
            ports: BackendPorts { http: 8080, health: 8080, metrics: 9091 },
        },
    );
    let result = store.save(&project);
    assert!(matches!(result, Err(egg::core::error::EggError::ManifestInvalid(_))));
}
