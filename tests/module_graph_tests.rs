//! Integration coverage for the Module Graph's reconciliation and
//! multi-module workspace behavior (spec §8.3 B3, §4.2, §4.5).

use egg::core::module_graph::{reconcile_generated_module, ModuleGraph};
use std::fs;

fn write_go_mod(dir: &std::path::Path, service: &str, content: &str) {
    let path = dir.join("backend").join(service).join("go.mod");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn reconcile_wires_multiple_backends_consistently_in_version_pin_mode() {
    let dir = tempfile::tempdir().unwrap();
    write_go_mod(dir.path(), "user", "module example.com/shop/backend/user\n\ngo 1.22\n");
    write_go_mod(dir.path(), "order", "module example.com/shop/backend/order\n\ngo 1.22\n");

    let mut graph = ModuleGraph::open(dir.path()).unwrap();
    let gen_path = reconcile_generated_module(&mut graph, "example.com/shop", "1.22", false).unwrap();
    graph.commit().unwrap();

    let user = fs::read_to_string(dir.path().join("backend/user/go.mod")).unwrap();
    let order = fs::read_to_string(dir.path().join("backend/order/go.mod")).unwrap();
    assert!(user.contains(&format!("require {gen_path} v0.0.0-dev")));
    assert!(order.contains(&format!("require {gen_path} v0.0.0-dev")));

    let workspace = fs::read_to_string(dir.path().join("backend/go.work")).unwrap();
    assert!(workspace.contains("use ./gen/go"));
}

#[test]
fn api_generate_with_gen_go_absent_creates_it_fresh() {
    let dir = tempfile::tempdir().unwrap();
    write_go_mod(dir.path(), "user", "module example.com/shop/backend/user\n\ngo 1.22\n");
    assert!(!dir.path().join("gen/go/go.mod").exists());

    let mut graph = ModuleGraph::open(dir.path()).unwrap();
    reconcile_generated_module(&mut graph, "example.com/shop", "1.22", true).unwrap();
    graph.commit().unwrap();

    assert!(dir.path().join("gen/go/go.mod").exists());
}

#[test]
fn reopening_after_commit_reflects_the_new_replace_directive() {
    let dir = tempfile::tempdir().unwrap();
    write_go_mod(dir.path(), "user", "module example.com/shop/backend/user\n\ngo 1.22\n");

    let mut graph = ModuleGraph::open(dir.path()).unwrap();
    reconcile_generated_module(&mut graph, "example.com/shop", "1.22", true).unwrap();
    graph.commit().unwrap();

    let reopened = ModuleGraph::open(dir.path()).unwrap();
    let user = &reopened.modules["example.com/shop/backend/user"];
    assert!(user.replaces.contains_key("example.com/shop/gen/go"));
}

#[test]
fn reconcile_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    write_go_mod(dir.path(), "user", "module example.com/shop/backend/user\n\ngo 1.22\n");

    let mut graph = ModuleGraph::open(dir.path()).unwrap();
    reconcile_generated_module(&mut graph, "example.com/shop", "1.22", false).unwrap();
    graph.commit().unwrap();

    let mut graph2 = ModuleGraph::open(dir.path()).unwrap();
    reconcile_generated_module(&mut graph2, "example.com/shop", "1.22", false).unwrap();
    graph2.commit().unwrap();

    let workspace = fs::read_to_string(dir.path().join("backend/go.work")).unwrap();
    assert_eq!(workspace.matches("use ./gen/go").count(), 1);
}
