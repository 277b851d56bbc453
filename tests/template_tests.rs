//! Integration coverage of the Template Engine rendering every backend and
//! frontend template set against a realistic `TemplateContext` (spec §4.4).

use egg::core::manifest::{BackendPorts, BackendService, FrontendService, Platform, Project, ProtoTemplate};
use egg::core::template_context::TemplateContext;
use egg::templates::TemplateEngine;

fn project_with_backend(proto: ProtoTemplate) -> Project {
    let mut project = Project::new("shop".into(), "example.com/shop".into());
    project.docker_registry = "ghcr.io/acme".into();
    project.backend.insert(
        "user".into(),
        BackendService {
            name: "user".into(),
            proto_template: proto,
            ports: BackendPorts { http: 8080, health: 8081, metrics: 9091 },
        },
    );
    project
}

#[test]
fn crud_template_set_renders_every_file_with_the_module_path() {
    let engine = TemplateEngine::new().unwrap();
    let ctx = TemplateContext::new(project_with_backend(ProtoTemplate::Crud));
    let backend_ctx = ctx.tera_context_for_backend("user");

    let go_mod = engine.render("backend_crud/go_mod.tera", &backend_ctx).unwrap();
    assert!(go_mod.contains("module example.com/shop/backend/user"));

    for template in [
        "backend_crud/cmd/server/main_go.tera",
        "backend_crud/internal/config/config_go.tera",
        "backend_crud/internal/handler/handler_go.tera",
        "backend_crud/internal/service/service_go.tera",
        "backend_crud/internal/repository/repository_go.tera",
        "backend_crud/internal/model/model_go.tera",
        "backend_crud/proto/service_proto.tera",
    ] {
        engine.render(template, &backend_ctx).unwrap_or_else(|e| panic!("{template} failed: {e}"));
    }
}

#[test]
fn echo_template_set_renders_with_a_minimal_context() {
    let engine = TemplateEngine::new().unwrap();
    let ctx = TemplateContext::new(project_with_backend(ProtoTemplate::Echo));
    let backend_ctx = ctx.tera_context_for_backend("user");

    for template in [
        "backend_echo/go_mod.tera",
        "backend_echo/cmd/server/main_go.tera",
        "backend_echo/internal/config/config_go.tera",
        "backend_echo/internal/handler/handler_go.tera",
        "backend_echo/proto/service_proto.tera",
    ] {
        engine.render(template, &backend_ctx).unwrap_or_else(|e| panic!("{template} failed: {e}"));
    }
}

#[test]
fn frontend_template_set_uses_hyphenated_id_for_package_naming_context() {
    let engine = TemplateEngine::new().unwrap();
    let mut project = Project::new("shop".into(), "example.com/shop".into());
    project.frontend.insert(
        "admin_portal".into(),
        FrontendService { name: "admin_portal".into(), platforms: vec![Platform::Web], web_port: 3000 },
    );
    let ctx = TemplateContext::new(project);
    let frontend_ctx = ctx.tera_context_for_frontend("admin_portal");

    let pubspec = engine.render("frontend/pubspec_yaml.tera", &frontend_ctx).unwrap();
    assert!(pubspec.contains("name: admin_portal"));
    engine.render("frontend/main_dart.tera", &frontend_ctx).unwrap();
}

#[test]
fn write_file_to_nested_destination_creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let engine = TemplateEngine::new().unwrap();
    let ctx = TemplateContext::new(project_with_backend(ProtoTemplate::Crud));
    let backend_ctx = ctx.tera_context_for_backend("user");

    let dest = dir.path().join("backend/user/cmd/server/main.go");
    let action = engine.write_file("backend_crud/cmd/server/main_go.tera", &dest, &backend_ctx, false).unwrap();
    assert_eq!(action, egg::templates::FileAction::Created);
    assert!(dest.exists());
}
