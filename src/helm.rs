//! Helm Emitter (C8): projects the manifest into a single project-scoped
//! chart (spec §4.8).

use crate::core::error::EggError;
use crate::core::manifest::Project;
use crate::core::template_context::{hyphenated, TemplateContext};
use crate::templates::{write_rendered, FileAction, TemplateEngine};
use std::path::{Path, PathBuf};

pub struct HelmReport {
    pub chart_dir: PathBuf,
    pub actions: Vec<(String, FileAction)>,
}

/// `kube generate`: stateless and idempotent — every file this emitter owns
/// (Chart.yaml, values.yaml, templates/*) is regenerated on each run (spec
/// §4.8). The prompt-before-overwrite carve-out in the spec applies only to
/// files an operator places under the chart directory outside this
/// generated set, which this emitter never touches in the first place.
pub fn generate(repo_root: &Path, project: &Project, engine: &TemplateEngine) -> Result<HelmReport, EggError> {
    let chart_dir = repo_root.join("deploy/helm").join(&project.project_name);
    let mut actions = Vec::new();

    let project_ctx = project_values_context(project);
    let chart_yaml = engine.render("helm/chart_yaml.tera", &project_ctx)?;
    let values_yaml = engine.render("helm/values_yaml.tera", &project_ctx)?;

    actions.push((
        "Chart.yaml".to_string(),
        write_rendered(&chart_dir.join("Chart.yaml"), chart_yaml.as_bytes(), true)?,
    ));
    actions.push((
        "values.yaml".to_string(),
        write_rendered(&chart_dir.join("values.yaml"), values_yaml.as_bytes(), true)?,
    ));

    let ctx = TemplateContext::new(project.clone());
    for service_id in project.backend.keys() {
        let backend_ctx = ctx.tera_context_for_backend(service_id);
        let deployment = engine.render("helm/backend_deployment_yaml.tera", &backend_ctx)?;
        let service = engine.render("helm/backend_service_yaml.tera", &backend_ctx)?;
        let name = hyphenated(service_id);
        actions.push((
            format!("templates/{name}-deployment.yaml"),
            write_rendered(
                &chart_dir.join("templates").join(format!("{name}-deployment.yaml")),
                deployment.as_bytes(),
                true,
            )?,
        ));
        actions.push((
            format!("templates/{name}-service.yaml"),
            write_rendered(
                &chart_dir.join("templates").join(format!("{name}-service.yaml")),
                service.as_bytes(),
                true,
            )?,
        ));
    }

    for service_id in project.frontend.keys() {
        let frontend_ctx = ctx.tera_context_for_frontend(service_id);
        let deployment = engine.render("helm/frontend_deployment_yaml.tera", &frontend_ctx)?;
        let service = engine.render("helm/frontend_service_yaml.tera", &frontend_ctx)?;
        let name = hyphenated(service_id);
        actions.push((
            format!("templates/{name}-deployment.yaml"),
            write_rendered(
                &chart_dir.join("templates").join(format!("{name}-deployment.yaml")),
                deployment.as_bytes(),
                true,
            )?,
        ));
        actions.push((
            format!("templates/{name}-service.yaml"),
            write_rendered(
                &chart_dir.join("templates").join(format!("{name}-service.yaml")),
                service.as_bytes(),
                true,
            )?,
        ));
    }

    Ok(HelmReport { chart_dir, actions })
}

fn project_values_context(project: &Project) -> tera::Context {
    let ctx_view = TemplateContext::new(project.clone());
    let mut ctx = tera::Context::new();
    ctx.insert("project_name", &project.project_name);
    ctx.insert("version", &project.version);
    ctx.insert("docker_registry", &project.docker_registry);
    ctx.insert("database_enabled", &project.database.enabled);

    #[derive(serde::Serialize)]
    struct BackendValuesEntry {
        hyphenated_id: String,
        full_image: String,
        http_port: u16,
        health_port: u16,
        metrics_port: u16,
    }
    #[derive(serde::Serialize)]
    struct FrontendValuesEntry {
        hyphenated_id: String,
        full_image: String,
        web_port: u16,
    }

    let backend_services: Vec<BackendValuesEntry> = project
        .backend
        .iter()
        .map(|(id, svc)| BackendValuesEntry {
            hyphenated_id: hyphenated(id),
            full_image: ctx_view.full_image(id),
            http_port: svc.ports.http,
            health_port: svc.ports.health,
            metrics_port: svc.ports.metrics,
        })
        .collect();
    let frontend_services: Vec<FrontendValuesEntry> = project
        .frontend
        .iter()
        .map(|(id, svc)| FrontendValuesEntry {
            hyphenated_id: hyphenated(id),
            full_image: ctx_view.full_image(id),
            web_port: svc.web_port,
        })
        .collect();

    ctx.insert("backend_services", &backend_services);
    ctx.insert("frontend_services", &frontend_services);
    ctx
}
