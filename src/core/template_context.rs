//! Template Context (spec §3.3): the derived, read-only view of the
//! manifest fed to the Template Engine (C4), the Compose Emitter (C7),
//! and the Helm Emitter (C8).

use crate::core::manifest::Project;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Converts an underscore-separated frontend service id into the
/// hyphenated form required for container image names (spec §3.1,
/// invariant 3).
pub fn hyphenated(service_id: &str) -> String {
    service_id.replace('_', "-")
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext {
    pub project: Project,
    pub timestamp: DateTime<Utc>,
}

impl TemplateContext {
    pub fn new(project: Project) -> Self {
        TemplateContext { project, timestamp: Utc::now() }
    }

    pub fn image_name(&self, service_id: &str) -> String {
        format!("{}-{}", self.project.project_name, hyphenated(service_id))
    }

    pub fn full_image(&self, service_id: &str) -> String {
        format!(
            "{}/{}:{}",
            self.project.docker_registry,
            self.image_name(service_id),
            self.project.version
        )
    }

    pub fn backend_module_path(&self, service_id: &str) -> String {
        format!("{}/backend/{}", self.project.module_prefix, service_id)
    }

    pub fn generated_module_path(&self) -> String {
        format!("{}/gen/go", self.project.module_prefix)
    }

    /// A `tera::Context` populated with every field a template may read.
    /// Unresolved variables are a fatal `TemplateUnresolved` error at
    /// render time (spec §4.4); this function never silently omits a key
    /// a template might need for a given service.
    pub fn tera_context_for_backend(&self, service_id: &str) -> tera::Context {
        let mut ctx = tera::Context::new();
        ctx.insert("project_name", &self.project.project_name);
        ctx.insert("module_prefix", &self.project.module_prefix);
        ctx.insert("docker_registry", &self.project.docker_registry);
        ctx.insert("version", &self.project.version);
        ctx.insert("service_id", service_id);
        ctx.insert("module_path", &self.backend_module_path(service_id));
        ctx.insert("image_name", &self.image_name(service_id));
        ctx.insert("full_image", &self.full_image(service_id));
        if let Some(svc) = self.project.backend.get(service_id) {
            ctx.insert("ports", &svc.ports);
            ctx.insert("proto_template", &svc.proto_template);
        }
        ctx.insert("database_enabled", &self.project.database.enabled);
        ctx
    }

    pub fn tera_context_for_frontend(&self, service_id: &str) -> tera::Context {
        let mut ctx = tera::Context::new();
        ctx.insert("project_name", &self.project.project_name);
        ctx.insert("service_id", service_id);
        ctx.insert("hyphenated_id", &hyphenated(service_id));
        ctx.insert("image_name", &self.image_name(service_id));
        ctx.insert("full_image", &self.full_image(service_id));
        if let Some(svc) = self.project.frontend.get(service_id) {
            ctx.insert("platforms", &svc.platforms);
            ctx.insert("web_port", &svc.web_port);
        }
        ctx
    }

    pub fn tera_context_for_project(&self) -> tera::Context {
        let mut ctx = tera::Context::new();
        ctx.insert("project", &self.project);
        ctx.insert("timestamp", &self.timestamp.to_rfc3339());
        ctx
    }
}
