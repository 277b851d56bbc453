//! Compose Emitter (C7): emits `deploy/compose/compose.yaml` and the
//! `compose proxy*` sidecar helpers (spec §4.7).

use crate::core::error::EggError;
use crate::core::manifest::Project;
use crate::core::template_context::{hyphenated, TemplateContext};
use crate::core::tool_invoker::ToolInvoker;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Default)]
pub struct ComposeHealthCheck {
    pub test: Vec<String>,
    pub interval: String,
    pub timeout: String,
    pub retries: u32,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ComposeService {
    pub image: String,
    pub networks: Vec<String>,
    pub environment: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<ComposeHealthCheck>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ComposeNetwork {
    pub driver: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComposeFile {
    pub version: String,
    pub services: BTreeMap<String, ComposeService>,
    pub networks: BTreeMap<String, ComposeNetwork>,
}

/// The project-scoped network name every service shares, and the
/// conventional fallback used by the proxy helpers when container
/// inspection yields nothing (spec §4.7).
pub fn network_name(project: &Project) -> String {
    format!("{}-network", project.project_name)
}

pub fn build_compose_file(project: &Project) -> ComposeFile {
    let ctx = TemplateContext::new(project.clone());
    let network = network_name(project);
    let mut services = BTreeMap::new();

    for (id, svc) in &project.backend {
        let mut env = BTreeMap::new();
        env.insert("SERVICE_NAME".to_string(), id.clone());
        env.insert("SERVICE_VERSION".to_string(), project.version.clone());
        env.insert("APP_ENV".to_string(), "production".to_string());
        env.insert("LOG_LEVEL".to_string(), "info".to_string());
        env.insert("HTTP_PORT".to_string(), svc.ports.http.to_string());
        env.insert("HEALTH_PORT".to_string(), svc.ports.health.to_string());
        env.insert("METRICS_PORT".to_string(), svc.ports.metrics.to_string());
        if project.database.enabled {
            env.insert("DB_DSN".to_string(), database_dsn(project));
            env.insert("DB_DRIVER".to_string(), "mysql".to_string());
        }

        services.insert(
            hyphenated(id),
            ComposeService {
                image: ctx.full_image(id),
                networks: vec![network.clone()],
                environment: env,
                healthcheck: Some(ComposeHealthCheck {
                    test: vec![
                        "CMD".to_string(),
                        "wget".to_string(),
                        "-qO-".to_string(),
                        format!("http://localhost:{}/healthz", svc.ports.health),
                    ],
                    interval: "10s".to_string(),
                    timeout: "3s".to_string(),
                    retries: 3,
                }),
            },
        );
    }

    for (id, _svc) in &project.frontend {
        services.insert(
            hyphenated(id),
            ComposeService {
                image: ctx.full_image(id),
                networks: vec![network.clone()],
                environment: BTreeMap::new(),
                healthcheck: None,
            },
        );
    }

    if project.database.enabled {
        let mut env = BTreeMap::new();
        env.insert("MYSQL_ROOT_PASSWORD".to_string(), project.database.root_password.clone());
        env.insert("MYSQL_DATABASE".to_string(), project.database.database.clone());
        env.insert("MYSQL_USER".to_string(), project.database.user.clone());
        env.insert("MYSQL_PASSWORD".to_string(), project.database.password.clone());
        services.insert(
            "database".to_string(),
            ComposeService {
                image: project.database.image.clone(),
                networks: vec![network.clone()],
                environment: env,
                healthcheck: None,
            },
        );
    }

    let mut networks = BTreeMap::new();
    networks.insert(network, ComposeNetwork { driver: "bridge".to_string() });

    ComposeFile { version: "3.9".to_string(), services, networks }
}

fn database_dsn(project: &Project) -> String {
    format!(
        "{}:{}@tcp(database:3306)/{}",
        project.database.user, project.database.password, project.database.database
    )
}

/// `compose generate`: renders the document and writes it verbatim; no
/// template rendering step is needed since the whole document is derived
/// data, not a text template.
pub fn generate(repo_root: &Path, project: &Project) -> Result<(), EggError> {
    let file = build_compose_file(project);
    let rendered =
        serde_yaml::to_string(&file).map_err(|e| EggError::Validation(format!("compose serialization: {e}")))?;
    let dest = repo_root.join("deploy/compose/compose.yaml");
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&dest, rendered)?;
    Ok(())
}

/// Starts a sidecar container forwarding `target_port` on the project
/// network to `local_port` (or `target_port` itself if unset) on the host
/// loopback, using *first-free* semantics (spec §4.7).
pub fn proxy_start(
    project: &Project,
    service_container: &str,
    target_port: u16,
    local_port: Option<u16>,
    invoker: &ToolInvoker,
) -> Result<u16, EggError> {
    let network = discover_network(project, invoker);
    let chosen = match local_port {
        Some(p) => {
            if is_port_in_use(p) {
                return Err(EggError::PortInUse(p));
            }
            p
        }
        None => first_free_from(target_port),
    };

    let container_name = format!("egg-proxy-{service_container}-{chosen}");
    let listen_spec = format!("tcp-listen:{target_port},fork,reuseaddr");
    let connect_spec = format!("tcp-connect:{service_container}:{target_port}");
    let result = invoker.run(
        "docker",
        &[
            "run",
            "-d",
            "--rm",
            "--name",
            &container_name,
            "--network",
            &network,
            "-p",
            &format!("127.0.0.1:{chosen}:{target_port}"),
            "alpine/socat",
            &listen_spec,
            &connect_spec,
        ],
    )?;
    if !result.success() {
        return Err(EggError::ToolExit { tool: "docker".to_string(), code: result.exit_code });
    }
    Ok(chosen)
}

pub fn proxy_stop(service_container: &str, port: u16, invoker: &ToolInvoker) -> Result<(), EggError> {
    let container_name = format!("egg-proxy-{service_container}-{port}");
    invoker.run("docker", &["rm", "-f", &container_name])?;
    Ok(())
}

/// Inspects the first running service container for its network;
/// falls back to the conventional `<project>_<project>-network` form.
fn discover_network(project: &Project, invoker: &ToolInvoker) -> String {
    if let Some(id) = project.backend.keys().next() {
        let container = hyphenated(id);
        if let Ok(result) = invoker.run(
            "docker",
            &[
                "inspect",
                &container,
                "--format",
                "{{range $k, $_ := .NetworkSettings.Networks}}{{$k}}{{end}}",
            ],
        ) {
            let found = result.stdout.trim();
            if result.success() && !found.is_empty() {
                return found.to_string();
            }
        }
    }
    format!("{}_{}", project.project_name, network_name(project))
}

fn first_free_from(start: u16) -> u16 {
    let mut port = start;
    while is_port_in_use(port) {
        port = port.saturating_add(1);
    }
    port
}

fn is_port_in_use(port: u16) -> bool {
    std::net::TcpListener::bind(("127.0.0.1", port)).is_err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifest::{BackendPorts, BackendService, ProtoTemplate};

    fn sample_project() -> Project {
        let mut p = Project::new("shop".into(), "example.com/shop".into());
        p.docker_registry = "ghcr.io/acme".into();
        p.backend.insert(
            "user".into(),
            BackendService {
                name: "user".into(),
                proto_template: ProtoTemplate::Crud,
                ports: BackendPorts { http: 8080, health: 8081, metrics: 9091 },
            },
        );
        p
    }

    #[test]
    fn backend_service_carries_standard_env_vars() {
        let file = build_compose_file(&sample_project());
        let svc = &file.services["user"];
        assert_eq!(svc.environment["HTTP_PORT"], "8080");
        assert!(!svc.environment.contains_key("DB_DSN"));
        assert!(svc.healthcheck.is_some());
    }

    #[test]
    fn database_service_included_when_enabled() {
        let mut project = sample_project();
        project.database.enabled = true;
        project.database.database = "app".into();
        let file = build_compose_file(&project);
        assert!(file.services.contains_key("database"));
        assert_eq!(file.services["user"].environment["DB_DRIVER"], "mysql");
    }

    #[test]
    fn generate_writes_single_compose_document() {
        let dir = tempfile::tempdir().unwrap();
        generate(dir.path(), &sample_project()).unwrap();
        assert!(dir.path().join("deploy/compose/compose.yaml").exists());
    }

    #[test]
    fn first_free_from_skips_bound_port() {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let bound = listener.local_addr().unwrap().port();
        let free = first_free_from(bound);
        assert_ne!(free, bound);
        drop(listener);
    }
}
